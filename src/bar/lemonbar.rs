use crate::{outputs::Geometry, process::run_detached};
use anyhow::{Context, Result, anyhow};
use std::process::Stdio;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, Command},
    task::JoinHandle,
};

pub const DEFAULT_PROGRAM: &str = "lemonbar";

/// How to invoke the bar process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarCommand {
    pub program: String,
    pub geometry: Option<String>,
    pub fonts: Vec<String>,
    pub fg: Option<String>,
    pub bg: Option<String>,
    pub clickable: Option<u32>,
    pub extra_args: Vec<String>,
}

impl Default for BarCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_owned(),
            geometry: None,
            fonts: Vec::new(),
            fg: None,
            bg: None,
            clickable: None,
            extra_args: Vec::new(),
        }
    }
}

impl BarCommand {
    /// `-g` argument for a full geometry, or a height only one.
    pub fn geometry_arg(geometry: Option<Geometry>, height: Option<u32>) -> Option<String> {
        match (geometry, height) {
            (Some(geometry), _) => Some(geometry.to_string()),
            (None, Some(height)) => Some(format!("x{height}")),
            (None, None) => None,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(geometry) = &self.geometry {
            args.extend(["-g".to_owned(), geometry.clone()]);
        }
        for font in &self.fonts {
            args.extend(["-f".to_owned(), font.clone()]);
        }
        if let Some(fg) = &self.fg {
            args.extend(["-F".to_owned(), fg.clone()]);
        }
        if let Some(bg) = &self.bg {
            args.extend(["-B".to_owned(), bg.clone()]);
        }
        if let Some(clickable) = self.clickable {
            args.extend(["-a".to_owned(), clickable.to_string()]);
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// A running bar: markup goes to its stdin, clicked commands come back on its
/// stdout and are executed.
pub struct BarProcess {
    child: Child,
    stdin: ChildStdin,
    clicks: JoinHandle<()>,
}

impl BarProcess {
    pub fn spawn(command: &BarCommand) -> Result<Self> {
        let args = command.args();
        log::info!("Launching {} {}", command.program, args.join(" "));

        let mut child = Command::new(&command.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn `{}`", command.program))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Failed to capture bar stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to capture bar stdout"))?;

        let clicks = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if !line.trim().is_empty() => {
                        log::debug!("Bar action: {line}");
                        run_detached(&line);
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        log::error!("Failed to read bar actions: {e}");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            child,
            stdin,
            clicks,
        })
    }

    pub async fn push(&mut self, content: &str) -> Result<()> {
        self.stdin.write_all(content.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    pub async fn close(mut self) {
        self.clicks.abort();
        if let Err(e) = self.child.kill().await {
            log::debug!("Bar already gone: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_follow_lemonbar_order() {
        let command = BarCommand {
            program: "lemonbar".into(),
            geometry: Some("250x250+5+5".into()),
            fonts: vec![
                "DejaVu Sans Mono for Powerline:size=10".into(),
                "FontAwesome:size=12".into(),
            ],
            fg: Some("#FFFFFFFF".into()),
            bg: Some("#FF000000".into()),
            clickable: Some(20),
            extra_args: vec!["-u".into(), "2".into()],
        };

        assert_eq!(
            command.args(),
            vec![
                "-g",
                "250x250+5+5",
                "-f",
                "DejaVu Sans Mono for Powerline:size=10",
                "-f",
                "FontAwesome:size=12",
                "-F",
                "#FFFFFFFF",
                "-B",
                "#FF000000",
                "-a",
                "20",
                "-u",
                "2",
            ]
        );
    }

    #[test]
    fn unset_attributes_are_omitted() {
        assert!(BarCommand::default().args().is_empty());
    }

    #[test]
    fn geometry_argument() {
        let geometry = Geometry {
            width: 1920,
            height: 20,
            x: 1280,
            y: 0,
        };
        assert_eq!(
            BarCommand::geometry_arg(Some(geometry), Some(30)).as_deref(),
            Some("1920x20+1280+0")
        );
        assert_eq!(BarCommand::geometry_arg(None, Some(30)).as_deref(), Some("x30"));
        assert_eq!(BarCommand::geometry_arg(None, None), None);
    }

    #[tokio::test]
    async fn pushes_lines_to_the_bar() {
        let command = BarCommand {
            program: "sh".into(),
            extra_args: vec!["-c".into(), "cat > /dev/null".into()],
            ..Default::default()
        };
        let mut bar = BarProcess::spawn(&command).unwrap();
        bar.push("%{l}hello").await.unwrap();
        bar.close().await;
    }
}
