use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::{fmt, process::Stdio};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    process::{Child, ChildStdout, Command},
};

/// A command to run: a string goes through `sh -c`, a list is an argv.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Shell(String),
    Argv(Vec<String>),
}

impl CommandLine {
    pub fn command(&self) -> Result<Command> {
        match self {
            CommandLine::Shell(line) => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(line);
                Ok(command)
            }
            CommandLine::Argv(argv) => {
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| anyhow!("empty command"))?;
                let mut command = Command::new(program);
                command.args(args);
                Ok(command)
            }
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Shell(line) => f.write_str(line),
            CommandLine::Argv(argv) => f.write_str(&argv.join(" ")),
        }
    }
}

/// A child process whose stdout is consumed line by line.
///
/// The child is killed when this is dropped.
pub struct LineProcess {
    _child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl LineProcess {
    pub fn spawn(command: &CommandLine) -> Result<Self> {
        log::debug!("Launching {command}");

        let mut child = command
            .command()?
            .stdout(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn `{command}`"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to capture stdout of `{command}`"))?;

        Ok(Self {
            _child: child,
            lines: BufReader::new(stdout).lines(),
        })
    }

    /// Next output line without its line terminator, `None` at EOF.
    ///
    /// Cancel safe.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let line = self.lines.next_line().await?;
        Ok(line.map(|line| line.trim_end_matches(['\r', '\n']).to_owned()))
    }
}

/// Fire and forget a shell command, reaping it in the background.
pub fn run_detached(line: &str) {
    let spawned = Command::new("sh")
        .arg("-c")
        .arg(line)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .spawn();

    match spawned {
        Ok(mut child) => {
            let line = line.to_owned();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) if !status.success() => {
                        log::warn!("`{line}` exited with {status}");
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to wait for `{line}`: {e}"),
                }
            });
        }
        Err(e) => log::error!("Failed to execute `{line}`: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_lines_until_eof() {
        let mut process =
            LineProcess::spawn(&CommandLine::Shell("printf 'a\\r\\nb\\n'".to_owned())).unwrap();

        assert_eq!(process.next_line().await.unwrap().as_deref(), Some("a"));
        assert_eq!(process.next_line().await.unwrap().as_deref(), Some("b"));
        assert_eq!(process.next_line().await.unwrap(), None);
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(CommandLine::Argv(vec![]).command().is_err());
    }

    #[test]
    fn display_joins_argv() {
        let command = CommandLine::Argv(vec!["bspc".into(), "subscribe".into(), "report".into()]);
        assert_eq!(command.to_string(), "bspc subscribe report");
    }
}
