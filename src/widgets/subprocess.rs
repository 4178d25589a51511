use super::{Style, Widget, WidgetCore};
use crate::process::{CommandLine, LineProcess};
use anyhow::Result;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

/// Shows the last line printed by a command, relaunching it whenever it
/// exits.
pub struct SubprocessWidget {
    core: WidgetCore,
    command: CommandLine,
}

impl SubprocessWidget {
    pub fn new(command: CommandLine, style: Style, refresh: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            core: WidgetCore::new(style, refresh),
            command,
        })
    }

    async fn run(&self) {
        let stop = self.core.stop_signal();
        let mut process: Option<LineProcess> = None;
        let mut printed = false;

        loop {
            if stop.is_stopped() {
                break;
            }
            if process.is_none() {
                match LineProcess::spawn(&self.command) {
                    Ok(spawned) => {
                        process = Some(spawned);
                        printed = false;
                    }
                    Err(e) => log::error!("{e:#}"),
                }
            }

            if let Some(running) = process.as_mut() {
                tokio::select! {
                    () = stop.wait() => break,
                    line = running.next_line() => match line {
                        Ok(Some(line)) => {
                            if !line.is_empty() {
                                printed = true;
                                self.core.update_screens(self.core.decorate_with_style(&line));
                            }
                        }
                        Ok(None) => {
                            log::debug!("`{}` exited", self.command);
                            process = None;
                            // one shot commands are relaunched right away
                            if printed {
                                continue;
                            }
                        }
                        Err(e) => {
                            log::error!("Failed to read from `{}`: {e}", self.command);
                            process = None;
                        }
                    }
                }
            }

            if stop.sleep(self.core.refresh()).await {
                break;
            }
        }
    }
}

#[async_trait]
impl Widget for SubprocessWidget {
    fn core(&self) -> &WidgetCore {
        &self.core
    }

    async fn start(&self) -> Result<()> {
        if !self.core.begin().await {
            log::debug!("`{}` is already running", self.command);
            return Ok(());
        }
        self.run().await;
        self.core.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pushes_lines_until_stopped() {
        let widget = SubprocessWidget::new(
            CommandLine::Shell("echo first; echo; echo second; sleep 10".into()),
            Style {
                fg: Some("#FF00FF00".into()),
                ..Default::default()
            },
            Some(Duration::from_millis(1)),
        );

        let running = {
            let widget = widget.clone();
            tokio::spawn(async move { widget.start().await })
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while widget.content().as_deref() != Some("%{F#FF00FF00}second%{F-}")
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            widget.content().as_deref(),
            Some("%{F#FF00FF00}second%{F-}")
        );

        widget.stop();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn one_shot_commands_are_relaunched() {
        let widget = SubprocessWidget::new(
            CommandLine::Argv(vec!["echo".into(), "tick".into()]),
            Style::default(),
            Some(Duration::from_millis(1)),
        );

        let running = {
            let widget = widget.clone();
            tokio::spawn(async move { widget.start().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(widget.content().as_deref(), Some("tick"));

        // a second start while running is a no-op
        widget.start().await.unwrap();

        widget.stop();
        running.await.unwrap().unwrap();
    }
}
