use super::{Hook, HookEvent};
use crate::process::{CommandLine, LineProcess};
use std::{fmt::Display, time::Duration};

const RELAUNCH_DELAY: Duration = Duration::from_secs(1);

/// Feeds every line printed by `command` through `parse` into `hook`.
///
/// The process is relaunched whenever it fails to start or reaches EOF, and
/// lines that do not parse are skipped.
pub(super) async fn listen<P, E>(hook: &Hook, command: CommandLine, parse: P)
where
    P: Fn(&str) -> Result<HookEvent, E>,
    E: Display,
{
    let stop = hook.stop_signal();
    let mut process: Option<LineProcess> = None;

    while !stop.is_stopped() {
        if process.is_none() {
            match LineProcess::spawn(&command) {
                Ok(spawned) => process = Some(spawned),
                Err(e) => {
                    log::error!("{}: {e:#}", hook.kind());
                    if stop.sleep(RELAUNCH_DELAY).await {
                        break;
                    }
                    continue;
                }
            }
        }
        let Some(running) = process.as_mut() else {
            continue;
        };

        tokio::select! {
            () = stop.wait() => break,
            line = running.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match parse(&line) {
                    Ok(event) => hook.notify(event),
                    Err(e) => log::warn!("{}: skipping {line:?}: {e}", hook.kind()),
                },
                Ok(None) => {
                    log::warn!("{}: `{command}` exited, relaunching", hook.kind());
                    process = None;
                    if stop.sleep(RELAUNCH_DELAY).await {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("{}: read failed, relaunching: {e:#}", hook.kind());
                    process = None;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookKind, Subscriber, tests::Counter};
    use std::sync::{Arc, atomic::Ordering};

    #[tokio::test]
    async fn parses_lines_and_skips_garbage() {
        let hook = Hook::new(HookKind::XorgWindow);
        let counter = Arc::new(Counter::default());
        let subscriber: Arc<dyn Subscriber> = counter.clone();
        hook.add_subscriber(Arc::downgrade(&subscriber));

        let command = CommandLine::Shell("printf 'ok\\nbad\\n\\nok\\n'; sleep 5".to_owned());
        let listening = {
            let hook = hook.clone();
            tokio::spawn(async move {
                listen(&hook, command, |line| {
                    if line == "ok" {
                        Ok(HookEvent::Window(vec![]))
                    } else {
                        Err("not ok")
                    }
                })
                .await;
            })
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while counter.hits.load(Ordering::SeqCst) < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        hook.stop();
        listening.await.unwrap();
        hook.join().await;
        assert_eq!(counter.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exited_commands_are_relaunched() {
        let hook = Hook::new(HookKind::XorgWindow);
        let counter = Arc::new(Counter::default());
        let subscriber: Arc<dyn Subscriber> = counter.clone();
        hook.add_subscriber(Arc::downgrade(&subscriber));

        let command = CommandLine::Shell("printf 'ok\\n'".to_owned());
        let listening = {
            let hook = hook.clone();
            tokio::spawn(async move {
                listen(&hook, command, |_| Ok::<_, String>(HookEvent::Window(vec![]))).await;
            })
        };

        let deadline = tokio::time::Instant::now() + RELAUNCH_DELAY * 5;
        while counter.hits.load(Ordering::SeqCst) < 3 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        hook.stop();
        tokio::time::timeout(Duration::from_secs(1), listening)
            .await
            .unwrap()
            .unwrap();
        hook.join().await;
        assert!(counter.hits.load(Ordering::SeqCst) >= 3);
    }
}
