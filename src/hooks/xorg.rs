use super::{Hook, HookEvent};
use crate::process::{CommandLine, LineProcess};
use anyhow::{Context, Result, bail};
use regex::Regex;
use std::{sync::LazyLock, time::Duration};
use tokio::{
    process::Command,
    sync::mpsc::{self, UnboundedReceiver, error::TryRecvError},
    task::JoinHandle,
};

pub const DEFAULT_REFRESH: Duration = Duration::from_millis(500);

static PROPERTY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<atom>[A-Za-z0-9_]+)\([^)]*\)(?:\s*=\s*|:\s*)(?P<value>.*)$")
        .expect("valid property regex")
});

/// One property change on the root window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEvent {
    pub atom: String,
    pub value: String,
}

impl PropertyEvent {
    /// Parses an `xprop` line: `_NET_ACTIVE_WINDOW(WINDOW): window id # 0x1a00003`.
    pub fn parse(line: &str) -> Option<Self> {
        let captures = PROPERTY_LINE.captures(line.trim())?;
        Some(Self {
            atom: captures["atom"].to_owned(),
            value: captures["value"].trim().to_owned(),
        })
    }

    /// The window id carried by `WINDOW` typed properties.
    pub fn window_id(&self) -> Option<&str> {
        self.value
            .split_whitespace()
            .find(|word| word.starts_with("0x"))
            .filter(|id| *id != "0x0")
    }

    /// The value of `STRING` typed properties, without quotes and escapes.
    pub fn text(&self) -> Option<String> {
        let quoted = self.value.strip_prefix('"')?.strip_suffix('"')?;
        let mut text = String::with_capacity(quoted.len());
        let mut chars = quoted.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => text.extend(chars.next()),
                c => text.push(c),
            }
        }
        Some(text)
    }
}

/// Reads one property of `window`, or of the root window when `None`.
pub async fn query_property(window: Option<&str>, atom: &str) -> Result<Option<PropertyEvent>> {
    let mut command = Command::new("xprop");
    match window {
        Some(id) => command.args(["-id", id]),
        None => command.arg("-root"),
    };

    let output = command
        .arg(atom)
        .output()
        .await
        .context("Failed to run xprop")?;
    if !output.status.success() {
        bail!(
            "xprop failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .find_map(PropertyEvent::parse))
}

/// A native event queue drained on every poll.
pub trait EventQueue: Send {
    fn drain(&mut self) -> Vec<PropertyEvent>;

    /// A closed queue is reopened on the next poll.
    fn is_closed(&self) -> bool;
}

/// Root window property changes, as reported by `xprop -root -spy`.
pub struct XpropSpy {
    rx: UnboundedReceiver<String>,
    reader: JoinHandle<()>,
    closed: bool,
}

impl XpropSpy {
    pub fn open() -> Result<Self> {
        let command = CommandLine::Argv(vec!["xprop".into(), "-root".into(), "-spy".into()]);
        let mut process = LineProcess::spawn(&command)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            loop {
                match process.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::error!("xprop read failed: {e:#}");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            rx,
            reader,
            closed: false,
        })
    }
}

impl EventQueue for XpropSpy {
    fn drain(&mut self) -> Vec<PropertyEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(line) => events.extend(PropertyEvent::parse(&line)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        events
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for XpropSpy {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Polls a queue every `refresh` and notifies `hook` of every non empty drain.
pub(super) async fn poll_queue<Q, F>(hook: &Hook, open: F, refresh: Duration)
where
    Q: EventQueue,
    F: Fn() -> Result<Q>,
{
    let stop = hook.stop_signal();
    let mut queue: Option<Q> = None;

    loop {
        if queue.as_ref().is_none_or(|queue| queue.is_closed()) {
            queue = match open() {
                Ok(queue) => Some(queue),
                Err(e) => {
                    log::error!("{}: {e:#}", hook.kind());
                    None
                }
            };
        }

        if let Some(queue) = queue.as_mut() {
            let events = queue.drain();
            if !events.is_empty() {
                log::debug!("{} received {} events", hook.kind(), events.len());
                hook.notify(HookEvent::Window(events));
            }
        }

        if stop.sleep(refresh).await {
            break;
        }
    }
}
