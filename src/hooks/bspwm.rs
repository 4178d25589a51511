//! bspwm report parsing.
//!
//! A report line looks like `WMHDMI-0:Of:o2:LT:TT:G`: a one character tag
//! followed by `:` separated items. Monitors are introduced by `M` (focused)
//! or `m`, desktops by one of `OoFfUu` and the layout by `L`. Items that do
//! not describe the topology are ignored.

use super::HookEvent;
use crate::process::CommandLine;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("desktop {0:?} reported before any monitor")]
    OrphanDesktop(String),
    #[error("layout {0:?} reported before any monitor")]
    OrphanLayout(String),
}

pub fn subscribe_command(bspc: &str) -> CommandLine {
    CommandLine::Argv(vec![
        bspc.to_owned(),
        "subscribe".to_owned(),
        "report".to_owned(),
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesktopState {
    Occupied,
    Free,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desktop {
    pub name: String,
    pub state: DesktopState,
    pub focused: bool,
}

impl Desktop {
    /// Parses a raw desktop token such as `Oterm` or `f3`.
    pub fn parse(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        let (state, focused) = match chars.next()? {
            'O' => (DesktopState::Occupied, true),
            'o' => (DesktopState::Occupied, false),
            'F' => (DesktopState::Free, true),
            'f' => (DesktopState::Free, false),
            'U' => (DesktopState::Urgent, true),
            'u' => (DesktopState::Urgent, false),
            _ => return None,
        };

        Some(Self {
            name: chars.as_str().to_owned(),
            state,
            focused,
        })
    }

    pub fn prefix(&self) -> char {
        match (self.state, self.focused) {
            (DesktopState::Occupied, true) => 'O',
            (DesktopState::Occupied, false) => 'o',
            (DesktopState::Free, true) => 'F',
            (DesktopState::Free, false) => 'f',
            (DesktopState::Urgent, true) => 'U',
            (DesktopState::Urgent, false) => 'u',
        }
    }
}

/// Displays the raw token.
impl fmt::Display for Desktop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix(), self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub name: String,
    pub focused: bool,
    pub desktops: Vec<Desktop>,
    pub layout: Option<String>,
}

impl Monitor {
    fn new(name: &str, focused: bool) -> Self {
        Self {
            name: name.to_owned(),
            focused,
            desktops: Vec::new(),
            layout: None,
        }
    }

    pub fn focused_desktop(&self) -> Option<&Desktop> {
        self.desktops.iter().find(|d| d.focused)
    }
}

/// Monitors and their desktops in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorTopology {
    pub monitors: Vec<Monitor>,
}

impl MonitorTopology {
    pub fn parse(line: &str) -> Result<Self, ReportError> {
        let mut chars = line.chars();
        chars.next();
        let status = chars.as_str().trim();

        let mut monitors: Vec<Monitor> = Vec::new();
        let mut current: Option<usize> = None;

        for item in status.split(':').map(str::trim).filter(|i| !i.is_empty()) {
            let mut chars = item.chars();
            let Some(tag) = chars.next() else {
                continue;
            };
            let value = chars.as_str();

            match tag {
                'M' | 'm' => {
                    let monitor = Monitor::new(field(value), tag == 'M');
                    match monitors.iter().position(|m| m.name == monitor.name) {
                        Some(index) => {
                            monitors[index] = monitor;
                            current = Some(index);
                        }
                        None => {
                            monitors.push(monitor);
                            current = Some(monitors.len() - 1);
                        }
                    }
                }
                'O' | 'o' | 'F' | 'f' | 'U' | 'u' => {
                    let monitor = current
                        .and_then(|index| monitors.get_mut(index))
                        .ok_or_else(|| ReportError::OrphanDesktop(item.to_owned()))?;
                    if let Some(desktop) = Desktop::parse(item) {
                        monitor.desktops.push(desktop);
                    }
                }
                'L' => {
                    let monitor = current
                        .and_then(|index| monitors.get_mut(index))
                        .ok_or_else(|| ReportError::OrphanLayout(item.to_owned()))?;
                    monitor.layout = Some(field(value).to_owned());
                }
                _ => {}
            }
        }

        Ok(Self { monitors })
    }

    pub fn parse_event(line: &str) -> Result<HookEvent, ReportError> {
        Self::parse(line).map(HookEvent::Bspwm)
    }

    pub fn monitor(&self, name: &str) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.name == name)
    }

    /// Serializes back into a report line carrying the parsed items only.
    #[cfg(test)]
    pub fn to_report(&self) -> String {
        use itertools::Itertools;

        let mut items = self.monitors.iter().flat_map(|monitor| {
            let tag = if monitor.focused { 'M' } else { 'm' };
            std::iter::once(format!("{tag}{}", monitor.name))
                .chain(monitor.desktops.iter().map(Desktop::to_string))
                .chain(monitor.layout.iter().map(|layout| format!("L{layout}")))
        });

        format!("W{}", items.join(":"))
    }
}

/// Monitor names and layouts may be separated from their tag (`M-HDMI-0`, `L T`).
fn field(value: &str) -> &str {
    value.trim_start_matches(|c: char| c == '-' || c.is_whitespace())
}
