//! Lemonbar markup primitives.

use crate::config::ConfigError;
use itertools::Itertools;
use serde::Deserialize;
use std::{collections::BTreeMap, str::FromStr};

/// Clickable actions, keyed by mouse button.
pub type Actions = BTreeMap<u8, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

impl Alignment {
    pub const ALL: [Alignment; 3] = [Alignment::Left, Alignment::Center, Alignment::Right];

    pub fn tag(self) -> &'static str {
        match self {
            Alignment::Left => "%{l}",
            Alignment::Center => "%{c}",
            Alignment::Right => "%{r}",
        }
    }
}

impl FromStr for Alignment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l" | "left" => Ok(Alignment::Left),
            "c" | "center" => Ok(Alignment::Center),
            "r" | "right" => Ok(Alignment::Right),
            other => Err(ConfigError::InvalidAlignment(other.to_owned())),
        }
    }
}

impl TryFrom<String> for Alignment {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Attributes applied by [`decorate`]. Unset attributes emit no escape.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoration<'a> {
    pub fg: Option<&'a str>,
    pub bg: Option<&'a str>,
    pub padding: usize,
    pub font: Option<usize>,
    pub actions: Option<&'a Actions>,
}

/// Wraps `text` in action, background, foreground and font escapes, padding it
/// with `padding` spaces on each side.
pub fn decorate(text: &str, decoration: &Decoration<'_>) -> String {
    let mut out = String::with_capacity(text.len() + 2 * decoration.padding + 32);
    let actions = decoration.actions.filter(|actions| !actions.is_empty());

    if let Some(actions) = actions {
        out.push_str(
            &actions
                .iter()
                .map(|(button, cmd)| format!("%{{A{button}:{cmd}:}}"))
                .join(""),
        );
    }
    if let Some(bg) = decoration.bg {
        out.push_str(&format!("%{{B{bg}}}"));
    }
    if let Some(fg) = decoration.fg {
        out.push_str(&format!("%{{F{fg}}}"));
    }
    if let Some(font) = decoration.font {
        out.push_str(&format!("%{{T{font}}}"));
    }

    let pad = " ".repeat(decoration.padding);
    out.push_str(&pad);
    out.push_str(text);
    out.push_str(&pad);

    if decoration.font.is_some() {
        out.push_str("%{T-}");
    }
    if decoration.fg.is_some() {
        out.push_str("%{F-}");
    }
    if decoration.bg.is_some() {
        out.push_str("%{B-}");
    }
    if let Some(actions) = actions {
        out.push_str(&"%{A}".repeat(actions.len()));
    }

    out
}

/// Wraps already decorated markup in a single left click action.
pub fn clickable(cmd: &str, inner: &str) -> String {
    format!("%{{A1:{cmd}:}}{inner}%{{A}}")
}
