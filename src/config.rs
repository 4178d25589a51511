use crate::{
    markup::{Actions, Alignment},
    outputs::Geometry,
    process::CommandLine,
    widgets::{
        Style,
        bspwm::{BspwmOptions, DEFAULT_BSPC, DesktopPalette},
    },
};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/barkeep/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid alignment {0:?}, expected l, left, c, center, r or right")]
    InvalidAlignment(String),
    #[error("invalid mouse button {0:?}")]
    InvalidButton(String),
    #[error("invalid refresh {0}, expected a positive number of seconds")]
    InvalidRefresh(f64),
    #[error("screen {0} needs a name or a geometry when every screen has its own bar")]
    MissingGeometry(usize),
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StyleConfig {
    pub fg: Option<String>,
    pub bg: Option<String>,
    pub padding: usize,
    pub fonts: Vec<usize>,
    /// Commands keyed by mouse button.
    pub actions: BTreeMap<String, String>,
}

impl StyleConfig {
    pub fn to_style(&self) -> Result<Style, ConfigError> {
        let actions = self
            .actions
            .iter()
            .map(|(button, command)| {
                button
                    .parse::<u8>()
                    .map(|button| (button, command.clone()))
                    .map_err(|_| ConfigError::InvalidButton(button.clone()))
            })
            .collect::<Result<Actions, _>>()?;

        Ok(Style {
            fg: self.fg.clone(),
            bg: self.bg.clone(),
            padding: self.padding,
            fonts: self.fonts.clone(),
            actions,
        })
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BspwmConfig {
    #[serde(default)]
    pub palette: DesktopPalette,
    #[serde(default)]
    pub fixed_order: Vec<String>,
    #[serde(default = "default_bspc")]
    pub bspc: String,
}

fn default_bspc() -> String {
    DEFAULT_BSPC.to_owned()
}

impl From<BspwmConfig> for BspwmOptions {
    fn from(config: BspwmConfig) -> Self {
        Self {
            palette: config.palette,
            fixed_order: config.fixed_order,
            bspc: config.bspc,
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetKind {
    Text {
        text: String,
    },
    Subprocess {
        command: CommandLine,
    },
    BspwmDesktop(BspwmConfig),
    BspwmDesktopPool(BspwmConfig),
    WindowTitle {
        #[serde(default)]
        max_length: usize,
    },
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct WidgetConfig {
    pub alignment: Alignment,
    #[serde(default)]
    pub style: StyleConfig,
    /// Seconds, inherited from the screen when unset.
    pub refresh: Option<f64>,
    #[serde(flatten)]
    pub kind: WidgetKind,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ScreenConfig {
    pub name: Option<String>,
    pub bspwm_monitor_name: Option<String>,
    pub geometry: Option<Geometry>,
    pub height: Option<u32>,
    pub fg: Option<String>,
    pub bg: Option<String>,
    pub fonts: Option<Vec<String>>,
    pub refresh: Option<f64>,
    pub clickable: Option<u32>,
    pub listen_hooks: bool,
    pub widgets: Vec<WidgetConfig>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct PanelConfig {
    #[serde(default = "default_refresh")]
    pub refresh: f64,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub fg: Option<String>,
    #[serde(default)]
    pub bg: Option<String>,
    #[serde(default)]
    pub fonts: Vec<String>,
    #[serde(default)]
    pub clickable: Option<u32>,
    #[serde(default)]
    pub instance_per_screen: bool,
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

fn default_refresh() -> f64 {
    0.1
}

fn default_program() -> String {
    crate::bar::lemonbar::DEFAULT_PROGRAM.to_owned()
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            refresh: default_refresh(),
            height: None,
            fg: None,
            bg: None,
            fonts: Vec::new(),
            clickable: None,
            instance_per_screen: false,
            program: default_program(),
            extra_args: Vec::new(),
            geometry: None,
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub screens: Vec<ScreenConfig>,
}

fn default_log_level() -> String {
    "warn".to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            panel: PanelConfig::default(),
            screens: Vec::new(),
        }
    }
}

impl Config {
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        seconds(Some(self.panel.refresh))?;

        for (index, screen) in self.screens.iter().enumerate() {
            seconds(screen.refresh)?;
            if self.panel.instance_per_screen
                && self.screens.len() > 1
                && screen.name.is_none()
                && screen.geometry.is_none()
            {
                return Err(ConfigError::MissingGeometry(index));
            }

            for widget in &screen.widgets {
                seconds(widget.refresh)?;
                widget.style.to_style()?;
            }
        }
        Ok(())
    }
}

/// Converts a refresh given in seconds.
pub fn seconds(value: Option<f64>) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|value| Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidRefresh(value)))
        .transpose()
}

pub fn config_path(path: Option<&Path>) -> PathBuf {
    match path {
        Some(path) => path.to_owned(),
        None => shellexpand::path::tilde(Path::new(DEFAULT_CONFIG_PATH)).into_owned(),
    }
}

/// Reads the configuration, falling back to defaults when the file is missing.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            log::info!("Reading config file {}", path.display());
            Config::parse(&content, path)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("No config file at {}, using defaults", path.display());
            Ok(Config::default())
        }
        Err(source) => Err(ConfigError::Read {
            path: path.to_owned(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r##"
log_level = "debug"

[panel]
refresh = 0.2
height = 20
fonts = ["DejaVu Sans Mono:size=10", "FontAwesome:size=12"]
fg = "#FFFFFFFF"
bg = "#FF000000"
clickable = 20

[[screens]]
name = "HDMI-0"
bspwm_monitor_name = "primary"

[[screens.widgets]]
alignment = "l"
type = "bspwm_desktop_pool"
fixed_order = ["web", "term"]
palette.focused_occupied = { fg = "#FF000004", bg = "#FFFFFF04" }
style = { padding = 1 }

[[screens.widgets]]
alignment = "center"
type = "window_title"
max_length = 60

[[screens.widgets]]
alignment = "r"
type = "subprocess"
command = "date '+%H:%M'"
refresh = 30
style = { fg = "#FF00FF00", actions = { 1 = "notify-send hi" } }

[[screens]]
geometry = { width = 1920, height = 20, x = 1920, y = 0 }

[[screens.widgets]]
alignment = "right"
type = "text"
text = "hello"

[[screens.widgets]]
alignment = "left"
type = "subprocess"
command = ["xtitle", "-s"]
"##;

    fn parse(content: &str) -> Result<Config, ConfigError> {
        Config::parse(content, Path::new("config.toml"))
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.panel.refresh, 0.1);
        assert_eq!(config.panel.program, "lemonbar");
    }

    #[test]
    fn full_config() {
        let config = parse(CONFIG).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.panel.height, Some(20));
        assert_eq!(config.panel.fonts.len(), 2);
        assert_eq!(config.screens.len(), 2);

        let first = &config.screens[0];
        assert_eq!(first.bspwm_monitor_name.as_deref(), Some("primary"));
        assert_eq!(first.widgets[0].alignment, Alignment::Left);
        match &first.widgets[0].kind {
            WidgetKind::BspwmDesktopPool(bspwm) => {
                assert_eq!(bspwm.bspc, "bspc");
                assert_eq!(bspwm.fixed_order, vec!["web", "term"]);
                assert_eq!(
                    bspwm.palette.focused_occupied.fg.as_deref(),
                    Some("#FF000004")
                );
            }
            other => panic!("unexpected widget {other:?}"),
        }
        assert_eq!(
            first.widgets[1].kind,
            WidgetKind::WindowTitle { max_length: 60 }
        );

        let date = &first.widgets[2];
        assert_eq!(date.refresh, Some(30.0));
        assert_eq!(
            date.kind,
            WidgetKind::Subprocess {
                command: CommandLine::Shell("date '+%H:%M'".into())
            }
        );
        let style = date.style.to_style().unwrap();
        assert_eq!(style.actions.get(&1).map(String::as_str), Some("notify-send hi"));

        let second = &config.screens[1];
        assert_eq!(second.geometry.map(|g| g.x), Some(1920));
        assert_eq!(
            second.widgets[1].kind,
            WidgetKind::Subprocess {
                command: CommandLine::Argv(vec!["xtitle".into(), "-s".into()])
            }
        );
    }

    #[test]
    fn invalid_alignment_is_rejected() {
        let error = parse(
            r#"
[[screens]]
[[screens.widgets]]
alignment = "top"
type = "text"
text = "x"
"#,
        )
        .unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn invalid_button_is_rejected() {
        let error = parse(
            r#"
[[screens]]
[[screens.widgets]]
alignment = "l"
type = "text"
text = "x"
style = { actions = { left = "cmd" } }
"#,
        )
        .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidButton(button) if button == "left"));
    }

    #[test]
    fn negative_refresh_is_rejected() {
        let error = parse("[panel]\nrefresh = -1.0\n").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidRefresh(_)));
    }

    #[test]
    fn per_screen_bars_need_a_position() {
        let error = parse(
            r#"
[panel]
instance_per_screen = true

[[screens]]
name = "HDMI-0"

[[screens]]
"#,
        )
        .unwrap_err();
        assert!(matches!(error, ConfigError::MissingGeometry(1)));
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = read_config(Path::new("/nonexistent/barkeep/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn explicit_path_is_kept() {
        assert_eq!(
            config_path(Some(Path::new("/etc/barkeep.toml"))),
            PathBuf::from("/etc/barkeep.toml")
        );
        assert!(config_path(None).ends_with(".config/barkeep/config.toml"));
    }
}
