use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;
use std::{fmt, sync::LazyLock};
use tokio::process::Command;

static CONNECTED_OUTPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>\S+) connected (?:primary )?(?P<w>\d+)x(?P<h>\d+)\+(?P<x>\d+)\+(?P<y>\d+)")
        .expect("valid xrandr regex")
});

/// Bar placement on the X screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Active outputs and their geometry, in `xrandr` order.
pub fn parse_xrandr(output: &str) -> Vec<(String, Geometry)> {
    output
        .lines()
        .filter_map(|line| CONNECTED_OUTPUT.captures(line))
        .filter_map(|captures| {
            Some((
                captures["name"].to_owned(),
                Geometry {
                    width: captures["w"].parse().ok()?,
                    height: captures["h"].parse().ok()?,
                    x: captures["x"].parse().ok()?,
                    y: captures["y"].parse().ok()?,
                },
            ))
        })
        .collect()
}

pub async fn query_outputs() -> Result<Vec<(String, Geometry)>> {
    let output = Command::new("xrandr")
        .arg("--query")
        .output()
        .await
        .context("Failed to run xrandr")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        bail!("xrandr failed: {stderr}");
    }

    Ok(parse_xrandr(&String::from_utf8_lossy(&output.stdout)))
}

pub async fn query_geometry(name: &str) -> Result<Geometry> {
    query_outputs()
        .await?
        .into_iter()
        .find_map(|(output, geometry)| (output == name).then_some(geometry))
        .with_context(|| format!("Output {name} is not connected"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const XRANDR: &str = "\
Screen 0: minimum 8 x 8, current 3840 x 1080, maximum 16384 x 16384
HDMI-0 connected primary 1920x1080+0+0 (normal left inverted right x axis y axis) 531mm x 299mm
   1920x1080     60.00*+
DVI-D-0 connected 1920x1080+1920+0 (normal left inverted right x axis y axis) 477mm x 268mm
DP-1 disconnected (normal left inverted right x axis y axis)
DP-2 connected (normal left inverted right x axis y axis)
";

    #[test]
    fn parses_connected_outputs() {
        let outputs = parse_xrandr(XRANDR);

        assert_eq!(
            outputs,
            vec![
                (
                    "HDMI-0".to_owned(),
                    Geometry {
                        width: 1920,
                        height: 1080,
                        x: 0,
                        y: 0
                    }
                ),
                (
                    "DVI-D-0".to_owned(),
                    Geometry {
                        width: 1920,
                        height: 1080,
                        x: 1920,
                        y: 0
                    }
                ),
            ]
        );
    }

    #[test]
    fn geometry_display() {
        let geometry = Geometry {
            width: 800,
            height: 20,
            x: 10,
            y: 5,
        };
        assert_eq!(geometry.to_string(), "800x20+10+5");
    }
}
