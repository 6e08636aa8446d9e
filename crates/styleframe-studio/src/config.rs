use anyhow::{Context, Result, bail};

use styleframe_engine::frame::DriverConfig;

/// Environment variable holding the frame size as `WIDTHxHEIGHT`.
pub const SIZE_VAR: &str = "STYLEFRAME_SIZE";

const DEFAULT_SIZE: (u32, u32) = (720, 720);

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub title: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub driver: DriverConfig,
}

impl StudioConfig {
    pub fn from_env() -> Result<Self> {
        let (frame_width, frame_height) = match std::env::var(SIZE_VAR) {
            Ok(value) => parse_size(&value).with_context(|| format!("invalid {SIZE_VAR}"))?,
            Err(_) => DEFAULT_SIZE,
        };

        Ok(Self {
            frame_width,
            frame_height,
            ..Default::default()
        })
    }
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            title: "styleframe studio".to_string(),
            frame_width: DEFAULT_SIZE.0,
            frame_height: DEFAULT_SIZE.1,
            driver: DriverConfig::default(),
        }
    }
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let Some((w, h)) = value.trim().split_once(['x', 'X']) else {
        bail!("expected WIDTHxHEIGHT, got `{value}`");
    };
    let w: u32 = w.trim().parse().with_context(|| format!("bad width `{w}`"))?;
    let h: u32 = h.trim().parse().with_context(|| format!("bad height `{h}`"))?;
    if w == 0 || h == 0 {
        bail!("frame size must be non-zero, got {w}x{h}");
    }
    Ok((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_width_by_height() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 64X32 ").unwrap(), (64, 32));
    }

    #[test]
    fn rejects_malformed_sizes() {
        assert!(parse_size("720").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("wide x tall").is_err());
    }
}
