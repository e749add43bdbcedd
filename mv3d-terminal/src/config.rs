/// Terminal host configuration, read from an optional RON file
use std::fs;
use std::io;
use std::path::Path;

use mv3d_core::ViewerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How framebuffer pixels become terminal cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RenderStyle {
    /// Upper-half block glyphs, one colour pixel per half cell
    #[default]
    HalfBlock,
    /// Luminosity ramp characters
    Ascii,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub viewer: ViewerConfig,
    /// Display refresh rate the event loop paces frames at
    pub frame_rate: u32,
    pub style: RenderStyle,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            viewer: ViewerConfig::default(),
            frame_rate: 30,
            style: RenderStyle::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

impl TerminalConfig {
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let mut config: TerminalConfig = ron::from_str(text)?;
        config.frame_rate = config.frame_rate.clamp(1, 240);
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_ron(&text)?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_ron(&self) -> String {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TerminalConfig::default();
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.style, RenderStyle::HalfBlock);
        assert_eq!(config.viewer.orbit.min_distance, 1.0);
        assert_eq!(config.viewer.orbit.max_distance, 100.0);
        assert_eq!(config.viewer.load_timeout_ms, None);
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = TerminalConfig::from_ron("(style: Ascii, viewer: (load_timeout_ms: Some(2500)))").unwrap();
        assert_eq!(config.style, RenderStyle::Ascii);
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.viewer.load_timeout_ms, Some(2500));
        assert!((config.viewer.orbit.damping_factor - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_frame_rate_is_clamped() {
        let config = TerminalConfig::from_ron("(frame_rate: 0)").unwrap();
        assert_eq!(config.frame_rate, 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(frame_rate: 60, viewer: (orbit: (max_distance: 20.0)))").unwrap();

        let config = TerminalConfig::load(file.path()).unwrap();
        assert_eq!(config.frame_rate, 60);
        assert_eq!(config.viewer.orbit.max_distance, 20.0);
    }

    #[test]
    fn test_written_config_reads_back() {
        let mut config = TerminalConfig::default();
        config.style = RenderStyle::Ascii;
        config.viewer.load_timeout_ms = Some(10_000);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mv3d.ron");
        fs::write(&path, config.to_ron()).unwrap();
        assert_eq!(TerminalConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TerminalConfig::load(&dir.path().join("missing.ron")),
            Err(ConfigError::Io(_))
        ));
        assert!(matches!(
            TerminalConfig::from_ron("(frame_rate: \"fast\")"),
            Err(ConfigError::Parse(_))
        ));
    }
}
