//! Reading and writing `waveform.yaml`
//!
//! Loading never fails: the viewport has to come up even when the file is
//! missing, malformed or holds values that cannot render. Each of those cases
//! logs why and falls back to [`WaveformConfig::default`]. Saving refuses
//! configs that would be rejected on the next load.

use anyhow::{Context, Result};
use std::path::Path;

use super::WaveformConfig;

/// Parse `path` into a config, `None` when the file does not exist
fn read_yaml(path: &Path) -> Result<Option<WaveformConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    Ok(Some(config))
}

/// Load the waveform config from a YAML file
///
/// Missing fields take their defaults. A missing, unreadable, unparsable or
/// invalid file yields the full default config.
pub fn load_config(path: &Path) -> WaveformConfig {
    let config = match read_yaml(path) {
        Ok(Some(config)) => config,
        Ok(None) => {
            log::info!("[CONFIG] No config at {:?}, using defaults", path);
            return WaveformConfig::default();
        }
        Err(e) => {
            log::warn!("[CONFIG] {:#}, using defaults", e);
            return WaveformConfig::default();
        }
    };

    if let Err(e) = config.validate() {
        log::warn!("[CONFIG] Invalid values in {:?}: {}, using defaults", path, e);
        return WaveformConfig::default();
    }

    log::info!(
        "[CONFIG] Loaded {:?}: {} px/s, {} px, {} smoothing",
        path,
        config.time_resolution,
        config.amplitude_resolution,
        config.smoothing.name()
    );
    config
}

/// Validate and save the waveform config, creating parent directories
pub fn save_config(config: &WaveformConfig, path: &Path) -> Result<()> {
    config.validate().context("Refusing to save invalid waveform config")?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize waveform config")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("[CONFIG] Saved {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmoothingKind;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config = load_config(Path::new("/nonexistent/path/waveform.yaml"));
        assert_eq!(config, WaveformConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("waveform.yaml");

        let config = WaveformConfig {
            time_resolution: 400,
            smoothing: SmoothingKind::PhaseLockedLoop,
            ..Default::default()
        };

        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path), config);
    }

    #[test]
    fn test_invalid_yaml_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waveform.yaml");
        std::fs::write(&path, "time_resolution: [not, a, number]").unwrap();

        assert_eq!(load_config(&path), WaveformConfig::default());
    }

    #[test]
    fn test_invalid_values_return_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waveform.yaml");
        // Parses fine but the band pass is empty
        std::fs::write(&path, "min_band_pass_hz: 5000\nmax_band_pass_hz: 2000\namplitude_resolution: 300\n")
            .unwrap();

        assert_eq!(load_config(&path), WaveformConfig::default());
    }

    #[test]
    fn test_save_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waveform.yaml");
        let config = WaveformConfig {
            envelope_window: 0,
            ..Default::default()
        };

        assert!(save_config(&config, &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waveform.yaml");
        std::fs::write(&path, "amplitude_resolution: 300\nsmoothing: none\n").unwrap();

        let config = load_config(&path);
        assert_eq!(config.amplitude_resolution, 300);
        assert_eq!(config.smoothing, SmoothingKind::None);
        assert_eq!(config.time_resolution, WaveformConfig::default().time_resolution);
    }
}
