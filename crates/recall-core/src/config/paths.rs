//! Standard locations for configuration files

use std::path::PathBuf;

/// Directory holding recall configuration
///
/// Returns: `<config dir>/recall` (e.g. `~/.config/recall` on Linux),
/// falling back to `./recall` when no config directory is known.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recall")
}

/// Default path for a named config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_recall() {
        assert!(default_config_dir().ends_with("recall"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path("waveform.yaml");
        assert!(path.ends_with("recall/waveform.yaml"));
    }
}
