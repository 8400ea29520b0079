//! Platform locations for stemsplit files

use std::path::PathBuf;

/// Directory name under the platform config and cache roots
pub const APP_DIR: &str = "stemsplit";

/// Model cache directory
///
/// Returns: `~/.cache/stemsplit/models` on Linux, `None` when the platform
/// has no cache directory.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|base| base.join(APP_DIR).join("models"))
}

/// Config file location
///
/// Returns: `~/.config/stemsplit/config.yaml` on Linux
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_DIR).join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_dir_ends_with_models() {
        if let Some(dir) = default_cache_dir() {
            assert!(dir.ends_with("stemsplit/models"));
        }
    }

    #[test]
    fn test_config_path_filename() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("stemsplit/config.yaml"));
        }
    }
}
