/// Application configuration management
/// Reads optional settings from $BASEMENT_CONFIG or ~/.config/basement/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::ENV_CONFIG;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// One repository directory per backup name lives here
    pub repository_root: PathBuf,
    /// Where the target's mounts are re-rooted inside the child
    pub backup_root: PathBuf,
    /// Archival tool cache, persisted across children
    pub cache_dir: PathBuf,
    /// Engine control socket, never considered when linking containers
    pub control_socket: PathBuf,
    /// Archival tool executable
    pub archiver: String,
    pub default_prefix: String,
    /// Host files mounted read-only so archive timestamps use local time
    ///
    /// These are host paths and are bound without checking: a missing one
    /// would be created as a directory by the engine.
    pub timezone_files: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repository_root: PathBuf::from("/repositories"),
            backup_root: PathBuf::from("/backup"),
            cache_dir: PathBuf::from("/root/.cache/borg"),
            control_socket: PathBuf::from("/var/run/docker.sock"),
            archiver: "borg".to_string(),
            default_prefix: "bs".to_string(),
            timezone_files: vec![PathBuf::from("/etc/localtime")],
        }
    }
}

impl Settings {
    /// Get config file path, if one is configured or present
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            return Some(PathBuf::from(path));
        }

        let path = dirs::config_dir()?.join("basement").join("config.toml");
        path.exists().then_some(path)
    }

    /// Load configuration, falling back to defaults when no file exists
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let settings: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(settings)
    }

    /// Repository location for a resolved backup name
    pub fn repository_path(&self, backup_name: &str) -> PathBuf {
        self.repository_root.join(backup_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "repository_root = \"/srv/repos\"").unwrap();
        writeln!(file, "default_prefix = \"nightly\"").unwrap();

        let settings = Settings::load_from(file.path()).unwrap();

        assert_eq!(settings.repository_root, PathBuf::from("/srv/repos"));
        assert_eq!(settings.default_prefix, "nightly");
        assert_eq!(settings.backup_root, PathBuf::from("/backup"));
        assert_eq!(settings.archiver, "borg");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "repository_root = [").unwrap();

        assert!(Settings::load_from(file.path()).is_err());
    }

    #[test]
    fn test_repository_path() {
        let settings = Settings::default();
        assert_eq!(
            settings.repository_path("mysite"),
            PathBuf::from("/repositories/mysite")
        );
    }
}
