use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Visibility;
use crate::error::{EtlError, Result};

pub const ENV_DATABASE: &str = "CATALOG_INTAKE_DB";
pub const ENV_OUTPUT_DIR: &str = "CATALOG_INTAKE_OUTPUT_DIR";
pub const ENV_LOG_DIR: &str = "CATALOG_INTAKE_LOG_DIR";
pub const ENV_DEFAULT_VISIBILITY: &str = "CATALOG_INTAKE_DEFAULT_VISIBILITY";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file; the in-memory store is used when unset
    pub database_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub default_visibility: Visibility,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            output_dir: PathBuf::from("output"),
            log_dir: PathBuf::from("logs"),
            default_visibility: Visibility::Private,
        }
    }
}

impl AppConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.database_path = Some(PathBuf::from(db));
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR).filter(|v| !v.is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|v| !v.is_empty()) {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(visibility) = lookup(ENV_DEFAULT_VISIBILITY).filter(|v| !v.is_empty()) {
            self.default_visibility = visibility.parse()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.database_path.is_none());
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.default_visibility, Visibility::Private);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = \"/tmp/catalog.db\"").unwrap();
        writeln!(file, "default_visibility = \"PUBLIC\"").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/catalog.db")));
        assert_eq!(config.default_visibility, Visibility::Public);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = AppConfig::from_file(Path::new("/nonexistent/catalog.toml")).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_OUTPUT_DIR, "/srv/reports"),
            (ENV_DEFAULT_VISIBILITY, "public"),
            (ENV_LOG_DIR, ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/reports"));
        assert_eq!(config.default_visibility, Visibility::Public);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_bad_visibility_override() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_DEFAULT_VISIBILITY).then(|| "hidden".to_string()))
            .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
