//! Access-layer configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default read ceiling: 10 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Names blocked anywhere in a requested path (substring match)
pub const DEFAULT_SENSITIVE_NAMES: &[&str] = &["system", "windows", "program files", "etc", "var"];

/// Configuration for the file access layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessConfig {
    /// Largest file `read` will load, in bytes
    pub max_file_size: u64,
    /// Optional extension allow-list; `None` allows every extension
    pub allowed_extensions: Option<Vec<String>>,
    /// Lower-case names rejected when found anywhere in a path
    pub sensitive_names: Vec<String>,
    /// Directory holding the grant database
    pub data_dir: PathBuf,
    /// File name of the grant database inside `data_dir`
    pub database_file: String,
    /// Reactivate the last active grant on startup when the host still allows it
    pub resume_last_grant: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: None,
            sensitive_names: DEFAULT_SENSITIVE_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            data_dir: dirs::data_dir()
                .map(|d| d.join("scopefs"))
                .unwrap_or_else(|| PathBuf::from(".scopefs")),
            database_file: "grants.db".to_string(),
            resume_last_grant: true,
        }
    }
}

impl AccessConfig {
    /// Load configuration from a JSON file, falling back to defaults when it is missing
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        info!("Loaded access config from {:?}", path);
        Ok(config)
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_sensitive_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_names = names.into_iter().map(|n| n.into().to_lowercase()).collect();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_resume_last_grant(mut self, resume: bool) -> Self {
        self.resume_last_grant = resume;
        self
    }

    /// Full path of the grant database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Whether `extension` passes the allow-list. Comparison ignores case and a leading dot.
    pub fn is_extension_allowed(&self, extension: Option<&str>) -> bool {
        let Some(allowed) = &self.allowed_extensions else {
            return true;
        };
        let Some(ext) = extension else {
            return false;
        };
        let ext = ext.trim_start_matches('.').to_lowercase();
        allowed
            .iter()
            .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AccessConfig::default();
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert!(config.allowed_extensions.is_none());
        assert_eq!(config.sensitive_names.len(), 5);
        assert!(config.database_path().ends_with("grants.db"));
    }

    #[test]
    fn test_load_partial_json_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scopefs.json");
        std::fs::write(&path, r#"{"maxFileSize": 1024, "allowedExtensions": ["txt", ".MD"]}"#)
            .unwrap();

        let config = AccessConfig::load(&path).unwrap();
        assert_eq!(config.max_file_size, 1024);
        assert!(config.resume_last_grant);
        assert!(config.is_extension_allowed(Some("md")));
        assert!(config.is_extension_allowed(Some("TXT")));
        assert!(!config.is_extension_allowed(Some("exe")));
        assert!(!config.is_extension_allowed(None));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let config = AccessConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AccessConfig::default());
    }

    #[test]
    fn test_no_allow_list_allows_everything() {
        let config = AccessConfig::default();
        assert!(config.is_extension_allowed(Some("bin")));
        assert!(config.is_extension_allowed(None));
    }
}
