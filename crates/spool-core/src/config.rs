//! Stream configuration that downstream crates can serialize/deserialize.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default in-memory capacity before a stream spills to disk (30 KiB).
pub const DEFAULT_MEMORY_THRESHOLD: usize = 30 * 1024;

/// Thresholds strictly below this size rent an exact-fit array from the pool.
/// Larger thresholds fall back to a growable, unpooled buffer.
pub const MAX_RENTED_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolConfig {
    /// Bytes kept in memory before the stream promotes itself to a temp file.
    pub memory_threshold: usize,

    /// Upper bound (exclusive) for thresholds served by a pooled array.
    pub max_rented_buffer_size: usize,

    /// Directory for spill files. `None` resolves to the OS temp dir at the
    /// moment of the first spill.
    pub temp_dir: Option<PathBuf>,

    /// File-name prefix for spill files; names are `<prefix><random>.tmp`.
    pub file_prefix: String,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            max_rented_buffer_size: MAX_RENTED_BUFFER_SIZE,
            temp_dir: None,
            file_prefix: "spool_".to_string(),
        }
    }
}

impl SpoolConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `SPOOL_MEMORY_THRESHOLD`: in-memory threshold in bytes
    /// - `SPOOL_MAX_RENTED_BUFFER`: largest pooled threshold (exclusive)
    /// - `SPOOL_TEMP_DIR`: directory for spill files
    /// - `SPOOL_FILE_PREFIX`: spill file-name prefix
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("SPOOL_MEMORY_THRESHOLD") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.memory_threshold = v;
            }
        }

        if let Ok(s) = std::env::var("SPOOL_MAX_RENTED_BUFFER") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_rented_buffer_size = v;
            }
        }

        if let Ok(s) = std::env::var("SPOOL_TEMP_DIR") {
            if !s.is_empty() {
                cfg.temp_dir = Some(PathBuf::from(s));
            }
        }

        if let Ok(s) = std::env::var("SPOOL_FILE_PREFIX") {
            cfg.file_prefix = s;
        }

        cfg
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether `memory_threshold` is served by an exact-fit pooled array.
    pub fn uses_rented_buffer(&self) -> bool {
        self.memory_threshold < self.max_rented_buffer_size
    }

    /// Reject settings that can never produce a usable spill file.
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.temp_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::InvalidArgument("temp_dir must not be empty".into()));
            }
        }
        if self.file_prefix.contains(MAIN_SEPARATOR) || self.file_prefix.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "file_prefix '{}' must not contain a path separator",
                self.file_prefix
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SpoolConfig::default();
        assert_eq!(cfg.memory_threshold, 30 * 1024);
        assert!(cfg.uses_rented_buffer());
        cfg.validate().unwrap();
    }

    #[test]
    fn megabyte_threshold_is_growable() {
        let cfg = SpoolConfig {
            memory_threshold: 1024 * 1024,
            ..Default::default()
        };
        assert!(!cfg.uses_rented_buffer());
    }

    #[test]
    fn json_fills_missing_fields() {
        let cfg = SpoolConfig::from_json_str(r#"{ "memory_threshold": 10 }"#).unwrap();
        assert_eq!(cfg.memory_threshold, 10);
        assert_eq!(cfg.file_prefix, "spool_");
        assert!(cfg.temp_dir.is_none());
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.json");
        let cfg = SpoolConfig {
            memory_threshold: 64,
            temp_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        std::fs::write(&path, cfg.to_json_pretty().unwrap()).unwrap();
        assert_eq!(SpoolConfig::from_json_file(&path).unwrap(), cfg);
    }

    #[test]
    fn empty_temp_dir_rejected() {
        let cfg = SpoolConfig {
            temp_dir: Some(PathBuf::new()),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn prefix_with_separator_rejected() {
        let cfg = SpoolConfig {
            file_prefix: "../escape".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_json_is_config_error() {
        let err = SpoolConfig::from_json_str("{ not json").unwrap_err();
        assert!(err.to_string().contains("Invalid configuration"));
    }
}
