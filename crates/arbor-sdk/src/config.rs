use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use arbor_engine::OpenMode;

use crate::error::SdkResult;

/// Engine tag of the built-in SQLite backend.
pub const SQLITE: &str = "sqlite";

/// How to open a [`Connection`](crate::Connection).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Backend tag.
    pub engine: String,
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    pub open_mode: OpenMode,
    /// Number of object IDs kept in the access log.
    pub access_log_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            engine: SQLITE.to_string(),
            path: None,
            open_mode: OpenMode::default(),
            access_log_capacity: 128,
        }
    }
}

impl ConnectionConfig {
    /// File-backed SQLite database at `path`.
    pub fn sqlite(path: impl Into<PathBuf>, open_mode: OpenMode) -> Self {
        Self {
            path: Some(path.into()),
            open_mode,
            ..Self::default()
        }
    }

    /// Parse a TOML document. Missing keys take their default.
    pub fn from_toml(raw: &str) -> SdkResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let config = Self::from_toml(&std::fs::read_to_string(path)?)?;
        info!(path = %path.display(), engine = %config.engine, "loaded connection config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ConnectionConfig::default();
        assert_eq!(c.engine, SQLITE);
        assert!(c.path.is_none());
        assert_eq!(c.open_mode, OpenMode::OpenOrCreate);
        assert_eq!(c.access_log_capacity, 128);
    }

    #[test]
    fn partial_toml() {
        let c = ConnectionConfig::from_toml(
            r#"
            path = "/var/lib/arbor/data.db"
            open_mode = "must-exist"
            "#,
        )
        .unwrap();
        assert_eq!(c.path, Some(PathBuf::from("/var/lib/arbor/data.db")));
        assert_eq!(c.open_mode, OpenMode::MustExist);
        assert_eq!(c.engine, SQLITE);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = ConnectionConfig::from_toml("open_mode = 3").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Facade);
    }
}
