use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;

pub const DEFAULT_CONFIG_FILE: &str = "survey-insights.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the test mode JSON fixtures
    pub fixtures_dir: PathBuf,

    /// Where exported `report_<date>.json` files are written
    pub export_dir: PathBuf,

    /// Where form drafts are kept between sessions
    pub drafts_dir: PathBuf,

    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    pub catalog: Catalog,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fixtures_dir: PathBuf::from("sample-data"),
            export_dir: PathBuf::from("."),
            drafts_dir: PathBuf::from(".survey-insights"),
            database_url: None,
            max_connections: default_max_connections(),
            catalog: Catalog::default(),
        }
    }
}

impl AppConfig {
    /// Loads `path` if given (it must exist), otherwise the default file if
    /// present, otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                config.database_url = Some(url);
            }
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_uses_defaults() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn catalog_section_overrides_lookup_tables() {
        let config = AppConfig::from_toml(
            r#"
            fixtures_dir = "fixtures"
            max_connections = 2

            [catalog]
            skill_areas = ["preaching", "teaching"]

            [catalog.role_mapping]
            mission_agency = "missionary"
            "#,
        )
        .unwrap();

        assert_eq!(config.fixtures_dir, PathBuf::from("fixtures"));
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.catalog.skill_areas, vec!["preaching", "teaching"]);
        assert_eq!(
            config.catalog.role_mapping.get("mission_agency").map(String::as_str),
            Some("missionary")
        );
        // untouched tables keep their defaults
        assert_eq!(config.catalog.effectiveness.len(), 5);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load(Some(&missing)).is_err());
    }
}
