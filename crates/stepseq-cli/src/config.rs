use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stepseq_core::PatternDefaults;

pub const DEFAULT_CATALOG: &str = "notes.json";
pub const DEFAULT_LOG_FILTER: &str = "stepseq=info";

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub pattern: PatternConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatternConfig {
    pub bpm: u32,
    pub total_steps: u32,
}

impl Default for PatternConfig {
    fn default() -> Self {
        let defaults = PatternDefaults::default();
        Self {
            bpm: defaults.bpm,
            total_steps: defaults.total_steps,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct CatalogConfig {
    /// File path or http(s) URL of the catalog document
    #[serde(default)]
    pub source: Option<String>,
    /// Directory sample files resolve against; needed for remote catalogs
    #[serde(default)]
    pub assets: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    pub fn pattern_defaults(&self) -> PatternDefaults {
        PatternDefaults::new(self.pattern.bpm, self.pattern.total_steps)
    }

    /// Catalog source, with a command-line value taking precedence
    pub fn catalog_source(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.catalog.source.clone())
            .unwrap_or_else(|| DEFAULT_CATALOG.to_string())
    }

    /// Explicit asset directory, with `--assets` taking precedence
    pub fn asset_override<'a>(&'a self, cli: Option<&'a Path>) -> Option<&'a Path> {
        cli.or(self.catalog.assets.as_deref())
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stepseq")
        .join("config.toml")
}

/// Read the config file; a missing or unreadable file yields the defaults
pub fn load_config(path: &Path) -> AppConfig {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str(&s).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [pattern]
            bpm = 90

            [catalog]
            source = "kits/808/notes.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.pattern.bpm, 90);
        assert_eq!(config.pattern.total_steps, 64);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.catalog_source(None), "kits/808/notes.json");
        assert_eq!(config.catalog_source(Some("other.json")), "other.json");
        assert_eq!(config.asset_override(None), None);
    }

    #[test]
    fn test_asset_root_for_remote_catalog() {
        let config: AppConfig = toml::from_str(
            r#"
            [catalog]
            source = "https://example.com/notes.json"
            assets = "/srv/kits"
            "#,
        )
        .unwrap();

        assert_eq!(config.asset_override(None), Some(Path::new("/srv/kits")));
        assert_eq!(config.asset_override(Some(Path::new("samples"))), Some(Path::new("samples")));
    }

    #[test]
    fn test_pattern_defaults_are_clamped() {
        let config: AppConfig = toml::from_str("[pattern]\nbpm = 999\ntotal_steps = 0\n").unwrap();
        assert_eq!(config.pattern_defaults(), PatternDefaults::new(240, 1));
    }

    #[test]
    fn test_missing_or_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(&dir.path().join("missing.toml")), AppConfig::default());

        let broken = dir.path().join("config.toml");
        std::fs::write(&broken, "[pattern\nbpm = ").unwrap();
        assert_eq!(load_config(&broken), AppConfig::default());
        assert_eq!(AppConfig::default().catalog_source(None), DEFAULT_CATALOG);
    }
}
