// ⚙️ Configuration - TOML settings for a census run
//
// Every section is optional; a missing file section falls back to the
// settings of the published ICA flat file (semicolon, Latin-1).

use crate::aggregate::DEFAULT_TOP_N;
use crate::catalog::ReleaseCatalog;
use crate::error::{PipelineError, Result};
use crate::geo::GeoPredicate;
use crate::loader::{LoadOptions, TextEncoding};
use crate::pipeline::Pipeline;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the extract the dashboard was built around
pub const DEFAULT_SOURCE_PATH: &str = "ARCHIVO PLANO CAUCA 1-2022 (2).csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub delimiter: String,
    pub encoding: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            path: PathBuf::from(DEFAULT_SOURCE_PATH),
            delimiter: ";".to_string(),
            encoding: TextEncoding::Latin1.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Pin a release id instead of detecting it from the header
    pub release: Option<String>,
    /// Extra `[[release]]` definitions added to the built-ins
    pub catalog_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            top_n: DEFAULT_TOP_N,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            database: PathBuf::from("herd_census.db"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub schema: SchemaConfig,
    pub geo: GeoPredicate,
    pub report: ReportConfig,
    pub storage: StorageConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.load_options()?;
        Ok(config)
    }

    /// Delimiter must be exactly one ASCII character
    pub fn load_options(&self) -> Result<LoadOptions> {
        let delimiter = match self.source.delimiter.as_bytes() {
            [b] if b.is_ascii() => *b,
            _ => {
                return Err(PipelineError::Config(format!(
                    "delimiter must be a single ASCII character, got {:?}",
                    self.source.delimiter
                )))
            }
        };
        let encoding: TextEncoding = self.source.encoding.parse()?;
        Ok(LoadOptions::new(delimiter, encoding))
    }

    /// Built-in releases plus the configured catalog file, if any
    pub fn catalog(&self) -> Result<ReleaseCatalog> {
        let mut catalog = ReleaseCatalog::new();
        if let Some(path) = &self.schema.catalog_file {
            catalog.extend_from_file(path)?;
        }
        Ok(catalog)
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        Ok(Pipeline::new(
            self.catalog()?,
            self.schema.release.clone(),
            self.geo,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_published_extract() {
        let config = PipelineConfig::default();
        let options = config.load_options().unwrap();

        assert_eq!(options, LoadOptions::new(b';', TextEncoding::Latin1));
        assert_eq!(config.source.path, PathBuf::from(DEFAULT_SOURCE_PATH));
        assert_eq!(config.report.top_n, 15);
        assert_eq!(config.geo, GeoPredicate::NorthWestHemisphere);
        assert!(config.schema.release.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [source]
            path = "data/cauca.csv"
            encoding = "utf-8"

            [report]
            top_n = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.source.path, PathBuf::from("data/cauca.csv"));
        assert_eq!(config.source.delimiter, ";");
        assert_eq!(config.load_options().unwrap().encoding, TextEncoding::Utf8);
        assert_eq!(config.report.top_n, 5);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_geo_and_release_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [schema]
            release = "ica-2021-c2"

            [geo]
            kind = "bounding-box"
            min_lat = 0.9
            max_lat = 3.4
            min_lon = -78.2
            max_lon = -75.7
            "#,
        )
        .unwrap();

        assert_eq!(config.schema.release.as_deref(), Some("ica-2021-c2"));
        assert!(config.geo.accepts(2.45, -76.6));
        assert!(!config.geo.accepts(4.7, -74.1));

        let pipeline = config.pipeline().unwrap();
        assert!(pipeline.settings_key().contains("ica-2021-c2"));
    }

    #[test]
    fn test_bad_delimiter_and_encoding_rejected() {
        let err = PipelineConfig::from_toml_str("[source]\ndelimiter = \";;\"\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        let err = PipelineConfig::from_toml_str("[source]\nencoding = \"cp1252\"\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_missing_catalog_file_is_config_error() {
        let config = PipelineConfig {
            schema: SchemaConfig {
                release: None,
                catalog_file: Some(PathBuf::from("/nonexistent/releases.toml")),
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(config.catalog(), Err(PipelineError::Config(_))));
    }
}
