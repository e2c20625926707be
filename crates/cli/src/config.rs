//! Configuration file loading.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use pipeline::{MetricSchema, OptimizerConfig};
use platform::HttpEndpoint;

/// Default configuration path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "optimizer.toml";

/// The configuration file could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Cannot read configuration file {path}: {source}")]
    Read {
        /// Path as given on the command line.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match [`CliConfig`].
    #[error("Invalid configuration file {path}: {source}")]
    Parse {
        /// Path as given on the command line.
        path: PathBuf,
        /// Parser diagnostic, including line and column.
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level contents of `optimizer.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    /// The `[optimizer]` table: thresholds, budget, fetch and batching.
    pub optimizer: OptimizerConfig,
    /// The report source.
    pub reporting: ReportingConfig,
    /// The advertising platform's mutation API.
    pub platform: HttpEndpoint,
    /// Optional summary delivery targets.
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Log format and span export.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Report endpoint and the wire encoding of its columns.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportingConfig {
    /// Absolute base URL of the report API.
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Omitted: the default cost/conversions/impressions/clicks layout.
    #[serde(default)]
    pub schema: MetricSchema,
}

impl ReportingConfig {
    /// The connection settings, without the schema.
    pub fn endpoint(&self) -> HttpEndpoint {
        HttpEndpoint {
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// The `[notifier]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    /// Receives the summary as a JSON `POST` when set.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// The `[telemetry]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Emit log lines as JSON objects.
    #[serde(default)]
    pub json: bool,
    /// OTLP/gRPC collector; spans are exported only when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl CliConfig {
    /// Reads and parses the file at `path`.
    ///
    /// Only the file structure is checked here; value validation happens in
    /// [`OptimizerConfig::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pipeline::{EntityKind, FieldKind};
    use std::io::Write;

    const FULL: &str = r#"
[optimizer]
halt_on_invalid_record = false

[optimizer.thresholds]
min_spend = "1000"
high_cpa = "100"
bid_reduction = "0.25"

[optimizer.budget]
ceiling_secs = 1620
host_limit_secs = 1800

[optimizer.fetch]
entity_kind = "ad_group"
lookback_days = 7
page_size = 200

[optimizer.actuation]
batch_size = 5
cooldown_ms = 250

[reporting]
base_url = "https://reports.example.com"
timeout_secs = 60
schema = [
    { name = "cost", kind = "micros" },
    { name = "conversions", kind = "micros" },
    { name = "impressions", kind = "count" },
]

[platform]
base_url = "https://ads.example.com"

[notifier]
webhook_url = "https://hooks.example.com/optimizer"

[telemetry]
json = true
otlp_endpoint = "http://localhost:4317"
"#;

    const MINIMAL: &str = r#"
[optimizer.thresholds]
min_spend = "1000"
high_cpa = "100"

[optimizer.budget]
host_limit_secs = 1800

[reporting]
base_url = "https://reports.example.com"

[platform]
base_url = "https://ads.example.com"
"#;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loads_full_file() {
        let file = write(FULL);
        let config = CliConfig::load(file.path()).unwrap();

        assert!(!config.optimizer.halt_on_invalid_record);
        assert_eq!(config.optimizer.fetch.entity_kind, EntityKind::AdGroup);
        assert_eq!(config.reporting.endpoint().timeout_secs, 60);
        assert_eq!(
            config.reporting.schema.kind_of("conversions"),
            Some(FieldKind::Micros)
        );
        assert_eq!(config.platform.timeout_secs, 30);
        assert_eq!(
            config.notifier.webhook_url.as_deref(),
            Some("https://hooks.example.com/optimizer")
        );
        assert!(config.telemetry.json);

        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let settings = config
            .optimizer
            .validate(today, &config.reporting.schema)
            .unwrap();
        assert_eq!(settings.query.fields.len(), 3);
        assert_eq!(settings.actuation.batch_size.get(), 5);
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let file = write(MINIMAL);
        let config = CliConfig::load(file.path()).unwrap();

        assert!(config.optimizer.halt_on_invalid_record);
        assert_eq!(config.reporting.schema, MetricSchema::default());
        assert!(config.notifier.webhook_url.is_none());
        assert!(config.telemetry.otlp_endpoint.is_none());
        assert!(!config.telemetry.json);
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        let file = write(&format!("{MINIMAL}\n[extra]\nvalue = 1\n"));
        assert!(matches!(
            CliConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CliConfig::load(&dir.path().join("absent.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
