//! Configuration management for Catalog Curator
//!
//! Settings live in a JSON file under the user config directory. Any value
//! can be overridden from the environment with `CURATOR__SECTION__KEY`,
//! e.g. `CURATOR__ENRICHMENT__BATCH_SIZE=20`.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::infrastructure::csv_store::OutputEncoding;
use crate::infrastructure::quota_guard::QuotaLimits;
use crate::infrastructure::retry_policy::RetryPolicy;

/// Default values shared by the config structs and the CLI
pub mod defaults {
    pub const BATCH_SIZE: usize = crate::domain::DEFAULT_BATCH_SIZE;
    pub const MAX_WORKERS: usize = 5;
    pub const MODEL: &str = "gemini-2.5-flash-lite";
    pub const TEMPERATURE: f32 = 0.7;
    pub const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;
    pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
    pub const WORK_DIR: &str = "tmp";
    pub const LOG_LEVEL: &str = "info";
    pub const MAX_LOG_FILES: u32 = 10;
    pub const ENV_PREFIX: &str = "CURATOR";
    pub const CONFIG_FILE_NAME: &str = "config.json";
    pub const APP_DIR_NAME: &str = "catalog-curator";
    pub const CATEGORY_PREFIX: &str = "Tovary a kategórie > ";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub enrichment: EnrichmentConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub export: ExportConfig,
}

/// Remote enrichment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// API key; `GOOGLE_API_KEY` is used when unset
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub batch_size: usize,
    pub max_workers: usize,
    pub max_calls_per_window: u32,
    pub max_tokens_per_window: u64,
    pub window_secs: u64,
    pub retry: RetryPolicy,
    /// Replaces the built-in system instruction when set
    pub system_instruction: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        let limits = QuotaLimits::default();
        Self {
            api_key: None,
            model: defaults::MODEL.to_string(),
            temperature: defaults::TEMPERATURE,
            base_url: defaults::BASE_URL.to_string(),
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            batch_size: defaults::BATCH_SIZE,
            max_workers: defaults::MAX_WORKERS,
            max_calls_per_window: limits.max_calls_per_window,
            max_tokens_per_window: limits.max_tokens_per_window,
            window_secs: limits.window.as_secs(),
            retry: RetryPolicy::default(),
            system_instruction: None,
        }
    }
}

impl EnrichmentConfig {
    pub const fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits {
            max_calls_per_window: self.max_calls_per_window,
            max_tokens_per_window: self.max_tokens_per_window,
            window: Duration::from_secs(self.window_secs),
        }
    }

    /// Configured key, falling back to the environment; blank keys count as missing
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Like [`Self::resolve_api_key`], reading variables through `env`
    pub fn resolve_api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        let usable = |key: &String| !key.trim().is_empty();
        self.api_key
            .clone()
            .filter(usable)
            .or_else(|| env(defaults::API_KEY_ENV).filter(usable))
    }
}

/// File locations and encodings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the enrichment checkpoint
    pub work_dir: PathBuf,
    pub checkpoint_encoding: OutputEncoding,
    pub export_encoding: OutputEncoding,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(defaults::WORK_DIR),
            checkpoint_encoding: OutputEncoding::Utf8,
            export_encoding: OutputEncoding::Utf8Bom,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let module_filters = [("reqwest", "warn"), ("hyper", "warn"), ("h2", "warn")]
            .into_iter()
            .map(|(module, level)| (module.to_string(), level.to_string()))
            .collect();

        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            max_files: defaults::MAX_LOG_FILES,
            auto_cleanup_logs: true,
            module_filters,
        }
    }
}

/// One old-format column copied into a new-format column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: String,
    pub target: String,
}

/// Value used for empty cells of an export column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultValue {
    pub column: String,
    pub value: String,
}

/// Reshaping rules for the e-shop export format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub mappings: Vec<ColumnMapping>,
    pub default_values: Vec<DefaultValue>,
    /// Final column order; empty keeps whatever the transform produced
    pub output_columns: Vec<String>,
    pub image_source_column: String,
    pub image_columns: Vec<String>,
    pub category_source_column: String,
    pub category_prefix: String,
    pub category_targets: Vec<String>,
    /// Export column whose values are upper-cased
    pub code_column: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        use crate::domain::columns;

        let mappings = [
            (columns::CODE, "code"),
            (columns::NAME, "name"),
            (columns::SHORT_DESCRIPTION, "shortDescription"),
            (columns::LONG_DESCRIPTION, "description"),
            (columns::SEO_TITLE, "seoTitle"),
            (columns::SEO_DESCRIPTION, "metaDescription"),
            (columns::SEO_KEYWORDS, "seoKeywords"),
            ("Bežná cena", "price"),
            ("Výrobca", "manufacturer"),
            ("Váha", "weight"),
            ("Viditeľný", "productVisibility"),
            (columns::PROCESSED_FLAG, "aiProcessed"),
            (columns::PROCESSED_AT, "aiProcessedDate"),
        ]
        .into_iter()
        .map(|(source, target)| ColumnMapping {
            source: source.to_string(),
            target: target.to_string(),
        })
        .collect();

        let default_values = [
            ("currency", "EUR"),
            ("percentVat", "23"),
            ("itemType", "product"),
            ("productVisibility", "visible"),
        ]
        .into_iter()
        .map(|(column, value)| DefaultValue {
            column: column.to_string(),
            value: value.to_string(),
        })
        .collect();

        let image_columns: Vec<String> = ["defaultImage", "image"]
            .into_iter()
            .map(ToString::to_string)
            .chain((2..=7).map(|i| format!("image{i}")))
            .collect();

        let output_columns = [
            "code",
            "name",
            "defaultCategory",
            "categoryText",
            "shortDescription",
            "description",
            "price",
            "currency",
            "percentVat",
            "manufacturer",
            "weight",
            "itemType",
            "productVisibility",
            "seoTitle",
            "metaDescription",
            "seoKeywords",
        ]
        .into_iter()
        .map(ToString::to_string)
        .chain(image_columns.iter().cloned())
        .chain(["aiProcessed", "aiProcessedDate"].into_iter().map(ToString::to_string))
        .collect();

        Self {
            mappings,
            default_values,
            output_columns,
            image_source_column: "Obrázky".to_string(),
            image_columns,
            category_source_column: columns::CATEGORY.to_string(),
            category_prefix: defaults::CATEGORY_PREFIX.to_string(),
            category_targets: vec!["defaultCategory".to_string(), "categoryText".to_string()],
            code_column: "code".to_string(),
        }
    }
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let e = &self.enrichment;
        if e.batch_size == 0 {
            bail!("enrichment.batch_size must be greater than 0");
        }
        if e.max_workers == 0 {
            bail!("enrichment.max_workers must be greater than 0");
        }
        if e.retry.max_attempts == 0 {
            bail!("enrichment.retry.max_attempts must be greater than 0");
        }
        if e.max_calls_per_window == 0 || e.window_secs == 0 {
            bail!("enrichment quota window must allow at least one call");
        }
        if !(0.0..=2.0).contains(&e.temperature) {
            bail!("enrichment.temperature must be between 0.0 and 2.0");
        }
        Ok(())
    }
}

/// Loads and saves `AppConfig`
pub struct ConfigManager {
    config_path: PathBuf,
    env_prefix: String,
    env_source: Option<config::Map<String, String>>,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Manager for the default config file location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(defaults::CONFIG_FILE_NAME);
        Ok(Self::with_path(config_path))
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            env_prefix: defaults::ENV_PREFIX.to_string(),
            env_source: None,
        }
    }

    /// Read overrides from `source` instead of the process environment
    #[must_use]
    pub fn with_env_source(mut self, source: config::Map<String, String>) -> Self {
        self.env_source = Some(source);
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file, creating default if it doesn't exist.
    ///
    /// A file that cannot be parsed is backed up next to the original and
    /// replaced with defaults.
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            self.save_config(&AppConfig::default()).await?;
        }

        let config = match self.build_layered() {
            Ok(config) => config,
            Err(parse_error) => {
                warn!("⚠️  Failed to parse configuration: {}", parse_error);
                warn!("⚠️  Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Corrupted config backed up to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config).await?;
                default_config
            }
        };

        config.validate()?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    fn build_layered(&self) -> Result<AppConfig, config::ConfigError> {
        let environment = config::Environment::with_prefix(&self.env_prefix)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(self.env_source.clone());

        config::Config::builder()
            .add_source(
                config::File::from(self.config_path.as_path())
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(environment)
            .build()?
            .try_deserialize()
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {parent:?}"))?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }
}
