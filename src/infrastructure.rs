//! Infrastructure layer: storage, configuration, logging, and the remote
//! text-generation integration

pub mod config;
pub mod csv_store;
pub mod gemini_client;
pub mod logging;
pub mod quota_guard;
pub mod response_parser;
pub mod retry_policy;

pub use config::{
    AppConfig, ConfigManager, EnrichmentConfig, ExportConfig, LoggingConfig, StorageConfig,
};
pub use csv_store::{
    CheckpointWriter, OutputEncoding, SourceEncoding, StorageError, StorageResult, load_dataset,
    save_dataset,
};
pub use gemini_client::{GeminiClient, GeneratedText, GenerationError, TextGenerator};
pub use logging::{get_log_directory, init_logging_with_config};
pub use quota_guard::{QuotaGuard, QuotaLimits, QuotaSnapshot};
pub use response_parser::{ReplyParseError, parse_reply};
pub use retry_policy::{FailureKind, RetryBudget, RetryDecision, RetryPolicy};
