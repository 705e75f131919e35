//! Application layer - enrichment runs, curation session, export
//!
//! Services here coordinate domain logic with the infrastructure adapters.

pub mod curation_session;
pub mod dto;
pub mod enrichment_orchestrator;
pub mod enrichment_worker;
pub mod export_transformer;

pub use curation_session::CurationSession;
pub use dto::{EnrichmentRun, EnrichmentStats, FilterOutcome};
pub use enrichment_orchestrator::{EnrichmentOrchestrator, ProgressCallback};
pub use enrichment_worker::{BatchReport, EnrichmentError, EnrichmentWorker, RetryWait};
pub use export_transformer::ExportTransformer;
