//! Data transfer objects returned by the application services

use serde::Serialize;

use crate::domain::Dataset;

/// Counters for one enrichment run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    /// Rows that were unprocessed when the run started
    pub should_process: usize,
    /// Records merged back into the dataset
    pub processed: usize,
    pub batches_total: usize,
    pub batches_succeeded: usize,
    pub batches_failed: usize,
    /// Batches whose reply held no array
    pub batches_empty: usize,
}

impl EnrichmentStats {
    pub const fn batches_completed(&self) -> usize {
        self.batches_succeeded + self.batches_failed + self.batches_empty
    }
}

/// Result of an enrichment run: the merged dataset plus counters
#[derive(Debug, Clone)]
pub struct EnrichmentRun {
    pub dataset: Dataset,
    pub stats: EnrichmentStats,
}

/// Rows shown after a category filter was applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOutcome {
    pub visible: usize,
    /// Visible only because an SEO field was already filled
    pub preserved_by_seo: usize,
}
