//! Catalog Curator - product catalog curation with batched AI enrichment
//!
//! Semicolon-delimited catalog files are loaded into a [`domain::Dataset`],
//! unprocessed rows are enriched in rate-limited batches through a remote
//! text-generation endpoint, and curated rows are reshaped for e-shop import.

pub mod application;
pub mod domain;
pub mod infrastructure;
