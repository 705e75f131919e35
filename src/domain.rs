//! Domain module - catalog records, datasets and the grid model
//!
//! Everything here is synchronous and free of I/O.

pub mod batch;
pub mod category_filter;
pub mod dataset;
pub mod error;
pub mod product;
pub mod table_model;

pub use batch::{Batch, DEFAULT_BATCH_SIZE, chunk_unprocessed};
pub use dataset::Dataset;
pub use error::{DomainError, DomainResult};
pub use product::{ProductRecord, columns};
pub use table_model::{CellHighlight, CellInput, SortColumn, SortOrder, TableModel};
