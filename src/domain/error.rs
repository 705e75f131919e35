//! Domain errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Row {row} out of range (dataset has {len} rows)")]
    RowOutOfRange { row: usize, len: usize },

    #[error("Column index {column} out of range (dataset has {len} columns)")]
    ColumnOutOfRange { column: usize, len: usize },

    #[error("Unknown column: {name}")]
    UnknownColumn { name: String },

    #[error("Batch size must be greater than zero")]
    BatchSizeZero,
}

pub type DomainResult<T> = Result<T, DomainError>;
