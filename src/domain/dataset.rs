//! Tabular dataset of product records sharing one column schema

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::{DomainError, DomainResult};
use super::product::{ProductRecord, columns, identity_from, is_processed_flag};

/// Ordered rows of text cells under a fixed column schema.
///
/// Every row always holds exactly `columns.len()` cells; constructors and
/// `ensure_column` pad rows to keep that true.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a dataset from raw rows, padding or truncating ragged rows
    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut dataset = Self::new(columns);
        for row in rows {
            dataset.push_row(row);
        }
        dataset
    }

    pub fn from_records(columns: Vec<String>, records: &[ProductRecord]) -> Self {
        let mut dataset = Self::new(columns);
        for record in records {
            dataset.append(record);
        }
        dataset
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Cell lookup by column name
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        self.cell(row, self.column_index(column)?)
    }

    pub fn set_cell(
        &mut self,
        row: usize,
        column: usize,
        value: impl Into<String>,
    ) -> DomainResult<()> {
        let len = self.rows.len();
        let width = self.columns.len();
        let cells = self
            .rows
            .get_mut(row)
            .ok_or(DomainError::RowOutOfRange { row, len })?;
        let cell = cells
            .get_mut(column)
            .ok_or(DomainError::ColumnOutOfRange { column, len: width })?;
        *cell = value.into();
        Ok(())
    }

    pub fn set_value(
        &mut self,
        row: usize,
        column: &str,
        value: impl Into<String>,
    ) -> DomainResult<()> {
        let index = self
            .column_index(column)
            .ok_or_else(|| DomainError::UnknownColumn { name: column.to_string() })?;
        self.set_cell(row, index, value)
    }

    /// Add a column filled with empty cells unless it already exists.
    /// Returns the column index either way.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.columns.len() - 1
    }

    /// Append raw cells in schema order
    pub fn push_row(&mut self, mut cells: Vec<String>) {
        cells.resize(self.columns.len(), String::new());
        self.rows.push(cells);
    }

    /// Append a record; fields outside the schema are ignored
    pub fn append(&mut self, record: &ProductRecord) {
        let cells = self
            .columns
            .iter()
            .map(|c| record.get(c).unwrap_or_default().to_string())
            .collect();
        self.rows.push(cells);
    }

    pub fn record(&self, row: usize) -> Option<ProductRecord> {
        let cells = self.rows.get(row)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(cells.iter().cloned())
                .collect(),
        )
    }

    pub fn records(&self) -> impl Iterator<Item = ProductRecord> + '_ {
        (0..self.rows.len()).filter_map(|row| self.record(row))
    }

    /// Identity key of a row: code, falling back to name
    pub fn identity_of(&self, row: usize) -> Option<String> {
        identity_from(self.value(row, columns::CODE), self.value(row, columns::NAME))
    }

    /// Map of identity key to the first row carrying it
    pub fn identity_index(&self) -> HashMap<String, usize> {
        let mut index = HashMap::with_capacity(self.rows.len());
        for row in 0..self.rows.len() {
            if let Some(identity) = self.identity_of(row) {
                index.entry(identity).or_insert(row);
            }
        }
        index
    }

    /// Append `other`, replacing rows whose identity already exists.
    ///
    /// Columns are unioned. Rows without an identity are always appended.
    pub fn concat_dedup(&mut self, other: &Self) {
        for column in &other.columns {
            self.ensure_column(column);
        }
        let mut index = self.identity_index();

        for row in 0..other.len() {
            let Some(record) = other.record(row) else { continue };
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|c| record.get(c).unwrap_or_default().to_string())
                .collect();

            match record.identity() {
                Some(identity) => match index.get(&identity) {
                    Some(&existing) => self.rows[existing] = cells,
                    None => {
                        index.insert(identity, self.rows.len());
                        self.rows.push(cells);
                    }
                },
                None => self.rows.push(cells),
            }
        }
    }

    /// New dataset holding the given rows in the given order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Keep only rows for which `keep(row_index, cells)` returns true
    pub fn retain_rows(&mut self, mut keep: impl FnMut(usize, &[String]) -> bool) {
        let mut index = 0;
        self.rows.retain(|cells| {
            let kept = keep(index, cells);
            index += 1;
            kept
        });
    }

    pub fn is_row_processed(&self, row: usize) -> bool {
        is_processed_flag(self.value(row, columns::PROCESSED_FLAG))
    }

    /// Original indices of rows still needing enrichment, in order
    pub fn unprocessed_rows(&self) -> Vec<usize> {
        (0..self.rows.len())
            .filter(|&row| !self.is_row_processed(row))
            .collect()
    }
}
