//! Row-reorder index backing an interactive grid
//!
//! The model keeps the dataset in its original order and exposes a sorted
//! *view* through a permutation: display position `i` shows underlying row
//! `mapping[i]`. Column 0 of the grid is a synthetic checkbox column, so
//! data column `k` is grid column `k + 1`.
//!
//! Checked rows are stored as display positions. Every read that reaches
//! the dataset translates those positions through the mapping, and every
//! re-sort re-targets them so the same records stay checked.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use super::dataset::Dataset;
use super::product::columns;

/// Grid column holding the row checkboxes
pub const SELECTION_COLUMN: usize = 0;

/// Header text of the checkbox column
pub const SELECTION_HEADER: &str = "Vybrať";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort target: the checkbox pseudo-column or a data column index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Selection,
    Data(usize),
}

impl SortColumn {
    /// Translate a grid column (checkbox column included) into a sort target
    pub const fn from_grid_column(column: usize) -> Self {
        if column == SELECTION_COLUMN {
            Self::Selection
        } else {
            Self::Data(column - 1)
        }
    }
}

/// The single mutation entry point payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellInput {
    Check(bool),
    Text(String),
}

/// Background hint for a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellHighlight {
    Modified,
    SeoFilled,
}

#[derive(Debug, Clone, Default)]
pub struct TableModel {
    data: Dataset,
    editable: bool,
    mapping: Vec<usize>,
    sort_state: Option<(SortColumn, SortOrder)>,
    checked: BTreeSet<usize>,
    /// (underlying row, data column)
    modified: HashSet<(usize, usize)>,
}

impl TableModel {
    pub fn new(data: Dataset, editable: bool) -> Self {
        let mut model = Self {
            editable,
            ..Self::default()
        };
        model.set_dataset(data);
        model
    }

    /// Replace the dataset; mapping resets to identity, checks and edits clear
    pub fn set_dataset(&mut self, data: Dataset) {
        self.mapping = (0..data.len()).collect();
        self.data = data;
        self.sort_state = None;
        self.checked.clear();
        self.modified.clear();
    }

    pub fn dataset(&self) -> &Dataset {
        &self.data
    }

    pub fn mapping(&self) -> &[usize] {
        &self.mapping
    }

    pub const fn sort_state(&self) -> Option<(SortColumn, SortOrder)> {
        self.sort_state
    }

    pub const fn is_editable(&self) -> bool {
        self.editable
    }

    // --- grid read contract ---

    pub fn row_count(&self) -> usize {
        self.mapping.len()
    }

    /// Data columns plus the checkbox column
    pub fn column_count(&self) -> usize {
        self.data.column_count() + 1
    }

    pub fn header(&self, column: usize) -> Option<&str> {
        if column == SELECTION_COLUMN {
            return Some(SELECTION_HEADER);
        }
        self.data.columns().get(column - 1).map(String::as_str)
    }

    /// Underlying dataset row shown at a display position
    pub fn underlying_row(&self, row: usize) -> Option<usize> {
        self.mapping.get(row).copied()
    }

    pub fn display_value(&self, row: usize, column: usize) -> Option<&str> {
        let underlying = self.underlying_row(row)?;
        if column == SELECTION_COLUMN {
            return Some("");
        }
        self.data.cell(underlying, column - 1)
    }

    pub fn is_checked(&self, row: usize) -> bool {
        self.checked.contains(&row)
    }

    /// Whether the grid may edit this column
    pub const fn is_cell_editable(&self, column: usize) -> bool {
        column == SELECTION_COLUMN || self.editable
    }

    pub fn is_modified(&self, row: usize, column: usize) -> bool {
        if column == SELECTION_COLUMN {
            return false;
        }
        self.underlying_row(row)
            .is_some_and(|u| self.modified.contains(&(u, column - 1)))
    }

    pub fn highlight(&self, row: usize, column: usize) -> Option<CellHighlight> {
        if self.is_modified(row, column) {
            return Some(CellHighlight::Modified);
        }
        let header = self.header(column)?;
        let value = self.display_value(row, column)?;
        (column != SELECTION_COLUMN
            && columns::SEO_COLUMNS.contains(&header)
            && !value.trim().is_empty())
        .then_some(CellHighlight::SeoFilled)
    }

    // --- grid write contract ---

    /// Apply a checkbox toggle or a cell edit.
    ///
    /// Returns whether the model changed.
    pub fn set_data(&mut self, row: usize, column: usize, input: CellInput) -> bool {
        let Some(underlying) = self.underlying_row(row) else {
            return false;
        };

        match (column, input) {
            (SELECTION_COLUMN, CellInput::Check(checked)) => {
                self.set_checked(row, checked);
                true
            }
            (SELECTION_COLUMN, CellInput::Text(_)) | (_, CellInput::Check(_)) => false,
            (_, CellInput::Text(value)) => {
                if !self.is_cell_editable(column) {
                    return false;
                }
                let data_column = column - 1;
                let Some(current) = self.data.cell(underlying, data_column) else {
                    return false;
                };
                if current == value {
                    return false;
                }
                if self.data.set_cell(underlying, data_column, value).is_err() {
                    return false;
                }
                self.modified.insert((underlying, data_column));
                true
            }
        }
    }

    // --- selection ---

    pub fn set_checked(&mut self, row: usize, checked: bool) {
        if row >= self.row_count() {
            return;
        }
        if checked {
            self.checked.insert(row);
        } else {
            self.checked.remove(&row);
        }
    }

    pub fn check_rows(&mut self, rows: impl IntoIterator<Item = usize>) {
        for row in rows {
            self.set_checked(row, true);
        }
    }

    pub fn clear_checked(&mut self) {
        self.checked.clear();
    }

    /// Checked display positions
    pub fn checked_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.checked.iter().copied()
    }

    pub fn checked_count(&self) -> usize {
        self.checked.len()
    }

    /// Checked rows translated to underlying dataset indices, in display order
    pub fn checked_underlying_rows(&self) -> Vec<usize> {
        self.checked
            .iter()
            .filter_map(|&row| self.underlying_row(row))
            .collect()
    }

    /// Records the user checked, resolved through the current mapping
    pub fn checked_records(&self) -> Dataset {
        self.data.select(&self.checked_underlying_rows())
    }

    // --- sorting ---

    /// Rebuild the mapping with a stable sort on the target column.
    ///
    /// Sorting always starts from the original row order, so ties keep
    /// dataset order in both directions.
    pub fn sort(&mut self, column: SortColumn, order: SortOrder) {
        if let SortColumn::Data(k) = column {
            if k >= self.data.column_count() {
                return;
            }
        }

        let checked_underlying: HashSet<usize> =
            self.checked_underlying_rows().into_iter().collect();
        let mut mapping: Vec<usize> = (0..self.data.len()).collect();

        let keys: Vec<CellKey<'_>> = match column {
            SortColumn::Selection => (0..self.data.len())
                .map(|row| CellKey::Checked(checked_underlying.contains(&row)))
                .collect(),
            SortColumn::Data(k) => (0..self.data.len())
                .map(|row| CellKey::new(self.data.cell(row, k).unwrap_or_default()))
                .collect(),
        };
        mapping.sort_by(|&a, &b| {
            let ordering = keys[a].compare(&keys[b]);
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });

        let mut position_of = vec![0; mapping.len()];
        for (position, &row) in mapping.iter().enumerate() {
            position_of[row] = position;
        }
        self.checked = checked_underlying.iter().map(|&row| position_of[row]).collect();
        self.mapping = mapping;
        self.sort_state = Some((column, order));
    }
}

/// Sort key for a cell: numbers before text, numbers compared numerically
#[derive(Debug, PartialEq)]
enum CellKey<'a> {
    Checked(bool),
    Number(f64),
    Text(&'a str),
}

impl<'a> CellKey<'a> {
    fn new(value: &'a str) -> Self {
        value
            .trim()
            .parse::<f64>()
            .map_or(Self::Text(value), Self::Number)
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Checked(a), Self::Checked(b)) => a.cmp(b),
            (Self::Checked(_), _) => Ordering::Less,
            (_, Self::Checked(_)) => Ordering::Greater,
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
        }
    }
}
