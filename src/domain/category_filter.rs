//! Category extraction and filtering over a category text column

use std::collections::{BTreeSet, HashSet};

use super::dataset::Dataset;

/// Sorted unique non-empty category values of `column`.
///
/// A missing column yields an empty list.
pub fn extract_categories(dataset: &Dataset, column: &str) -> Vec<String> {
    let Some(index) = dataset.column_index(column) else {
        return Vec::new();
    };

    dataset
        .rows()
        .iter()
        .filter_map(|row| row.get(index))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Per-row membership in the selected categories.
///
/// An empty selection matches every row.
pub fn category_mask(dataset: &Dataset, column: &str, selected: &[String]) -> Vec<bool> {
    if selected.is_empty() {
        return vec![true; dataset.len()];
    }
    let Some(index) = dataset.column_index(column) else {
        return vec![false; dataset.len()];
    };

    let wanted: HashSet<&str> = selected.iter().map(|s| s.trim()).collect();
    dataset
        .rows()
        .iter()
        .map(|row| row.get(index).is_some_and(|v| wanted.contains(v.trim())))
        .collect()
}

/// Rows whose category is among `selected`; empty selection keeps everything
pub fn filter_by_categories(dataset: &Dataset, column: &str, selected: &[String]) -> Dataset {
    let mask = category_mask(dataset, column, selected);
    let mut filtered = dataset.clone();
    filtered.retain_rows(|row, _| mask.get(row).copied().unwrap_or(false));
    filtered
}

/// Case-insensitive substring search; an empty query returns all categories
pub fn search_categories(categories: &[String], query: &str) -> Vec<String> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return categories.to_vec();
    }
    categories
        .iter()
        .filter(|c| c.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
