//! Backing state for the input/output curation grids
//!
//! The input grid is read-only and filtered by category; the user checks
//! rows there and moves them into the editable output grid.

use std::collections::HashSet;
use tracing::{debug, info};

use super::dto::FilterOutcome;
use crate::domain::category_filter::{category_mask, extract_categories};
use crate::domain::{Dataset, TableModel, columns};

#[derive(Debug, Clone)]
pub struct CurationSession {
    input: TableModel,
    output: TableModel,
    /// Visibility per underlying input row
    visible: Vec<bool>,
    category_column: String,
}

impl Default for CurationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CurationSession {
    pub fn new() -> Self {
        Self {
            input: TableModel::new(Dataset::default(), false),
            output: TableModel::new(Dataset::default(), true),
            visible: Vec::new(),
            category_column: columns::CATEGORY.to_string(),
        }
    }

    #[must_use]
    pub fn with_category_column(mut self, column: impl Into<String>) -> Self {
        self.category_column = column.into();
        self
    }

    pub fn load_input(&mut self, dataset: Dataset) {
        info!(rows = dataset.len(), "Input dataset loaded");
        self.visible = vec![true; dataset.len()];
        self.input.set_dataset(dataset);
    }

    pub fn load_output(&mut self, dataset: Dataset) {
        info!(rows = dataset.len(), "Output dataset loaded");
        self.output.set_dataset(dataset);
    }

    pub const fn input(&self) -> &TableModel {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut TableModel {
        &mut self.input
    }

    pub const fn output(&self) -> &TableModel {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut TableModel {
        &mut self.output
    }

    pub fn output_dataset(&self) -> &Dataset {
        self.output.dataset()
    }

    pub fn categories(&self) -> Vec<String> {
        extract_categories(self.input.dataset(), &self.category_column)
    }

    /// Show rows in `selected` categories, plus rows with any SEO field
    /// filled when `preserve_seo` is set
    pub fn apply_filter(&mut self, selected: &[String], preserve_seo: bool) -> FilterOutcome {
        let data = self.input.dataset();
        let in_category = category_mask(data, &self.category_column, selected);

        let mut outcome = FilterOutcome::default();
        self.visible = in_category
            .iter()
            .enumerate()
            .map(|(row, &member)| {
                let kept_for_seo = preserve_seo && !member && has_seo_content(data, row);
                if kept_for_seo {
                    outcome.preserved_by_seo += 1;
                }
                member || kept_for_seo
            })
            .collect();
        outcome.visible = self.visible.iter().filter(|&&v| v).count();

        debug!(
            categories = selected.len(),
            preserve_seo,
            visible = outcome.visible,
            preserved = outcome.preserved_by_seo,
            "Category filter applied"
        );
        outcome
    }

    /// Whether the input row at a display position passes the current filter
    pub fn is_visible(&self, display_row: usize) -> bool {
        self.input
            .underlying_row(display_row)
            .and_then(|row| self.visible.get(row).copied())
            .unwrap_or(false)
    }

    pub fn visible_rows(&self) -> Vec<usize> {
        (0..self.input.row_count())
            .filter(|&row| self.is_visible(row))
            .collect()
    }

    pub fn check_all_visible(&mut self) -> usize {
        let rows = self.visible_rows();
        let count = rows.len();
        self.input.check_rows(rows);
        count
    }

    pub fn uncheck_all(&mut self) {
        self.input.clear_checked();
    }

    /// Move checked input rows into the output grid.
    ///
    /// Output rows sharing a code with a moved row are dropped first, so a
    /// re-added product lands at the end. Checks are cleared afterwards.
    pub fn add_checked_to_output(&mut self) -> usize {
        let selected = self.input.checked_records();
        if selected.is_empty() {
            return 0;
        }

        let codes: HashSet<String> = (0..selected.len())
            .filter_map(|row| selected.value(row, columns::CODE))
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(ToString::to_string)
            .collect();

        let mut output = self.output.dataset().clone();
        if let Some(code_index) = output.column_index(columns::CODE) {
            output.retain_rows(|_, cells| {
                cells
                    .get(code_index)
                    .is_none_or(|code| !codes.contains(code.trim()))
            });
        }
        output.concat_dedup(&selected);

        let added = selected.len();
        self.output.set_dataset(output);
        self.input.clear_checked();
        info!(added, output_rows = self.output.row_count(), "➕ Rows added to output");
        added
    }
}

fn has_seo_content(data: &Dataset, row: usize) -> bool {
    columns::SEO_COLUMNS
        .iter()
        .any(|column| data.value(row, column).is_some_and(|v| !v.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SortColumn, SortOrder};

    fn input() -> Dataset {
        Dataset::with_rows(
            vec![
                columns::CODE.to_string(),
                columns::NAME.to_string(),
                columns::CATEGORY.to_string(),
                columns::SEO_TITLE.to_string(),
            ],
            vec![
                vec!["A1".into(), "Hrniec".into(), "Kuchyňa/Hrnce".into(), "".into()],
                vec![
                    "B2".into(),
                    "Stolička".into(),
                    "Nábytok".into(),
                    "Pohodlná stolička".into(),
                ],
                vec!["C3".into(), "Panvica".into(), "Kuchyňa/Hrnce".into(), "".into()],
                vec!["D4".into(), "Lampa".into(), "Svetlá".into(), "".into()],
            ],
        )
    }

    fn session() -> CurationSession {
        let mut session = CurationSession::new();
        session.load_input(input());
        session
    }

    #[test]
    fn test_categories_are_sorted_and_unique() {
        assert_eq!(
            session().categories(),
            vec!["Kuchyňa/Hrnce".to_string(), "Nábytok".into(), "Svetlá".into()]
        );
    }

    #[test]
    fn test_filter_with_seo_preservation() {
        let mut session = session();

        let plain = session.apply_filter(&["Kuchyňa/Hrnce".to_string()], false);
        assert_eq!(plain, FilterOutcome { visible: 2, preserved_by_seo: 0 });
        assert!(!session.is_visible(1));

        let preserved = session.apply_filter(&["Kuchyňa/Hrnce".to_string()], true);
        assert_eq!(preserved, FilterOutcome { visible: 3, preserved_by_seo: 1 });
        assert!(session.is_visible(1));
        assert!(!session.is_visible(3));
    }

    #[test]
    fn test_visibility_follows_sorting() {
        let mut session = session();
        session.apply_filter(&["Svetlá".to_string()], false);
        session.input_mut().sort(SortColumn::Data(0), SortOrder::Descending);

        assert_eq!(session.visible_rows(), vec![0]);
        assert_eq!(session.input().display_value(0, 1), Some("D4"));
    }

    #[test]
    fn test_check_all_visible_then_add() {
        let mut session = session();
        session.apply_filter(&["Kuchyňa/Hrnce".to_string()], false);

        assert_eq!(session.check_all_visible(), 2);
        assert_eq!(session.add_checked_to_output(), 2);

        let output = session.output_dataset();
        assert_eq!(output.len(), 2);
        assert_eq!(output.value(0, columns::CODE), Some("A1"));
        assert_eq!(output.value(1, columns::CODE), Some("C3"));
        assert_eq!(session.input().checked_count(), 0);
    }

    #[test]
    fn test_re_adding_replaces_by_code() {
        let mut session = session();
        session.input_mut().check_rows([0, 1]);
        session.add_checked_to_output();

        session.output_mut().set_data(
            0,
            2,
            crate::domain::CellInput::Text("Upravený hrniec".into()),
        );
        session.input_mut().check_rows([0]);
        session.add_checked_to_output();

        let output = session.output_dataset();
        assert_eq!(output.len(), 2);
        assert_eq!(output.value(0, columns::CODE), Some("B2"));
        assert_eq!(output.value(1, columns::CODE), Some("A1"));
        assert_eq!(output.value(1, columns::NAME), Some("Hrniec"));
    }

    #[test]
    fn test_nothing_checked_adds_nothing() {
        let mut session = session();
        assert_eq!(session.add_checked_to_output(), 0);
        assert!(session.output_dataset().is_empty());
    }

    #[test]
    fn test_custom_category_column() {
        let mut session = CurationSession::new().with_category_column(columns::NAME);
        session.load_input(input());

        assert_eq!(session.categories().len(), 4);
        let outcome = session.apply_filter(&["Lampa".to_string()], false);
        assert_eq!(outcome.visible, 1);
        assert_eq!(session.visible_rows(), vec![3]);
    }

    #[test]
    fn test_uncheck_all() {
        let mut session = session();
        session.check_all_visible();
        assert_eq!(session.input().checked_count(), 4);
        session.uncheck_all();
        assert_eq!(session.input().checked_count(), 0);
    }
}
