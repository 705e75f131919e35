//! Reshape curated rows into the e-shop import format

use tracing::{debug, info, warn};

use crate::domain::Dataset;
use crate::infrastructure::config::ExportConfig;

/// Split a comma-separated URL list, trimming blanks, keeping at most `limit`
pub fn split_image_urls(value: &str, limit: usize) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .take(limit)
        .collect()
}

/// `A/B/C` becomes `<prefix>A > B > C`; an empty path yields the bare prefix
pub fn category_path(prefix: &str, value: &str) -> String {
    format!("{prefix}{}", value.replace('/', " > "))
}

#[derive(Debug, Clone, Default)]
pub struct ExportTransformer {
    config: ExportConfig,
}

impl ExportTransformer {
    pub const fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Full pipeline: mappings, images, category, code, column set, defaults
    pub fn transform(&self, source: &Dataset) -> Dataset {
        let mut output = Dataset::with_rows(Vec::new(), vec![Vec::new(); source.len()]);

        self.apply_direct_mappings(source, &mut output);
        self.split_images(source, &mut output);
        self.transform_category(source, &mut output);
        self.uppercase_code(&mut output);
        let mut output = self.ensure_columns(output);
        self.apply_default_values(&mut output);

        info!(
            rows = output.len(),
            columns = output.column_count(),
            "📦 Export transform complete"
        );
        output
    }

    /// Copy every mapped source column into its target column, in mapping order
    pub fn apply_direct_mappings(&self, source: &Dataset, output: &mut Dataset) {
        for mapping in &self.config.mappings {
            let Some(index) = source.column_index(&mapping.source) else {
                debug!(column = %mapping.source, "Mapped column missing in source");
                continue;
            };
            let values = source
                .rows()
                .iter()
                .map(|row| row.get(index).cloned().unwrap_or_default())
                .collect();
            write_column(output, &mapping.target, values);
        }
    }

    /// Fan the image URL list out over the configured image columns
    pub fn split_images(&self, source: &Dataset, output: &mut Dataset) {
        let Some(index) = source.column_index(&self.config.image_source_column) else {
            warn!(column = %self.config.image_source_column, "Image column not found");
            return;
        };

        let slots = self.config.image_columns.len();
        let split: Vec<Vec<&str>> = source
            .rows()
            .iter()
            .map(|row| split_image_urls(row.get(index).map_or("", String::as_str), slots))
            .collect();

        for (slot, column) in self.config.image_columns.iter().enumerate() {
            let values = split
                .iter()
                .map(|urls| urls.get(slot).map(ToString::to_string).unwrap_or_default())
                .collect();
            write_column(output, column, values);
        }
    }

    pub fn transform_category(&self, source: &Dataset, output: &mut Dataset) {
        let Some(index) = source.column_index(&self.config.category_source_column) else {
            warn!(column = %self.config.category_source_column, "Category column not found");
            return;
        };

        let values: Vec<String> = source
            .rows()
            .iter()
            .map(|row| {
                category_path(
                    &self.config.category_prefix,
                    row.get(index).map_or("", String::as_str),
                )
            })
            .collect();
        for column in &self.config.category_targets {
            write_column(output, column, values.clone());
        }
    }

    pub fn uppercase_code(&self, output: &mut Dataset) {
        let Some(index) = output.column_index(&self.config.code_column) else {
            return;
        };
        let values = output
            .rows()
            .iter()
            .map(|row| row.get(index).map(|code| code.to_uppercase()).unwrap_or_default())
            .collect();
        write_column(output, &self.config.code_column, values);
    }

    /// Keep exactly the configured output columns, in order, adding empty ones.
    ///
    /// Without configured columns the produced columns are kept as they are.
    pub fn ensure_columns(&self, output: Dataset) -> Dataset {
        if self.config.output_columns.is_empty() {
            return output;
        }

        let indices: Vec<Option<usize>> = self
            .config
            .output_columns
            .iter()
            .map(|column| output.column_index(column))
            .collect();
        let rows = output
            .rows()
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|index| index.and_then(|i| row.get(i).cloned()).unwrap_or_default())
                    .collect()
            })
            .collect();
        Dataset::with_rows(self.config.output_columns.clone(), rows)
    }

    /// Fill empty cells of existing columns with their default value
    pub fn apply_default_values(&self, output: &mut Dataset) {
        for default in &self.config.default_values {
            let Some(index) = output.column_index(&default.column) else {
                continue;
            };
            let mut filled = 0;
            let values = output
                .rows()
                .iter()
                .map(|row| match row.get(index) {
                    Some(value) if !value.trim().is_empty() => value.clone(),
                    _ => {
                        filled += 1;
                        default.value.clone()
                    }
                })
                .collect();
            write_column(output, &default.column, values);
            if filled > 0 {
                debug!(column = %default.column, filled, "Default value applied");
            }
        }
    }
}

fn write_column(output: &mut Dataset, column: &str, values: Vec<String>) {
    let index = output.ensure_column(column);
    for (row, value) in values.into_iter().enumerate() {
        if let Err(e) = output.set_cell(row, index, value) {
            warn!(column, row, error = %e, "Failed to write export cell");
        }
    }
}
