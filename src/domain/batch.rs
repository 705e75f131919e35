//! Batch chunking of unprocessed rows

use serde::Serialize;

use super::dataset::Dataset;
use super::error::{DomainError, DomainResult};
use super::product::{ProductRecord, columns};

/// Default number of products per remote call
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// One remote-call unit: unprocessed records plus their original row indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position in the chunked sequence
    pub number: usize,
    pub row_indices: Vec<usize>,
    pub records: Vec<ProductRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First and last original row index covered by this batch
    pub fn row_range(&self) -> Option<(usize, usize)> {
        Some((*self.row_indices.first()?, *self.row_indices.last()?))
    }

    /// Compact JSON array sent as the prompt body.
    ///
    /// Only identity, name, category and enrichable fields are included.
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        let payload: Vec<PayloadItem<'_>> = self.records.iter().map(PayloadItem::from).collect();
        serde_json::to_string(&payload)
    }
}

#[derive(Serialize)]
#[serde(transparent)]
struct PayloadItem<'a>(std::collections::BTreeMap<&'a str, &'a str>);

impl<'a> From<&'a ProductRecord> for PayloadItem<'a> {
    fn from(record: &'a ProductRecord) -> Self {
        Self(
            columns::PAYLOAD_COLUMNS
                .iter()
                .filter_map(|&c| record.get(c).map(|v| (c, v)))
                .collect(),
        )
    }
}

/// Split the rows not yet marked processed into batches of `batch_size`.
///
/// Original row order is preserved within and across batches.
pub fn chunk_unprocessed(dataset: &Dataset, batch_size: usize) -> DomainResult<Vec<Batch>> {
    if batch_size == 0 {
        return Err(DomainError::BatchSizeZero);
    }

    let pending = dataset.unprocessed_rows();
    let batches = pending
        .chunks(batch_size)
        .enumerate()
        .map(|(i, rows)| Batch {
            number: i + 1,
            row_indices: rows.to_vec(),
            records: rows.iter().filter_map(|&r| dataset.record(r)).collect(),
        })
        .collect();

    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dataset_with_flags(flags: &[bool]) -> Dataset {
        Dataset::with_rows(
            vec![columns::CODE.to_string(), columns::PROCESSED_FLAG.to_string()],
            flags
                .iter()
                .enumerate()
                .map(|(i, &done)| {
                    vec![format!("P{i}"), if done { "TRUE".into() } else { "False".into() }]
                })
                .collect(),
        )
    }

    #[test]
    fn test_empty_dataset_yields_no_batches() {
        let batches = chunk_unprocessed(&Dataset::default(), DEFAULT_BATCH_SIZE).unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dataset = dataset_with_flags(&[false]);
        assert_eq!(chunk_unprocessed(&dataset, 0), Err(DomainError::BatchSizeZero));
    }

    #[test]
    fn test_batches_skip_processed_rows() {
        let dataset = dataset_with_flags(&[true, false, false, true, false]);
        let batches = chunk_unprocessed(&dataset, 2).unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].row_indices, vec![1, 2]);
        assert_eq!(batches[0].row_range(), Some((1, 2)));
        assert_eq!(batches[1].row_indices, vec![4]);
        assert_eq!(batches[1].number, 2);
        assert_eq!(batches[1].records[0].identity().as_deref(), Some("P4"));
    }

    #[test]
    fn test_payload_contains_only_prompt_fields() {
        let dataset = Dataset::with_rows(
            vec![columns::CODE.to_string(), "Cena".to_string(), columns::NAME.to_string()],
            vec![vec!["A1".into(), "99".into(), "Stôl".into()]],
        );
        let batch = &chunk_unprocessed(&dataset, 10).unwrap()[0];
        let payload = batch.payload_json().unwrap();

        assert!(payload.starts_with('['));
        assert!(payload.contains("\"Kat. číslo\":\"A1\""));
        assert!(!payload.contains("Cena"));
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_unprocessed_rows_in_order(
            flags in proptest::collection::vec(any::<bool>(), 0..300),
            batch_size in 1usize..80,
        ) {
            let dataset = dataset_with_flags(&flags);
            let pending = dataset.unprocessed_rows();
            let batches = chunk_unprocessed(&dataset, batch_size).unwrap();

            prop_assert_eq!(batches.len(), pending.len().div_ceil(batch_size));
            let flattened: Vec<usize> =
                batches.iter().flat_map(|b| b.row_indices.clone()).collect();
            prop_assert_eq!(flattened, pending);
            prop_assert!(batches.iter().all(|b| b.len() <= batch_size && !b.is_empty()));
        }
    }
}
