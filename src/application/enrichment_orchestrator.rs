//! Enrichment run over a whole dataset
//!
//! Batches are dispatched to a bounded pool of tasks. Results are merged in
//! completion order by the task that drives [`EnrichmentOrchestrator::run`];
//! worker tasks never touch the dataset.

use anyhow::{Context, Result};
use chrono::Local;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::dto::{EnrichmentRun, EnrichmentStats};
use super::enrichment_worker::{BatchReport, EnrichmentWorker};
use crate::domain::product::{PROCESSED_AT_FORMAT, PROCESSED_TRUE};
use crate::domain::{Dataset, ProductRecord, chunk_unprocessed, columns};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::csv_store::CheckpointWriter;
use crate::infrastructure::gemini_client::{GeminiClient, TextGenerator};
use crate::infrastructure::quota_guard::QuotaGuard;

/// Called after every finished batch with `(processed_so_far, total_to_process)`
pub type ProgressCallback = Box<dyn FnMut(usize, usize) + Send>;

pub struct EnrichmentOrchestrator {
    worker: Option<Arc<EnrichmentWorker>>,
    batch_size: usize,
    max_workers: usize,
    checkpoint: CheckpointWriter,
}

impl EnrichmentOrchestrator {
    /// `worker` is `None` when no credentials are available; runs are then no-ops
    pub fn new(
        worker: Option<EnrichmentWorker>,
        batch_size: usize,
        max_workers: usize,
        checkpoint: CheckpointWriter,
    ) -> Self {
        Self {
            worker: worker.map(Arc::new),
            batch_size,
            max_workers: max_workers.max(1),
            checkpoint,
        }
    }

    /// Wire the Gemini client, quota guard and checkpoint from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let enrichment = &config.enrichment;
        let client = GeminiClient::from_config(enrichment)
            .context("Failed to build text generation client")?;

        let worker = client.map(|client| {
            let generator: Arc<dyn TextGenerator> = Arc::new(client);
            let quota = Arc::new(QuotaGuard::new(enrichment.quota_limits()));
            let worker = EnrichmentWorker::new(generator, quota, enrichment.retry.clone());
            match &enrichment.system_instruction {
                Some(instruction) => worker.with_system_instruction(instruction.clone()),
                None => worker,
            }
        });

        let checkpoint = CheckpointWriter::in_work_dir(
            &config.storage.work_dir,
            config.storage.checkpoint_encoding,
        );
        Ok(Self::new(worker, enrichment.batch_size, enrichment.max_workers, checkpoint))
    }

    pub const fn is_enabled(&self) -> bool {
        self.worker.is_some()
    }

    pub const fn checkpoint(&self) -> &CheckpointWriter {
        &self.checkpoint
    }

    /// Enrich every unprocessed row of `dataset`
    pub async fn run(
        &self,
        mut dataset: Dataset,
        mut progress: Option<ProgressCallback>,
    ) -> Result<EnrichmentRun> {
        let Some(worker) = self.worker.as_ref() else {
            warn!("⚠️ No API key configured, enrichment skipped");
            return Ok(EnrichmentRun {
                dataset,
                stats: EnrichmentStats::default(),
            });
        };

        let mut stats = EnrichmentStats {
            should_process: dataset.unprocessed_rows().len(),
            ..EnrichmentStats::default()
        };
        if stats.should_process == 0 {
            info!("All rows already processed, nothing to enrich");
            return Ok(EnrichmentRun { dataset, stats });
        }

        dataset.ensure_column(columns::PROCESSED_FLAG);
        dataset.ensure_column(columns::PROCESSED_AT);

        let batches = chunk_unprocessed(&dataset, self.batch_size)?;
        stats.batches_total = batches.len();

        let run_id = Uuid::new_v4();
        let span = info_span!("enrichment_run", %run_id);
        async {
            info!(
                rows = stats.should_process,
                batches = stats.batches_total,
                workers = self.max_workers,
                "🚀 Starting enrichment run"
            );

            let identity_index = dataset.identity_index();
            let semaphore = Arc::new(Semaphore::new(self.max_workers));
            let mut in_flight = FuturesUnordered::new();

            for batch in batches {
                let permit = Arc::clone(&semaphore).acquire_owned();
                let worker = Arc::clone(worker);
                let batch_number = batch.number;
                let handle = tokio::spawn(
                    async move {
                        let _permit = match permit.await {
                            Ok(p) => p,
                            Err(e) => {
                                error!("Failed to acquire worker slot: {e}");
                                return None;
                            }
                        };
                        Some(worker.process(&batch).await)
                    }
                    .in_current_span(),
                );
                in_flight.push(async move { (batch_number, handle.await) });
            }

            while let Some((batch_number, joined)) = in_flight.next().await {
                match joined {
                    Ok(Some(report)) => {
                        self.apply_report(&mut dataset, &identity_index, report, &mut stats)
                            .await;
                    }
                    Ok(None) => stats.batches_failed += 1,
                    Err(e) => {
                        error!(batch = batch_number, error = %e, "❌ Batch task failed");
                        stats.batches_failed += 1;
                    }
                }

                if let Some(callback) = progress.as_mut() {
                    callback(stats.processed, stats.should_process);
                }
            }

            self.checkpoint.write(&dataset).await;
            info!(
                processed = stats.processed,
                total = stats.should_process,
                completed = stats.batches_completed(),
                succeeded = stats.batches_succeeded,
                failed = stats.batches_failed,
                empty = stats.batches_empty,
                "🏁 Enrichment run finished"
            );
        }
        .instrument(span)
        .await;

        Ok(EnrichmentRun { dataset, stats })
    }

    async fn apply_report(
        &self,
        dataset: &mut Dataset,
        identity_index: &HashMap<String, usize>,
        report: BatchReport,
        stats: &mut EnrichmentStats,
    ) {
        match report.result {
            Ok(Some(records)) => {
                let timestamp = Local::now().format(PROCESSED_AT_FORMAT).to_string();
                let merged = merge_records(dataset, identity_index, &records, &timestamp);
                stats.processed += merged;
                stats.batches_succeeded += 1;
                info!(
                    batch = report.batch_number,
                    merged,
                    returned = records.len(),
                    attempts = report.attempts,
                    "✅ Batch merged"
                );
                self.checkpoint.write(dataset).await;
            }
            Ok(None) => {
                stats.batches_empty += 1;
                warn!(batch = report.batch_number, "Batch returned no usable records");
            }
            Err(e) => {
                stats.batches_failed += 1;
                error!(
                    batch = report.batch_number,
                    rows = report.record_count,
                    error = %e,
                    "❌ Batch failed, rows stay unprocessed"
                );
            }
        }
    }
}

/// Write enriched fields of `records` into their matching rows.
///
/// Returns how many records found a row. Records without a match are dropped.
pub fn merge_records(
    dataset: &mut Dataset,
    identity_index: &HashMap<String, usize>,
    records: &[ProductRecord],
    timestamp: &str,
) -> usize {
    let mut merged = 0;
    for record in records {
        let Some(&row) = record.identity().as_ref().and_then(|id| identity_index.get(id)) else {
            debug!(identity = ?record.identity(), "No matching row for returned record");
            continue;
        };

        let mut updates: Vec<(&str, &str)> = columns::ENRICHED_COLUMNS
            .iter()
            .filter_map(|&column| record.get(column).map(|value| (column, value)))
            .collect();
        updates.push((columns::PROCESSED_FLAG, PROCESSED_TRUE));
        updates.push((columns::PROCESSED_AT, timestamp));

        for (column, value) in updates {
            dataset.ensure_column(column);
            if let Err(e) = dataset.set_value(row, column, value) {
                warn!(row, column, error = %e, "Failed to merge field");
            }
        }
        merged += 1;
    }
    merged
}
