//! Enrichment of one batch through the text-generation endpoint
//!
//! A worker owns nothing mutable of its own: it reads its batch, registers
//! calls with the shared quota guard, and hands back a report. Merging the
//! result into the dataset is the orchestrator's job.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::{Batch, ProductRecord};
use crate::infrastructure::gemini_client::{GenerationError, TextGenerator};
use crate::infrastructure::quota_guard::{QuotaGuard, estimate_tokens};
use crate::infrastructure::response_parser::{ReplyParseError, parse_reply};
use crate::infrastructure::retry_policy::{
    FailureKind, RetryBudget, RetryDecision, RetryPolicy, classify,
};

/// Instruction sent with every batch unless the config overrides it
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
Si copywriter a SEO špecialista pre e-shop s profesionálnym gastro vybavením.
Dostaneš JSON pole produktov. Pre každý produkt vráť objekt s rovnakými hodnotami \
polí \"Kat. číslo\" a \"Názov tovaru\" a s prepísanými poliami:
- \"Krátky popis\": 50 až 100 slov, HTML (<p>, <strong>, <br>)
- \"Dlhý popis\": 200 až 400 slov, HTML (<p>, <ul>, <li>, <strong>)
- \"SEO titulka\": 45 až 70 znakov
- \"SEO popis\": 120 až 160 znakov s výzvou k akcii
- \"SEO kľúčové slová\": 5 až 10 fráz oddelených čiarkou
Píš po slovensky. Odpovedz iba platným JSON poľom bez ďalšieho textu.";

#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("Failed to serialize batch payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Remote call failed after {attempts} attempts: {source}")]
    Remote {
        attempts: u32,
        #[source]
        source: GenerationError,
    },

    #[error("Reply could not be parsed after {attempts} attempts: {source}")]
    Parse {
        attempts: u32,
        #[source]
        source: ReplyParseError,
    },

    #[error("Rate limit persisted after {waits} waits: {last_error}")]
    RateLimitExhausted { waits: u32, last_error: String },
}

/// One sleep taken before retrying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryWait {
    /// 1-based attempt that failed
    pub attempt: u32,
    pub kind: FailureKind,
    pub delay: Duration,
    pub reason: String,
}

/// Outcome of processing one batch
#[derive(Debug)]
pub struct BatchReport {
    pub batch_number: usize,
    pub record_count: usize,
    /// `Ok(None)` is a soft failure: a reply arrived but held no array
    pub result: Result<Option<Vec<ProductRecord>>, EnrichmentError>,
    pub attempts: u32,
    pub waits: Vec<RetryWait>,
}

impl BatchReport {
    pub fn backoff_waits(&self) -> impl Iterator<Item = &RetryWait> {
        self.waits.iter().filter(|w| w.kind == FailureKind::Transient)
    }

    pub fn rate_limit_waits(&self) -> impl Iterator<Item = &RetryWait> {
        self.waits.iter().filter(|w| w.kind == FailureKind::RateLimited)
    }
}

enum AttemptFailure {
    Remote(GenerationError),
    Parse(ReplyParseError),
}

impl AttemptFailure {
    fn kind(&self) -> FailureKind {
        match self {
            Self::Remote(e) => classify(&e.to_string()),
            Self::Parse(_) => FailureKind::Transient,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Remote(e) => e.to_string(),
            Self::Parse(e) => e.to_string(),
        }
    }

    fn into_error(self, attempts: u32, budget: &RetryBudget) -> EnrichmentError {
        match (self.kind(), self) {
            (FailureKind::RateLimited, failure) => EnrichmentError::RateLimitExhausted {
                waits: budget.rate_limit_waits(),
                last_error: failure.message(),
            },
            (FailureKind::Transient, Self::Remote(source)) => {
                EnrichmentError::Remote { attempts, source }
            }
            (FailureKind::Transient, Self::Parse(source)) => {
                EnrichmentError::Parse { attempts, source }
            }
        }
    }
}

pub struct EnrichmentWorker {
    generator: Arc<dyn TextGenerator>,
    quota: Arc<QuotaGuard>,
    policy: RetryPolicy,
    system_instruction: String,
}

impl EnrichmentWorker {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        quota: Arc<QuotaGuard>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            quota,
            policy,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }

    #[must_use]
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn quota(&self) -> &Arc<QuotaGuard> {
        &self.quota
    }

    /// Enrich one batch with bounded retries
    pub async fn process(&self, batch: &Batch) -> BatchReport {
        let mut report = BatchReport {
            batch_number: batch.number,
            record_count: batch.len(),
            result: Ok(Some(Vec::new())),
            attempts: 0,
            waits: Vec::new(),
        };

        if batch.is_empty() {
            return report;
        }

        report.result = self
            .call_with_retries(batch, &mut report.attempts, &mut report.waits)
            .await;
        report
    }

    async fn call_with_retries(
        &self,
        batch: &Batch,
        attempts: &mut u32,
        waits: &mut Vec<RetryWait>,
    ) -> Result<Option<Vec<ProductRecord>>, EnrichmentError> {
        let payload = batch.payload_json()?;
        let estimated = estimate_tokens(&payload);
        let mut budget = RetryBudget::new(self.policy.clone());

        loop {
            *attempts += 1;
            self.quota.acquire(estimated).await;
            debug!(batch = batch.number, attempt = *attempts, estimated, "Calling text generator");

            let failure = match self.generator.generate(&self.system_instruction, &payload).await {
                Ok(generated) => {
                    if let Some(actual) = generated.total_tokens {
                        self.quota.reconcile(estimated, actual).await;
                    }
                    let Some(text) = generated.text.filter(|t| !t.trim().is_empty()) else {
                        warn!(batch = batch.number, "Empty reply, skipping batch");
                        return Ok(None);
                    };
                    match parse_reply(&text) {
                        Ok(Some(records)) => {
                            info!(
                                batch = batch.number,
                                records = records.len(),
                                attempt = *attempts,
                                "✅ Batch enriched"
                            );
                            return Ok(Some(records));
                        }
                        Ok(None) => {
                            warn!(
                                batch = batch.number,
                                "Reply contained no JSON array, skipping batch"
                            );
                            return Ok(None);
                        }
                        Err(e) => AttemptFailure::Parse(e),
                    }
                }
                Err(e) => AttemptFailure::Remote(e),
            };

            match budget.record_failure(failure.kind()) {
                RetryDecision::Retry { kind, delay } => {
                    let reason = failure.message();
                    match kind {
                        FailureKind::RateLimited => warn!(
                            batch = batch.number,
                            attempt = *attempts,
                            delay_secs = delay.as_secs(),
                            error = %reason,
                            "⏳ Rate limited, waiting before retry"
                        ),
                        FailureKind::Transient => warn!(
                            batch = batch.number,
                            attempt = *attempts,
                            delay_secs = delay.as_secs(),
                            error = %reason,
                            "🔄 Attempt failed, backing off"
                        ),
                    }
                    waits.push(RetryWait {
                        attempt: *attempts,
                        kind,
                        delay,
                        reason,
                    });
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp { kind } => {
                    error!(
                        batch = batch.number,
                        attempts = *attempts,
                        ?kind,
                        error = %failure.message(),
                        "❌ Giving up on batch"
                    );
                    return Err(failure.into_error(*attempts, &budget));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Dataset, chunk_unprocessed, columns};
    use crate::infrastructure::gemini_client::GeneratedText;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<GeneratedText, GenerationError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Result<GeneratedText, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _: &str, _: &str) -> Result<GeneratedText, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Transport("script exhausted".into())))
        }
    }

    fn text(reply: &str) -> Result<GeneratedText, GenerationError> {
        Ok(GeneratedText {
            text: Some(reply.to_string()),
            total_tokens: None,
        })
    }

    fn quota_error() -> Result<GeneratedText, GenerationError> {
        Err(GenerationError::Transport("Error 429: quota exceeded".into()))
    }

    fn server_error() -> Result<GeneratedText, GenerationError> {
        Err(GenerationError::Http {
            status: 500,
            message: "internal".into(),
        })
    }

    fn batch(rows: usize) -> Batch {
        let dataset = Dataset::with_rows(
            vec![columns::CODE.to_string(), columns::NAME.to_string()],
            (0..rows).map(|i| vec![format!("row_{i}"), format!("Produkt {i}")]).collect(),
        );
        chunk_unprocessed(&dataset, 50)
            .unwrap()
            .into_iter()
            .next()
            .unwrap_or(Batch {
                number: 1,
                row_indices: Vec::new(),
                records: Vec::new(),
            })
    }

    fn worker(generator: Arc<ScriptedGenerator>) -> EnrichmentWorker {
        EnrichmentWorker::new(generator, Arc::new(QuotaGuard::default()), RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success_waits_once() {
        let generator = ScriptedGenerator::new(vec![
            quota_error(),
            text(r#"[{"Kat. číslo":"row_0","Krátky popis":"X"}]"#),
        ]);
        let worker = worker(generator.clone());
        let start = Instant::now();

        let report = worker.process(&batch(2)).await;

        let records = report.result.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(generator.calls(), 2);
        assert_eq!(report.rate_limit_waits().count(), 1);
        assert_eq!(report.backoff_waits().count(), 0);
        assert_eq!(report.waits[0].delay, Duration::from_secs(60));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_failures_exhaust_attempts() {
        let generator =
            ScriptedGenerator::new(vec![server_error(), server_error(), server_error()]);
        let worker = worker(generator.clone());
        let start = Instant::now();

        let report = worker.process(&batch(1)).await;

        assert!(matches!(
            report.result,
            Err(EnrichmentError::Remote { attempts: 3, .. })
        ));
        assert_eq!(generator.calls(), 3);
        let delays: Vec<Duration> = report.backoff_waits().map(|w| w.delay).collect();
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_budget_is_separate() {
        let generator = ScriptedGenerator::new(vec![
            server_error(),
            quota_error(),
            quota_error(),
            server_error(),
            text("[]"),
        ]);
        let worker = worker(generator.clone());

        let report = worker.process(&batch(1)).await;

        assert!(report.result.as_ref().unwrap().as_ref().unwrap().is_empty());
        assert_eq!(report.attempts, 5);
        assert_eq!(report.rate_limit_waits().count(), 2);
        assert_eq!(report.backoff_waits().count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_propagates() {
        let generator = ScriptedGenerator::new((0..4).map(|_| quota_error()).collect());
        let worker = worker(generator.clone());

        let report = worker.process(&batch(1)).await;

        assert!(matches!(
            report.result,
            Err(EnrichmentError::RateLimitExhausted { waits: 3, .. })
        ));
        assert_eq!(generator.calls(), 4);
    }

    #[tokio::test]
    async fn test_prose_without_array_is_soft_failure() {
        let generator = ScriptedGenerator::new(vec![text("Sorry, I cannot do that.")]);
        let report = worker(generator.clone()).process(&batch(1)).await;

        assert!(report.result.unwrap().is_none());
        assert_eq!(generator.calls(), 1);
        assert!(report.waits.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_array_is_retried() {
        let generator = ScriptedGenerator::new(vec![
            text("Here: [{\"Kat. číslo\": }]"),
            text("Sure! ```json\n[{\"Kat. číslo\":\"row_0\"}]\n```"),
        ]);
        let report = worker(generator.clone()).process(&batch(1)).await;

        assert_eq!(report.result.as_ref().unwrap().as_ref().unwrap().len(), 1);
        assert_eq!(report.backoff_waits().count(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_endpoint() {
        let generator = ScriptedGenerator::new(Vec::new());
        let report = worker(generator.clone()).process(&batch(0)).await;

        assert!(report.result.unwrap().unwrap().is_empty());
        assert_eq!(generator.calls(), 0);
        assert_eq!(report.attempts, 0);
    }

    #[tokio::test]
    async fn test_reported_usage_reconciles_quota() {
        let generator = ScriptedGenerator::new(vec![Ok(GeneratedText {
            text: Some("[]".into()),
            total_tokens: Some(10),
        })]);
        let worker = worker(generator);

        worker.process(&batch(3)).await.result.unwrap();

        let snapshot = worker.quota().snapshot().await;
        assert_eq!((snapshot.calls, snapshot.tokens), (1, 10));
    }
}
