use std::fmt;

use meter_domain::{DomainError, MeteringPoint, ReadingBatch, TimeWindow};

use crate::auth::BearerToken;
use crate::transform::{Normalizer, RawPayload};

pub mod window;

pub use window::{civil_today, RunMode, WindowAnchor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Source,
    Sink,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Sink => f.write_str("sink"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("{kind} token acquisition failed: {reason}")]
    TokenAcquisition { kind: TokenKind, reason: String },
    #[error("fetch failed with status {status}: {body}")]
    Fetch { status: u16, body: String },
    #[error("delivery failed with status {status}: {body}")]
    Delivery { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("invalid window: {0}")]
    Window(#[from] DomainError),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Issues the two run-scoped bearer tokens. Each method is called at most once per run.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn source_token(&self) -> Result<BearerToken, PipelineError>;
    async fn sink_token(&self) -> Result<BearerToken, PipelineError>;
}

#[async_trait::async_trait]
pub trait Source: Send + Sync {
    async fn fetch(
        &self,
        token: &BearerToken,
        point: &MeteringPoint,
        window: &TimeWindow,
    ) -> Result<RawPayload, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, token: &BearerToken, batch: ReadingBatch) -> Result<(), PipelineError>;
}

/// Terminal state of one metering point within a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Delivered(usize),
    SkippedEmpty,
    FetchFailed(String),
    SchemaUnrecognized,
    DeliveryFailed(String),
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FetchFailed(_) | Self::DeliveryFailed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityOutcome {
    pub point: MeteringPoint,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub delivered: usize,
    pub readings: usize,
    pub skipped_empty: usize,
    pub schema_unrecognized: usize,
    pub fetch_failed: usize,
    pub delivery_failed: usize,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub window: TimeWindow,
    pub outcomes: Vec<EntityOutcome>,
}

impl RunReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().map(|e| &e.outcome)
    }

    pub fn summary(&self) -> RunSummary {
        let mut s = RunSummary::default();
        for outcome in self.outcomes() {
            match outcome {
                RunOutcome::Delivered(n) => {
                    s.delivered += 1;
                    s.readings += n;
                }
                RunOutcome::SkippedEmpty => s.skipped_empty += 1,
                RunOutcome::SchemaUnrecognized => s.schema_unrecognized += 1,
                RunOutcome::FetchFailed(_) => s.fetch_failed += 1,
                RunOutcome::DeliveryFailed(_) => s.delivery_failed += 1,
            }
        }
        s
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes().any(RunOutcome::is_failure)
    }
}

/// One synchronization run over a fixed registry.
///
/// Tokens are acquired once, then every metering point goes through
/// fetch, normalize and deliver in registry order. A token failure aborts the
/// run before any fetch; every later failure is recorded against its point.
pub struct SyncPipeline<P, S, K> {
    pub tokens: P,
    pub source: S,
    pub sink: K,
    pub normalizer: Normalizer,
    pub registry: Vec<MeteringPoint>,
    /// Report payloads matching no known shape as `SchemaUnrecognized`
    /// instead of folding them into `SkippedEmpty`.
    pub report_unrecognized_schema: bool,
}

impl<P, S, K> SyncPipeline<P, S, K>
where
    P: TokenProvider,
    S: Source,
    K: Sink,
{
    pub async fn run(&self, window: TimeWindow) -> Result<RunReport, PipelineError> {
        let source_token = self.tokens.source_token().await?;
        let sink_token = self.tokens.sink_token().await?;
        tracing::info!(
            points = self.registry.len(),
            from = %window.start(),
            to = %window.end(),
            "tokens acquired, starting sync"
        );

        let mut outcomes = Vec::with_capacity(self.registry.len());
        for point in &self.registry {
            let outcome = self
                .sync_point(&source_token, &sink_token, point, &window)
                .await;
            outcomes.push(EntityOutcome {
                point: point.clone(),
                outcome,
            });
        }

        let report = RunReport { window, outcomes };
        let s = report.summary();
        tracing::info!(
            delivered = s.delivered,
            readings = s.readings,
            skipped_empty = s.skipped_empty,
            schema_unrecognized = s.schema_unrecognized,
            fetch_failed = s.fetch_failed,
            delivery_failed = s.delivery_failed,
            "sync run complete"
        );
        Ok(report)
    }

    async fn sync_point(
        &self,
        source_token: &BearerToken,
        sink_token: &BearerToken,
        point: &MeteringPoint,
        window: &TimeWindow,
    ) -> RunOutcome {
        tracing::info!(ean = %point.ean, variable_id = point.variable_id, "processing metering point");

        let payload = match self.source.fetch(source_token, point, window).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(ean = %point.ean, error = %e, "fetch failed");
                return RunOutcome::FetchFailed(e.to_string());
            }
        };

        let normalized = self.normalizer.normalize_detailed(&payload, point.variable_id);
        if normalized.batch.is_empty() {
            return match normalized.shape {
                None => {
                    tracing::warn!(ean = %point.ean, "payload matches no known reading shape");
                    if self.report_unrecognized_schema {
                        RunOutcome::SchemaUnrecognized
                    } else {
                        RunOutcome::SkippedEmpty
                    }
                }
                Some(shape) => {
                    tracing::info!(ean = %point.ean, ?shape, "no readings in window");
                    RunOutcome::SkippedEmpty
                }
            };
        }

        let count = normalized.batch.len();
        if let Some((first, last)) = normalized.batch.span() {
            tracing::info!(ean = %point.ean, count, first, last, "delivering readings");
        }

        match self.sink.deliver(sink_token, normalized.batch).await {
            Ok(()) => RunOutcome::Delivered(count),
            Err(e) => {
                tracing::warn!(ean = %point.ean, error = %e, "delivery failed");
                RunOutcome::DeliveryFailed(e.to_string())
            }
        }
    }
}
