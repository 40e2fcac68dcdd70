//! Block-at-a-time probing loop.
//!
//! One block: pick the next source, take a batch from its working cursor,
//! classify every candidate in order, aggregate, upload, and only then commit
//! the source's cursor. A failed upload rewinds the working cursor to the last
//! committed one, so the same candidates are retried. An interrupt observed
//! mid-block abandons the block without uploading or committing.

use crate::{
    aggregate::{BlockAggregate, BlockAggregator},
    checkpoint::{CheckpointError, CheckpointStore},
    classifier::Classifier,
    generator::{CandidateSource, Cursor},
    resolver::DnsTransport,
    scheduler::BlockScheduler,
    site::SiteProbe,
    types::{Candidate, Classification, Mode},
    upload::{UploadClient, UploadError, UploadOutcome},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Retire the mode; the run ends once no mode is left.
    #[default]
    Stop,
    /// Start the mode over from its initial cursor.
    Wrap,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub batch_size: usize,
    pub block_pause: Duration,
    pub request_delay: Duration,
    pub resolver_retry_pause: Duration,
    pub on_exhausted: ExhaustionPolicy,
    pub max_consecutive_failures: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            batch_size: 25,
            block_pause: Duration::from_secs(60),
            request_delay: Duration::ZERO,
            resolver_retry_pause: Duration::from_secs(1),
            on_exhausted: ExhaustionPolicy::Stop,
            max_consecutive_failures: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Stats store rejected credentials: {0}")]
    Unauthorized(#[source] UploadError),
    #[error("Giving up after {attempts} consecutive failed uploads: {last}")]
    UploadFailures {
        attempts: u32,
        #[source]
        last: UploadError,
    },
    #[error("Giving up after {0} consecutive blocks in which no candidate resolved")]
    ResolversDown(u32),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

#[derive(Debug, Clone)]
pub struct BlockReport {
    pub mode: Mode,
    pub start: Cursor,
    pub end: Cursor,
    pub first_domain: Option<String>,
    pub last_domain: Option<String>,
    pub aggregate: BlockAggregate,
}

#[derive(Debug)]
pub enum BlockOutcome {
    Committed(BlockReport),
    DryRun {
        report: BlockReport,
        payload: serde_json::Value,
    },
    UploadFailed {
        report: BlockReport,
        error: UploadError,
    },
    /// Every candidate was skipped; nothing uploaded, cursor rewound.
    NothingResolved(BlockReport),
    Interrupted(Mode),
    ModeExhausted(Mode),
    AllExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    BlockLimit { blocks: u64 },
    Exhausted { blocks: u64 },
    Interrupted { blocks: u64 },
}

pub type CandidateObserver = Box<dyn Fn(&Candidate, &Classification) + Send + Sync>;

/// Positions `source` at its persisted cursor, or at the start when there is
/// none or it does not fit the current configuration.
pub fn resume(source: &mut dyn CandidateSource, store: &CheckpointStore) {
    let mode = source.mode();
    match store.load(mode) {
        Some(cursor) => match source.seek(cursor) {
            Ok(()) => info!(%mode, ?cursor, "Resuming from checkpoint"),
            Err(e) => {
                warn!(%mode, error = %e, "Checkpoint does not fit the current configuration; starting over");
                source.restart();
            }
        },
        None => {
            source.restart();
            info!(%mode, "No checkpoint, starting from the beginning");
        }
    }
}

pub struct Agent<T, P> {
    classifier: Classifier<T, P>,
    uploader: UploadClient,
    checkpoints: CheckpointStore,
    scheduler: BlockScheduler,
    settings: AgentSettings,
    committed: HashMap<Mode, Cursor>,
    observer: Option<CandidateObserver>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<T: DnsTransport, P: SiteProbe> Agent<T, P> {
    pub fn new(
        classifier: Classifier<T, P>,
        uploader: UploadClient,
        checkpoints: CheckpointStore,
        sources: Vec<Box<dyn CandidateSource>>,
        settings: AgentSettings,
    ) -> Self {
        let mut scheduler = BlockScheduler::new(sources);
        let mut committed = HashMap::new();
        for source in scheduler.sources_mut() {
            resume(source.as_mut(), &checkpoints);
            committed.insert(source.mode(), source.cursor());
        }

        Self {
            classifier,
            uploader,
            checkpoints,
            scheduler,
            settings,
            committed,
            observer: None,
            shutdown: None,
        }
    }

    /// Called once per classified candidate, in order.
    pub fn with_observer(mut self, observer: CandidateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The loop stops at the next check once the channel reads `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn committed(&self, mode: Mode) -> Option<Cursor> {
        self.committed.get(&mode).copied()
    }

    pub fn classifier(&self) -> &Classifier<T, P> {
        &self.classifier
    }

    fn stop_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn rewind(&mut self, index: usize, mode: Mode) {
        let Some(cursor) = self.committed.get(&mode).copied() else {
            return;
        };
        if let Err(e) = self.scheduler.source_mut(index).seek(cursor) {
            error!(%mode, error = %e, "Failed to rewind to committed cursor");
        }
    }

    async fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        match self.shutdown.clone() {
            Some(mut shutdown) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    Ok(_) = shutdown.wait_for(|stop| *stop) => {}
                }
            }
            None => tokio::time::sleep(duration).await,
        }
    }

    async fn classify_with_retry(&mut self, candidate: &Candidate) -> Option<Classification> {
        match self.classifier.classify(candidate).await {
            Ok(result) => return Some(result),
            Err(e) => {
                warn!(domain = %candidate.domain(), error = %e, "Resolvers exhausted, retrying candidate once");
            }
        }

        self.pause(self.settings.resolver_retry_pause).await;
        if self.stop_requested() {
            return None;
        }
        match self.classifier.classify(candidate).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(domain = %candidate.domain(), error = %e, "Resolvers exhausted again, skipping candidate");
                None
            }
        }
    }

    pub async fn run_block(&mut self) -> Result<BlockOutcome, AgentError> {
        let Some(index) = self.scheduler.next_index() else {
            return Ok(BlockOutcome::AllExhausted);
        };
        let batch_size = self.settings.batch_size.max(1);
        let source = self.scheduler.source_mut(index);
        let mode = source.mode();
        let charset_size = source.charset_size();
        let mut start = source.cursor();
        let mut batch = source.next_batch(batch_size);

        if batch.candidates.is_empty() {
            match self.settings.on_exhausted {
                ExhaustionPolicy::Stop => {
                    info!(%mode, "Enumeration complete, retiring mode");
                    self.scheduler.retire(index);
                    return Ok(BlockOutcome::ModeExhausted(mode));
                }
                ExhaustionPolicy::Wrap => {
                    warn!(%mode, "Enumeration complete, wrapping to the start");
                    source.restart();
                    start = source.cursor();
                    batch = source.next_batch(batch_size);
                }
            }
        }
        let end = source.cursor();

        let mut aggregator = BlockAggregator::new(mode, charset_size);
        for candidate in &batch.candidates {
            if self.stop_requested() {
                info!(%mode, "Interrupted mid-block, discarding partial block");
                self.rewind(index, mode);
                return Ok(BlockOutcome::Interrupted(mode));
            }

            match self.classify_with_retry(candidate).await {
                Some(result) => {
                    if let Some(observer) = &self.observer {
                        observer(candidate, &result);
                    }
                    aggregator.record(candidate, &result);
                }
                None if self.stop_requested() => {
                    info!(%mode, "Interrupted during resolver retry, discarding partial block");
                    self.rewind(index, mode);
                    return Ok(BlockOutcome::Interrupted(mode));
                }
                None => aggregator.record_skipped(candidate),
            }

            if !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }
        }

        let report = BlockReport {
            mode,
            start,
            end,
            first_domain: batch.candidates.first().map(Candidate::domain),
            last_domain: batch.candidates.last().map(Candidate::domain),
            aggregate: aggregator.finalize(),
        };

        if report.aggregate.global.domains_tracked_lifetime_delta == 0 && report.aggregate.skipped > 0 {
            warn!(%mode, skipped = report.aggregate.skipped, "No candidate in the block resolved, keeping cursor");
            self.rewind(index, mode);
            return Ok(BlockOutcome::NothingResolved(report));
        }

        let sent = self.uploader.send(&report.aggregate.payload()).await;
        match sent {
            Ok(UploadOutcome::Sent) => {
                self.checkpoints.save(mode, &end)?;
                self.committed.insert(mode, end);
                log_summary(&report);
                Ok(BlockOutcome::Committed(report))
            }
            Ok(UploadOutcome::DryRun(payload)) => {
                info!(%mode, ?end, "Dry run block done, checkpoint left untouched");
                Ok(BlockOutcome::DryRun { report, payload })
            }
            Err(e) if e.is_auth_failure() => {
                self.rewind(index, mode);
                Err(AgentError::Unauthorized(e))
            }
            Err(error) => {
                warn!(%mode, error = %error, "Upload failed, block will be retried");
                self.rewind(index, mode);
                Ok(BlockOutcome::UploadFailed { report, error })
            }
        }
    }

    /// Runs blocks until `max_blocks` succeeded, every mode is exhausted, or
    /// shutdown is requested.
    pub async fn run(&mut self, max_blocks: Option<u64>) -> Result<RunOutcome, AgentError> {
        let max_failures = self.settings.max_consecutive_failures.max(1);
        let mut blocks = 0u64;
        let mut failures = 0u32;

        loop {
            if self.stop_requested() {
                return Ok(RunOutcome::Interrupted { blocks });
            }
            if max_blocks.is_some_and(|max| blocks >= max) {
                return Ok(RunOutcome::BlockLimit { blocks });
            }

            match self.run_block().await? {
                BlockOutcome::Committed(_) | BlockOutcome::DryRun { .. } => {
                    blocks += 1;
                    failures = 0;
                }
                BlockOutcome::UploadFailed { error, .. } => {
                    failures += 1;
                    if failures >= max_failures {
                        return Err(AgentError::UploadFailures {
                            attempts: failures,
                            last: error,
                        });
                    }
                }
                BlockOutcome::NothingResolved(_) => {
                    failures += 1;
                    if failures >= max_failures {
                        return Err(AgentError::ResolversDown(failures));
                    }
                }
                BlockOutcome::Interrupted(_) => return Ok(RunOutcome::Interrupted { blocks }),
                BlockOutcome::ModeExhausted(_) => continue,
                BlockOutcome::AllExhausted => return Ok(RunOutcome::Exhausted { blocks }),
            }

            if max_blocks.is_some_and(|max| blocks >= max) {
                return Ok(RunOutcome::BlockLimit { blocks });
            }
            self.pause(self.settings.block_pause).await;
        }
    }
}

fn log_summary(report: &BlockReport) {
    let aggregate = &report.aggregate;
    info!(
        mode = %report.mode,
        probed = aggregate.global.domains_tracked_lifetime_delta,
        skipped = aggregate.skipped,
        first = report.first_domain.as_deref().unwrap_or("-"),
        last = report.last_domain.as_deref().unwrap_or("-"),
        "Block committed"
    );
    for (tld, stats) in &aggregate.tld_stats {
        info!(
            %tld,
            checked = stats.checked,
            unregistered = stats.unregistered,
            unused = stats.unused,
            active = stats.active,
            "Block TLD summary"
        );
    }
}
