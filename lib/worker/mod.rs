//! Async claim-loop plumbing over the synchronous witness queue.
//!
//! Workers pull work by repeatedly claiming batches; the blocking claim
//! transaction runs inside `tokio::task::spawn_blocking` so runtime
//! threads stay free. Cancellation is honored between claims — once a
//! claim transaction begins it runs to completion, so no claimed batch is
//! ever abandoned mid-handoff.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::db;
use crate::db::error::StoreError;
use crate::witness_queue::{BatchWitness, WitnessQueue, WitnessStatus};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("worker task joined with an error: {0}")]
    Join(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub struct ShutdownError {
    errors: Vec<WorkerError>,
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Errors during shutdown: {:?}", self.errors)
    }
}

/// One stage transition a worker loop drives, plus its pacing.
#[derive(Debug, Clone, Copy)]
pub struct ClaimLoopConfig {
    pub before_status: WitnessStatus,
    pub after_status: WitnessStatus,
    pub batch_size: i64,
    /// Sleep between polls while the stage is empty.
    pub idle_backoff: Duration,
}

impl Default for ClaimLoopConfig {
    fn default() -> Self {
        Self {
            before_status: WitnessStatus::Published,
            after_status: WitnessStatus::Received,
            batch_size: 8,
            idle_backoff: Duration::from_secs(2),
        }
    }
}

/// Blocking claim capability.
///
/// This trait exists so the loop logic can be unit-tested against
/// deterministic scripted batches without a database.
pub trait ClaimSource: Send + Sync {
    fn claim(
        &self,
        before_status: WitnessStatus,
        after_status: WitnessStatus,
        max_count: i64,
    ) -> Result<Vec<BatchWitness>, StoreError>;
}

/// Production claim source: a fresh Postgres connection per claim, with
/// the configured statement ceiling applied.
pub struct PgClaimSource {
    db_url: String,
    statement_timeout_ms: u64,
    queue: WitnessQueue,
}

impl PgClaimSource {
    pub fn new(db_url: String, statement_timeout_ms: u64, queue: WitnessQueue) -> Self {
        Self {
            db_url,
            statement_timeout_ms,
            queue,
        }
    }
}

impl ClaimSource for PgClaimSource {
    fn claim(
        &self,
        before_status: WitnessStatus,
        after_status: WitnessStatus,
        max_count: i64,
    ) -> Result<Vec<BatchWitness>, StoreError> {
        let mut conn = db::connect(&self.db_url, self.statement_timeout_ms)?;
        self.queue
            .claim_batch(&mut conn, before_status, after_status, max_count)
    }
}

/// Consumes claimed batches. Handler failures do not stop the loop: the
/// claimed records have already advanced a stage, and retry policy
/// belongs to the caller.
pub trait BatchHandler: Send + Sync {
    fn handle_batch<'a>(
        &'a self,
        batch: Vec<BatchWitness>,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Runs one worker loop until cancellation or a storage failure.
///
/// `NotFound` from a claim is the steady-state "stage is empty" signal:
/// the loop idles for `idle_backoff` and polls again, logging only at
/// debug level.
pub async fn run_claim_loop(
    source: Arc<dyn ClaimSource>,
    handler: Arc<dyn BatchHandler>,
    config: ClaimLoopConfig,
    cancel_token: CancellationToken,
) -> Result<(), WorkerError> {
    while !cancel_token.is_cancelled() {
        let claim_source = source.clone();
        let ClaimLoopConfig {
            before_status,
            after_status,
            batch_size,
            idle_backoff,
        } = config;

        let claimed = tokio::task::spawn_blocking(move || {
            claim_source.claim(before_status, after_status, batch_size)
        })
        .await
        .map_err(|err| WorkerError::Join(err.to_string()))?;

        match claimed {
            Ok(batch) => {
                info!(
                    claimed = batch.len(),
                    from = %before_status,
                    to = %after_status,
                    "worker claimed witness batch"
                );
                if let Err(err) = handler.handle_batch(batch).await {
                    error!(error = %err, "batch handler failed");
                }
            }
            Err(StoreError::NotFound) => {
                debug!(from = %before_status, "no witness work available");
                tokio::select! {
                    _ = tokio::time::sleep(idle_backoff) => {}
                    _ = cancel_token.cancelled() => break,
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

/// A fixed-size set of claim loops sharing one source and handler.
///
/// Row locking makes concurrent loops claim disjoint batches, so adding
/// workers never duplicates work.
pub struct WorkerPool {
    workers: Vec<JoinHandle<Result<(), WorkerError>>>,
}

impl WorkerPool {
    pub fn new(
        num_workers: usize,
        source: Arc<dyn ClaimSource>,
        handler: Arc<dyn BatchHandler>,
        config: ClaimLoopConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        let workers = (0..num_workers)
            .map(|_| {
                let worker_source = source.clone();
                let worker_handler = handler.clone();
                let worker_token = cancel_token.clone();
                tokio::spawn(async move {
                    run_claim_loop(worker_source, worker_handler, config, worker_token).await
                })
            })
            .collect();
        Self { workers }
    }

    pub async fn wait_for_completion(self) -> Result<(), ShutdownError> {
        let mut errors = vec![];
        for handle in self.workers {
            match handle.await {
                Ok(Ok(())) => (),
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(WorkerError::Join(e.to_string())),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { errors })
        }
    }
}
