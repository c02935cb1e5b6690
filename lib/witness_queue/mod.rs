//! Durable batch-witness queue with a transactional claim protocol.
//!
//! The table is the queue: producers insert witness records at the
//! initial stage, and any number of worker processes pull work by
//! claiming — an atomic select-lock-transition that hands each record to
//! exactly one successful caller. All coordination lives in the backing
//! store's transactions and row locks; this module holds no in-process
//! shared state.
//!
//! Why this module is synchronous:
//! - Queue operations are small metadata statements; a claim spends its
//!   time waiting on row locks, not streaming data.
//! - A sync store keeps SQLite-backed unit tests fast and simple.
//!
//! Async callers should run these operations in
//! `tokio::task::spawn_blocking` (the `worker` module provides that
//! bridge) so Tokio runtime worker threads are not blocked.

mod ops;
mod types;

pub use ops::{WitnessQueue, WITNESS_TABLE_PREFIX};
pub use types::{BatchWitness, NewBatchWitness, StageCounts, WitnessStatus};
