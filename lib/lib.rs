//! Storage layer for a zero-knowledge batch-proving pipeline.
//!
//! The witness queue is the heart of the crate: a relational table acting
//! as a work queue, with an atomic claim protocol that moves batch
//! witnesses through `published -> received -> finished` while handing
//! each record to exactly one worker. The proof and user-proof stores are
//! plain CRUD peers that hold what the pipeline produces.

pub mod config;
pub mod db;
pub mod logging;
pub mod proof_store;
pub mod userproof_store;
pub mod witness_queue;
pub mod worker;
