//! # Pipeline Module
//!
//! Drives one ingest run from source tree to organized destination.
//!
//! ## Stages
//! 1. **Resolve** - validate the source, create the destination, load or
//!    write `zensort-config.json`, open the index
//! 2. **Scan** - walk the source once, feeding a bounded work queue
//! 3. **Process** - scoped worker threads hash, deduplicate, classify,
//!    route, copy and export each file
//! 4. **Report** - final progress snapshot, index totals, JSON and text
//!    reports under `zensort-logs/`
//!
//! ## Parallelism
//! Workers share one [`WorkerContext`]. Lookup and insert for a digest
//! happen under a per-digest lock, so identical content is copied once no
//! matter how many workers see it.

mod executor;
mod worker;

pub use executor::{
    default_worker_count, CancellationToken, Organizer, OrganizerBuilder, RunResult, MAX_WORKERS,
};
pub use worker::{DigestGuard, DigestLocks, FileWorker, Outcome, WorkerContext};
