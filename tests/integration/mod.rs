//! End-to-end workflows over real stores in temporary directories.
//!
//! - Pipeline: logs → diagnosis → guarded fix → backup → audit
//! - Rollback: apply → apply → restore in reverse order
//! - Queue: enqueue → worker → engine, file and `SQLite` backends

mod pipeline;
mod queue;
mod rollback;
mod support;
