//! # Two-Phase Commit Coordinator
//!
//! Drives a cross-shard transaction from a participant list to a durable global decision:
//! persist participants → prepare fan-out → persist decision → commit/abort fan-out →
//! garbage-collect. Every transition is durable before the next begins, so a crash at any
//! point resumes correctly via [`TransactionCoordinator::recover`], which re-derives the
//! in-progress state from whichever fields are already durable rather than replaying an
//! in-memory callback graph.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod gc;
pub mod repository;
pub mod transport;
pub mod types;

pub use config::CoordinatorConfig;
pub use coordinator::TransactionCoordinator;
pub use error::{CoordinatorError, TransportError};
pub use gc::run_gc_sweeper;
pub use repository::CoordinatorRepository;
pub use transport::{PrepareVote, ShardTransport};
pub use types::{Decision, LogicalSessionId, TransactionDocument, TxnId};
