//! # Stageflow
//!
//! A small engine for executing trees of side-effecting stages.
//!
//! ## Core Concepts
//!
//! - **Stage**: one action against one system, optionally with a
//!   compensating action
//! - **FlowNode**: a tree of stages composed sequentially or in parallel
//! - **Executor**: runs a tree on a bounded worker pool, stops or continues
//!   on failure according to the [`ExecutionStrategy`], and compensates
//!   succeeded stages when a cancel-on-error run fails
//! - **FlowReport**: per-stage and per-node status after execution
//! - **Retry**: exponential backoff for errors classified as retryable
//!
//! ## Example
//!
//! ```ignore
//! use stageflow::{ExecuteOptions, FlowNode, LogListener, execute};
//! use std::sync::Arc;
//!
//! let tree = FlowNode::sequential("app", vec![
//!     FlowNode::combine("routes", vec![Some(FlowNode::stage(routes)), auth]),
//!     FlowNode::stage(install),
//! ]);
//!
//! let report = execute("req-1", &tree, &ExecuteOptions::default(), Arc::new(LogListener))?;
//! println!("{}", report.status);
//! ```
//!
//! ## Provider Traits
//!
//! - [`FlowListener`]: receives progress updates from worker threads
//! - [`Retryable`]: classifies errors for [`with_retry`]

pub mod context;
pub mod executor;
pub mod flow;
pub mod report;
pub mod retry;
pub mod stage;
pub mod types;

// Re-export main types at crate root
pub use context::{FlowListener, LogListener, NoListener, StageContext};
pub use executor::execute;
pub use flow::FlowNode;
pub use report::{FlowRecord, FlowReport, StageRecord};
pub use retry::{RetryConfig, Retryable, with_retry};
pub use stage::{SharedStage, Stage};
pub use types::{
    ExecuteOptions, ExecuteSummary, ExecutionStrategy, RetryInformation, StageStatus,
    aggregate_status, default_jobs,
};
