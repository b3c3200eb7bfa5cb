//! Stage context and listener traits
//!
//! Listeners let callers observe execution (progress bars, logs) without
//! the engine depending on a particular UI.

use crate::types::{RetryInformation, StageStatus};

/// Context passed to stage actions
///
/// Each stage execution gets its own context, so the retry information it
/// carries is only ever touched by the worker running that stage.
#[derive(Debug, Clone, Default)]
pub struct StageContext {
    /// Id of the flow being executed
    pub flow_id: String,
    /// Id of the stage this context belongs to
    pub stage_id: String,
    /// Retry diagnostics, filled in by the retry policy
    pub retry: RetryInformation,
}

impl StageContext {
    /// Create a new stage context
    pub fn new(flow_id: impl Into<String>, stage_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            stage_id: stage_id.into(),
            retry: RetryInformation::default(),
        }
    }
}

/// Observer for execution progress
///
/// Called from worker threads, hence `Sync`.
pub trait FlowListener: Send + Sync {
    /// Called once before execution with the number of stages in the flow
    fn on_flow_start(&self, _flow_id: &str, _stages: usize) {}

    /// Called when a stage's forward action starts
    fn on_stage_start(&self, stage_id: &str, description: &str);

    /// Called when a stage reaches a new terminal status
    fn on_stage_complete(&self, stage_id: &str, status: StageStatus, error: Option<&str>);

    /// Called once after execution
    fn on_flow_complete(&self, _flow_id: &str, _status: StageStatus) {}
}

/// No-op listener
pub struct NoListener;

impl FlowListener for NoListener {
    fn on_stage_start(&self, _stage_id: &str, _description: &str) {}
    fn on_stage_complete(&self, _stage_id: &str, _status: StageStatus, _error: Option<&str>) {}
}

/// Listener that writes stage transitions to the log
pub struct LogListener;

impl FlowListener for LogListener {
    fn on_flow_start(&self, flow_id: &str, stages: usize) {
        log::info!("Flow {flow_id} started with {stages} stages");
    }

    fn on_stage_start(&self, stage_id: &str, description: &str) {
        log::info!("Stage {stage_id} started: {description}");
    }

    fn on_stage_complete(&self, stage_id: &str, status: StageStatus, error: Option<&str>) {
        match error {
            Some(error) => log::warn!("Stage {stage_id} {status}: {error}"),
            None => log::info!("Stage {stage_id} {status}"),
        }
    }

    fn on_flow_complete(&self, flow_id: &str, status: StageStatus) {
        log::info!("Flow {flow_id} finished: {status}");
    }
}
