//! Execution reports - per-stage records and aggregated flow status

use crate::flow::FlowNode;
use crate::types::{
    ExecuteSummary, ExecutionStrategy, RetryInformation, StageStatus, aggregate_status,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Persisted state of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Unique identifier of the stage
    pub stage_id: String,
    /// Category of the stage
    pub stage_type: String,
    /// Human-readable description
    pub description: String,
    pub status: StageStatus,
    /// Error text of the forward or compensating action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry: RetryInformation,
    /// Retries of the compensating action, when one ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_retry: Option<RetryInformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    fn queued(stage_id: String, stage_type: &str, description: String) -> Self {
        Self {
            stage_id,
            stage_type: stage_type.to_string(),
            description,
            status: StageStatus::Queued,
            error: None,
            retry: RetryInformation::default(),
            compensation_retry: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Aggregated status of an interior node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub flow_id: String,
    pub status: StageStatus,
}

/// Outcome of executing a flow tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowReport {
    pub flow_id: String,
    /// Worst status over all stages
    pub status: StageStatus,
    pub strategy: ExecutionStrategy,
    #[serde(default)]
    pub timed_out: bool,
    /// Interior nodes in depth-first order
    #[serde(default)]
    pub flows: Vec<FlowRecord>,
    /// Stages in depth-first order
    #[serde(default)]
    pub stages: Vec<StageRecord>,
}

impl FlowReport {
    /// Count stages by status
    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for stage in &self.stages {
            summary.add_status(stage.status);
        }
        summary
    }

    /// Look up a stage record
    pub fn stage(&self, stage_id: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage_id == stage_id)
    }

    /// Look up an interior node record
    pub fn flow(&self, flow_id: &str) -> Option<&FlowRecord> {
        self.flows.iter().find(|f| f.flow_id == flow_id)
    }

    /// Stages whose forward or compensating action failed
    pub fn failed_stages(&self) -> Vec<&StageRecord> {
        self.stages.iter().filter(|s| s.status.is_failure()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }

    /// Build a report from the tree shape and the recorded stage states
    pub(crate) fn build(
        flow_id: &str,
        tree: &FlowNode,
        strategy: ExecutionStrategy,
        timed_out: bool,
        mut records: HashMap<String, StageRecord>,
    ) -> Self {
        let mut report = Self {
            flow_id: flow_id.to_string(),
            status: StageStatus::Succeeded,
            strategy,
            timed_out,
            flows: Vec::new(),
            stages: Vec::new(),
        };
        report.status = report.collect(tree, &mut records);
        report
    }

    fn collect(
        &mut self,
        node: &FlowNode,
        records: &mut HashMap<String, StageRecord>,
    ) -> StageStatus {
        match node {
            FlowNode::Noop { .. } => StageStatus::Succeeded,
            FlowNode::Stage(stage) => {
                let id = stage.id();
                let record = records.remove(&id).unwrap_or_else(|| {
                    StageRecord::queued(id, stage.stage_type(), stage.description())
                });
                let status = record.status;
                self.stages.push(record);
                status
            }
            FlowNode::Sequential { id, children } | FlowNode::Parallel { id, children } => {
                let index = self.flows.len();
                self.flows.push(FlowRecord {
                    flow_id: id.clone(),
                    status: StageStatus::Queued,
                });
                let statuses: Vec<StageStatus> =
                    children.iter().map(|child| self.collect(child, records)).collect();
                let status = aggregate_status(statuses);
                self.flows[index].status = status;
                status
            }
        }
    }
}

/// Thread-safe store of stage records during a run
#[derive(Debug, Clone, Default)]
pub(crate) struct StatusTracker {
    records: Arc<Mutex<HashMap<String, StageRecord>>>,
}

impl StatusTracker {
    /// Seed every stage of the tree as queued
    pub(crate) fn for_tree(tree: &FlowNode) -> Self {
        let records = tree
            .stages()
            .into_iter()
            .map(|stage| {
                let id = stage.id();
                (id.clone(), StageRecord::queued(id, stage.stage_type(), stage.description()))
            })
            .collect();
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StageRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn status(&self, stage_id: &str) -> Option<StageStatus> {
        self.lock().get(stage_id).map(|r| r.status)
    }

    /// Mark a stage in progress unless the run was aborted
    ///
    /// The abort flag is read under the record lock, so a stage either
    /// starts before the timeout sweep sees it or does not start at all.
    pub(crate) fn start_unless(&self, stage_id: &str, aborted: &AtomicBool) -> bool {
        let mut records = self.lock();
        if aborted.load(Ordering::SeqCst) {
            return false;
        }
        if let Some(record) = records.get_mut(stage_id) {
            record.status = StageStatus::InProgress;
            record.started_at = Some(Utc::now());
        }
        true
    }

    /// Record a terminal status; returns false when the stage had already
    /// been finalized (e.g. by the timeout sweep)
    pub(crate) fn finish(
        &self,
        stage_id: &str,
        status: StageStatus,
        error: Option<String>,
        retry: Option<RetryInformation>,
    ) -> bool {
        let mut records = self.lock();
        let Some(record) = records.get_mut(stage_id) else {
            return false;
        };
        let compensating = matches!(
            status,
            StageStatus::Cancelled | StageStatus::CancellationFailed
        );
        let expected = if compensating {
            StageStatus::Succeeded
        } else {
            StageStatus::InProgress
        };
        if record.status != expected {
            return false;
        }
        record.status = status;
        if error.is_some() {
            record.error = error;
        }
        match retry {
            Some(retry) if compensating => record.compensation_retry = Some(retry),
            Some(retry) => record.retry = retry,
            None => {}
        }
        record.finished_at = Some(Utc::now());
        true
    }

    /// Mark every in-progress stage as failed with the given reason
    pub(crate) fn fail_in_progress(&self, reason: &str) -> Vec<String> {
        let mut failed = Vec::new();
        for record in self.lock().values_mut() {
            if record.status == StageStatus::InProgress {
                record.status = StageStatus::Failed;
                record.error = Some(reason.to_string());
                record.finished_at = Some(Utc::now());
                failed.push(record.stage_id.clone());
            }
        }
        failed.sort();
        failed
    }

    pub(crate) fn any_in_progress(&self) -> bool {
        self.lock().values().any(|r| r.status == StageStatus::InProgress)
    }

    pub(crate) fn snapshot(&self) -> HashMap<String, StageRecord> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::tests::Named;

    fn tree() -> FlowNode {
        FlowNode::sequential(
            "app",
            vec![
                FlowNode::parallel(
                    "level-0",
                    vec![FlowNode::stage(Named("a")), FlowNode::stage(Named("b"))],
                ),
                FlowNode::stage(Named("c")),
            ],
        )
    }

    #[test]
    fn test_report_aggregates_interior_nodes() {
        let tree = tree();
        let tracker = StatusTracker::for_tree(&tree);
        tracker.start_unless("a", &AtomicBool::new(false));
        tracker.finish("a", StageStatus::Succeeded, None, None);
        tracker.start_unless("b", &AtomicBool::new(false));
        tracker.finish("b", StageStatus::Failed, Some("HTTP 409".into()), None);

        let strategy = ExecutionStrategy::CancelOnError;
        let report = FlowReport::build("req-1", &tree, strategy, false, tracker.snapshot());

        assert_eq!(report.status, StageStatus::Failed);
        assert_eq!(report.flow("level-0").unwrap().status, StageStatus::Failed);
        assert_eq!(report.stage("c").unwrap().status, StageStatus::Queued);
        let ids: Vec<&str> = report.stages.iter().map(|s| s.stage_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(report.failed_stages().len(), 1);

        let summary = report.summary();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.not_started, 1);
    }

    #[test]
    fn test_finish_ignores_already_finalized_stage() {
        let tree = tree();
        let tracker = StatusTracker::for_tree(&tree);
        tracker.start_unless("a", &AtomicBool::new(false));
        assert_eq!(tracker.fail_in_progress("execution timed out"), vec!["a".to_string()]);
        assert!(!tracker.finish("a", StageStatus::Succeeded, None, None));
        assert_eq!(tracker.status("a"), Some(StageStatus::Failed));
    }

    #[test]
    fn test_aborted_run_starts_nothing() {
        let tree = tree();
        let tracker = StatusTracker::for_tree(&tree);
        let aborted = AtomicBool::new(true);
        assert!(!tracker.start_unless("a", &aborted));
        assert_eq!(tracker.status("a"), Some(StageStatus::Queued));
        assert!(!tracker.any_in_progress());
    }

    #[test]
    fn test_compensation_retry_kept_apart() {
        let tree = tree();
        let tracker = StatusTracker::for_tree(&tree);
        tracker.start_unless("a", &AtomicBool::new(false));
        let mut forward = RetryInformation::default();
        forward.record(&"HTTP 503");
        tracker.finish("a", StageStatus::Succeeded, None, Some(forward));

        let mut compensation = RetryInformation::default();
        compensation.record(&"HTTP 502");
        compensation.record(&"HTTP 504");
        tracker.finish("a", StageStatus::Cancelled, None, Some(compensation));

        let record = tracker.snapshot().remove("a").unwrap();
        assert_eq!(record.status, StageStatus::Cancelled);
        assert_eq!(record.retry.retries_count, 1);
        assert_eq!(record.compensation_retry.map(|r| r.retries_count), Some(2));
    }

    #[test]
    fn test_report_serializes() {
        let tree = tree();
        let tracker = StatusTracker::for_tree(&tree);
        let strategy = ExecutionStrategy::IgnoreOnError;
        let report = FlowReport::build("req-1", &tree, strategy, false, tracker.snapshot());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"strategy\":\"ignore-on-error\""));
        let back: FlowReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
