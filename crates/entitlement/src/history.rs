//! Flow history - where execution reports go after a request

use anyhow::Result;
use stageflow::FlowReport;
use std::collections::HashMap;
use std::sync::Mutex;

/// Sink for execution reports
pub trait FlowHistory: Send + Sync {
    /// Store a report, replacing any earlier one with the same flow id
    fn record(&self, report: &FlowReport) -> Result<()>;

    /// Report of a finished request
    fn find(&self, flow_id: &str) -> Result<Option<FlowReport>>;
}

/// History kept in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    reports: Mutex<HashMap<String, FlowReport>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FlowHistory for InMemoryHistory {
    fn record(&self, report: &FlowReport) -> Result<()> {
        let mut reports = self.reports.lock().unwrap_or_else(|e| e.into_inner());
        reports.insert(report.flow_id.clone(), report.clone());
        Ok(())
    }

    fn find(&self, flow_id: &str) -> Result<Option<FlowReport>> {
        let reports = self.reports.lock().unwrap_or_else(|e| e.into_inner());
        Ok(reports.get(flow_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stageflow::{ExecuteOptions, FlowNode, NoListener, StageStatus, execute};
    use std::sync::Arc;

    #[test]
    fn test_record_and_find() {
        let history = InMemoryHistory::new();
        let tree = FlowNode::noop("req-1");
        let report =
            execute("req-1", &tree, &ExecuteOptions::default(), Arc::new(NoListener)).unwrap();

        history.record(&report).unwrap();
        history.record(&report).unwrap();

        assert_eq!(history.len(), 1);
        let found = history.find("req-1").unwrap().unwrap();
        assert_eq!(found.status, StageStatus::Succeeded);
        assert!(history.find("req-2").unwrap().is_none());
    }
}
