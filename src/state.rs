//! State file - tenant entitlements and execution reports
//!
//! One JSON document holds what each tenant is entitled to and the report
//! of every executed request. It is read once per command and written
//! back after each change.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use entitlement::FlowHistory;
use integration::EntitlementSource;
use serde::{Deserialize, Serialize};
use stageflow::FlowReport;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// State Structures
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantState>,

    #[serde(default)]
    pub reports: BTreeMap<String, StoredReport>,

    pub last_updated: Option<DateTime<Utc>>,
}

/// Applications entitled to one tenant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantState {
    #[serde(default)]
    pub applications: BTreeSet<String>,

    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub recorded_at: DateTime<Utc>,
    pub report: FlowReport,
}

// ============================================================================
// StateFile
// ============================================================================

/// State backed by a JSON file
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    data: Mutex<StateData>,
}

impl StateFile {
    /// Load state from disk, or start empty if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            let data: StateData = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
            log::debug!("Loaded state from {}", path.display());
            data
        } else {
            log::debug!("State file {} does not exist, using empty state", path.display());
            StateData::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, StateData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save(&self, data: &mut StateData) -> Result<()> {
        data.last_updated = Some(Utc::now());

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(data).context("Failed to serialize state")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))?;

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    /// Applications entitled to a tenant
    pub fn entitled(&self, tenant: &str) -> Vec<String> {
        self.lock()
            .tenants
            .get(tenant)
            .map(|t| t.applications.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace a tenant's entitlements and save
    pub fn set_entitled(&self, tenant: &str, applications: Vec<String>) -> Result<()> {
        let mut data = self.lock();
        let state = data.tenants.entry(tenant.to_string()).or_default();
        state.applications = applications.into_iter().collect();
        state.updated_at = Some(Utc::now());
        self.save(&mut data)
    }
}

impl EntitlementSource for StateFile {
    fn find_entitled_applications(&self, tenant: &str) -> integration::Result<Vec<String>> {
        Ok(self.entitled(tenant))
    }
}

impl FlowHistory for StateFile {
    fn record(&self, report: &FlowReport) -> Result<()> {
        let mut data = self.lock();
        data.reports.insert(
            report.flow_id.clone(),
            StoredReport {
                recorded_at: Utc::now(),
                report: report.clone(),
            },
        );
        self.save(&mut data)
    }

    fn find(&self, flow_id: &str) -> Result<Option<FlowReport>> {
        Ok(self.lock().reports.get(flow_id).map(|r| r.report.clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use stageflow::{ExecuteOptions, FlowNode, NoListener, execute};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = StateFile::load(&dir.path().join("state.json")).unwrap();
        assert!(state.entitled("diku").is_empty());
    }

    #[test]
    fn test_entitlements_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let state = StateFile::load(&path).unwrap();
        state
            .set_entitled("diku", vec!["app-b-1.0.0".to_string(), "app-a-1.0.0".to_string()])
            .unwrap();

        let reloaded = StateFile::load(&path).unwrap();
        assert_eq!(reloaded.entitled("diku"), vec!["app-a-1.0.0", "app-b-1.0.0"]);
        assert_eq!(
            reloaded.find_entitled_applications("diku").unwrap(),
            vec!["app-a-1.0.0", "app-b-1.0.0"]
        );
    }

    #[test]
    fn test_reports_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let tree = FlowNode::noop("req-1");
        let report =
            execute("req-1", &tree, &ExecuteOptions::default(), Arc::new(NoListener)).unwrap();

        StateFile::load(&path).unwrap().record(&report).unwrap();

        let reloaded = StateFile::load(&path).unwrap();
        assert_eq!(reloaded.find("req-1").unwrap(), Some(report));
        assert!(reloaded.find("req-2").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        let err = StateFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse state file"));
    }
}
