pub mod apply;
pub mod plan;
pub mod sequence;
pub mod status;

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use entitlement::{EntitlementConfig, EntitlementRequest, EntitlementService, PlannedRequest};
use integration::InMemoryCatalog;
use stageflow::{FlowRecord, FlowReport};
use std::sync::Arc;

use crate::Context;
use crate::catalog;
use crate::cli::{RequestArgs, SourceArgs};
use crate::integrations::LoggingSystems;
use crate::state::StateFile;
use crate::ui;

/// Catalog and state opened for one command
pub struct Session {
    pub catalog: Arc<InMemoryCatalog>,
    pub state: Arc<StateFile>,
}

impl Session {
    pub fn open(ctx: &Context, sources: &SourceArgs) -> Result<Self> {
        let catalog_path = ctx.config.catalog_path(sources.catalog.as_deref())?;
        let state_path = ctx.config.state_path(sources.state.as_deref())?;
        Ok(Self {
            catalog: Arc::new(catalog::load(&catalog_path)?),
            state: Arc::new(StateFile::load(&state_path)?),
        })
    }

    /// Service wired to the local systems
    pub fn service(
        &self,
        config: EntitlementConfig,
        systems: &Arc<LoggingSystems>,
    ) -> Result<EntitlementService> {
        let service = EntitlementService::new(
            config,
            self.catalog.clone(),
            self.state.clone(),
            systems.integrations(),
            self.state.clone(),
        )?;
        Ok(service)
    }
}

pub fn new_request_id() -> String {
    format!("req-{}", Utc::now().format("%Y%m%d-%H%M%S%3f"))
}

pub fn build_request(args: &RequestArgs, request_id: &str) -> EntitlementRequest {
    EntitlementRequest::new(
        request_id,
        args.tenant.as_str(),
        args.request_type.into(),
        args.ids.iter().cloned(),
    )
}

/// Print buckets and interface violations
pub fn print_plan(planned: &PlannedRequest) {
    let request = &planned.request;
    ui::header(&format!("{} request for {}", request.request_type, request.tenant));
    ui::kv("Request", &request.request_id);
    ui::kv("Entitled", &planned.entitled.len().to_string());

    if planned.plan.is_empty() {
        ui::info("Nothing changes");
        return;
    }

    for bucket in planned.plan.buckets() {
        ui::section(&format!("{} ({})", bucket.transition, bucket.len()));
        for id in &bucket.application_ids {
            match planned.plan.upgrade_from.get(id) {
                Some(from) => println!("  {} {} {}", from.dimmed(), "→".cyan(), id),
                None => println!("  {id}"),
            }
        }
    }

    if !planned.violations.is_empty() {
        ui::section("Interface violations");
        for violation in &planned.violations {
            println!("  {} {}", "✗".red(), violation);
        }
    }
}

/// Print per-flow and per-stage status of a report
pub fn print_report(report: &FlowReport) {
    ui::header(&format!("Request {}", report.flow_id));
    ui::kv("Status", &ui::status(report.status).to_string());
    ui::kv("Strategy", &report.strategy.to_string());
    if report.timed_out {
        ui::warn("Execution timed out");
    }

    let applications = application_flows(report);
    if !applications.is_empty() {
        ui::section("Applications");
        for flow in applications {
            println!("  {:<22} {}", ui::status(flow.status).to_string(), flow.flow_id);
        }
    }

    ui::section("Stages");
    for stage in &report.stages {
        println!("  {:<22} {}", ui::status(stage.status).to_string(), stage.description);
        ui::dim(&stage.stage_id);
        if let Some(error) = &stage.error {
            println!("    {} {}", "error:".red(), error);
        }
        if stage.retry.retries_count > 0 {
            ui::dim(&format!("retried {} times", stage.retry.retries_count));
            for entry in &stage.retry.errors {
                ui::dim(&format!("  {entry}"));
            }
        }
        if let Some(retry) = stage.compensation_retry.as_ref().filter(|r| !r.is_empty()) {
            ui::dim(&format!("rollback retried {} times", retry.retries_count));
        }
    }

    print_summary(report);
}

/// Per-application nodes of a report; other interior nodes carry a `:` scope
pub fn application_flows(report: &FlowReport) -> Vec<&FlowRecord> {
    report
        .flows
        .iter()
        .filter(|f| f.flow_id != report.flow_id && !f.flow_id.contains(':'))
        .collect()
}

pub fn print_summary(report: &FlowReport) {
    let summary = report.summary();
    println!();
    println!(
        "  {} succeeded, {} failed, {} rolled back, {} rollback failed, {} not started",
        summary.succeeded.to_string().green(),
        summary.failed.to_string().red(),
        summary.cancelled.to_string().yellow(),
        summary.cancellation_failed.to_string().red(),
        summary.not_started.to_string().dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use stageflow::{ExecutionStrategy, StageStatus};

    fn flow(flow_id: &str, status: StageStatus) -> FlowRecord {
        FlowRecord {
            flow_id: flow_id.to_string(),
            status,
        }
    }

    #[test]
    fn test_application_flows_skip_request_and_module_nodes() {
        let report = FlowReport {
            flow_id: "req-1".to_string(),
            status: StageStatus::Failed,
            strategy: ExecutionStrategy::IgnoreOnError,
            timed_out: false,
            flows: vec![
                flow("req-1", StageStatus::Failed),
                flow("req-1:apply", StageStatus::Failed),
                flow("req-1:apply:level-0", StageStatus::Failed),
                flow("app-base-1.0.0", StageStatus::Succeeded),
                flow("app-base-1.0.0:mod-users-1.0.0", StageStatus::Succeeded),
                flow("app-top-1.0.0", StageStatus::Failed),
            ],
            stages: Vec::new(),
        };

        let applications: Vec<(&str, StageStatus)> = application_flows(&report)
            .into_iter()
            .map(|f| (f.flow_id.as_str(), f.status))
            .collect();

        assert_eq!(
            applications,
            vec![("app-base-1.0.0", StageStatus::Succeeded), ("app-top-1.0.0", StageStatus::Failed)]
        );
    }
}
