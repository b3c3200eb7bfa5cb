use anyhow::{Result, bail};
use colored::Colorize;
use stageflow::{ExecutionStrategy, FlowListener};
use std::sync::Arc;

use super::{Session, build_request, new_request_id, print_plan, print_summary};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::integrations::LoggingSystems;
use crate::progress::ProgressListener;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let session = Session::open(ctx, &args.request.sources)?;

    let mut config = ctx.config.entitlement.clone();
    if let Some(jobs) = args.jobs {
        config.execution.jobs = Some(jobs.max(1));
    }
    let listener: Arc<dyn FlowListener> = if ctx.quiet {
        Arc::new(ProgressListener::hidden())
    } else {
        Arc::new(ProgressListener::new())
    };
    let systems = Arc::new(LoggingSystems::new());
    let service = session.service(config, &systems)?.with_listener(listener);

    let request_id = args.request_id.clone().unwrap_or_else(new_request_id);
    let mut request = build_request(&args.request, &request_id);
    if args.ignore_errors {
        request = request.with_strategy(ExecutionStrategy::IgnoreOnError);
    }

    // 1. Plan and validate
    let planned = service.plan_and_validate(&request)?;
    print_plan(&planned);
    if !planned.is_valid() {
        return Err(entitlement::Error::InterfaceIntegrity(planned.violations.clone()).into());
    }
    if planned.plan.is_empty() {
        return Ok(());
    }

    // 2. Show the execution tree
    let sequences = service.sequences(&planned)?;
    let tree = service.build_execution_tree(&planned, &sequences);
    ui::section(&format!("Execution tree ({} stages)", tree.stage_count()));
    ui::tree(&tree.render());

    if args.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }

    // 3. Confirm (unless --yes)
    if !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    // 4. Execute
    println!();
    println!("  {} Applying {} ...", "→".cyan(), request_id);
    let report = service.execute_planned(&planned)?;
    print_summary(&report);
    ui::dim(&format!("{} calls to remote systems", systems.calls()));

    // 5. Persist what was actually applied
    let entitled = planned.entitled_after_report(&report);
    let changed = entitled != planned.entitled;
    if changed {
        session.state.set_entitled(&request.tenant, entitled)?;
    }

    if !report.is_success() {
        if changed {
            ui::warn("Applications that completed were saved to the tenant state");
        }
        bail!(
            "Request {request_id} finished with status {}; see `entitle status {request_id}`",
            report.status
        );
    }

    ui::success(&format!(
        "{} now has {} applications",
        request.tenant,
        session.state.entitled(&request.tenant).len()
    ));
    ui::dim(&format!("State saved to {}", session.state.path().display()));
    Ok(())
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{RequestArgs, RequestKind, SourceArgs};
    use crate::config::Config;
    use crate::state::StateFile;
    use entitlement::FlowHistory;
    use stageflow::StageStatus;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const CATALOG: &str = r#"[
        {
            "name": "app-base",
            "version": "1.0.0",
            "modules": [
                {
                    "name": "mod-users",
                    "version": "1.0.0",
                    "provides": [
                        {
                            "id": "users",
                            "version": "1.1",
                            "handlers": [{
                                "methods": ["GET"],
                                "pathPattern": "/users",
                                "permissionsRequired": ["users.get"]
                            }]
                        }
                    ]
                }
            ]
        },
        {
            "name": "app-top",
            "version": "1.0.0",
            "modules": [
                {
                    "name": "mod-orders",
                    "version": "1.0.0",
                    "requires": [{ "id": "users", "version": "1.0" }]
                }
            ],
            "dependencies": [{ "name": "app-base", "version": "^1.0.0" }]
        }
    ]"#;

    fn context() -> Context {
        let mut config = Config::default();
        config.entitlement.retry.initial_delay_ms = 1;
        Context {
            verbose: 0,
            quiet: true,
            config,
        }
    }

    fn args(dir: &Path, kind: RequestKind, ids: &[&str]) -> ApplyArgs {
        ApplyArgs {
            request: RequestArgs {
                request_type: kind,
                ids: ids.iter().map(ToString::to_string).collect(),
                allow_empty: false,
                tenant: "diku".to_string(),
                sources: SourceArgs {
                    catalog: Some(dir.join("catalog.json")),
                    state: Some(dir.join("state.json")),
                },
            },
            dry_run: false,
            yes: true,
            ignore_errors: false,
            jobs: Some(2),
            request_id: Some("req-test".to_string()),
        }
    }

    #[test]
    fn test_apply_persists_entitlements_and_report() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("catalog.json"), CATALOG).unwrap();

        let ids = ["app-base-1.0.0", "app-top-1.0.0"];
        run(&context(), &args(dir.path(), RequestKind::Entitle, &ids)).unwrap();

        let state = StateFile::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state.entitled("diku"), vec!["app-base-1.0.0", "app-top-1.0.0"]);
        let report = state.find("req-test").unwrap().unwrap();
        assert_eq!(report.status, StageStatus::Succeeded);
        assert!(report.stage("app-base-1.0.0:mod-users-1.0.0:routes-create").is_some());
        let applications: Vec<&str> = crate::commands::application_flows(&report)
            .into_iter()
            .map(|f| f.flow_id.as_str())
            .collect();
        assert_eq!(applications, vec!["app-base-1.0.0", "app-top-1.0.0"]);
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("catalog.json"), CATALOG).unwrap();
        let mut apply = args(dir.path(), RequestKind::Entitle, &["app-base-1.0.0"]);
        apply.dry_run = true;

        run(&context(), &apply).unwrap();

        assert!(!dir.path().join("state.json").exists());
    }

    #[test]
    fn test_unmet_interface_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("catalog.json"), CATALOG).unwrap();

        let request = args(dir.path(), RequestKind::Entitle, &["app-top-1.0.0"]);
        let err = run(&context(), &request).unwrap_err();

        assert!(err.to_string().contains("app-base"));
        assert!(!dir.path().join("state.json").exists());
    }
}
