use anyhow::Result;
use std::sync::Arc;

use super::{Session, build_request, new_request_id, print_plan};
use crate::Context;
use crate::cli::PlanArgs;
use crate::integrations::LoggingSystems;
use crate::ui;

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let session = Session::open(ctx, &args.request.sources)?;
    let systems = Arc::new(LoggingSystems::new());
    let service = session.service(ctx.config.entitlement.clone(), &systems)?;

    let request = build_request(&args.request, &new_request_id());
    let planned = service.plan_and_validate(&request)?;
    print_plan(&planned);

    if planned.plan.is_empty() {
        return Ok(());
    }
    if !planned.is_valid() {
        println!();
        ui::error(&format!(
            "{} unmet interface requirements, the request would be rejected",
            planned.violations.len()
        ));
        return Ok(());
    }

    let sequences = service.sequences(&planned)?;
    let tree = service.build_execution_tree(&planned, &sequences);
    ui::section(&format!(
        "Execution tree ({} stages, {:?} mode)",
        tree.stage_count(),
        service.config().execution.mode
    ));
    ui::tree(&tree.render());
    Ok(())
}
