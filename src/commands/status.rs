use anyhow::Result;

use super::print_report;
use crate::Context;
use crate::cli::StatusArgs;
use crate::state::StateFile;
use entitlement::{Error, FlowHistory};

pub fn run(ctx: &Context, args: &StatusArgs) -> Result<()> {
    let state = StateFile::load(&ctx.config.state_path(args.state.as_deref())?)?;
    let report = state
        .find(&args.request_id)?
        .ok_or_else(|| Error::UnknownRequest(args.request_id.clone()))?;
    print_report(&report);
    Ok(())
}
