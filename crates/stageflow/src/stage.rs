//! Stage trait - the unit of side-effecting work in a flow
//!
//! A stage performs one action against one system and may define a
//! compensating action that undoes it when the surrounding flow fails.

use crate::context::StageContext;
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

/// Core trait for flow stages
///
/// # Example
///
/// ```ignore
/// use stageflow::{Stage, StageContext};
///
/// #[derive(Debug)]
/// struct CreateRoutes { module: String }
///
/// impl Stage for CreateRoutes {
///     fn id(&self) -> String { format!("{}:routes-create", self.module) }
///     fn description(&self) -> String { format!("Create routes for {}", self.module) }
///     fn stage_type(&self) -> &'static str { "gateway" }
///
///     fn execute(&self, _ctx: &mut StageContext) -> anyhow::Result<()> {
///         // call the gateway
///         Ok(())
///     }
///
///     fn cancel(&self, _ctx: &mut StageContext) -> anyhow::Result<()> {
///         // remove what execute created
///         Ok(())
///     }
///
///     fn cancel_if_failed(&self) -> bool { true }
/// }
/// ```
pub trait Stage: Send + Sync + fmt::Debug {
    /// Identifier, unique within one flow
    fn id(&self) -> String;

    /// Human-readable description of what this stage does
    fn description(&self) -> String;

    /// Stage category, used for grouping in reports
    fn stage_type(&self) -> &'static str;

    /// Run the forward action
    ///
    /// Retry diagnostics go into `ctx.retry`.
    fn execute(&self, ctx: &mut StageContext) -> Result<()>;

    /// Run the compensating action
    ///
    /// Only called for stages that succeeded and whose
    /// [`cancel_if_failed`](Stage::cancel_if_failed) is `true`.
    fn cancel(&self, _ctx: &mut StageContext) -> Result<()> {
        Ok(())
    }

    /// Whether this stage should be compensated when the flow fails
    fn cancel_if_failed(&self) -> bool {
        false
    }
}

/// A stage shared between the flow tree and executor workers
pub type SharedStage = Arc<dyn Stage>;
