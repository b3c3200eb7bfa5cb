//! Action stages - one remote call per stage, with compensation

use anyhow::Result;
use integration::{
    AuthResources, EntitlementEvent, EventPublisher, GatewayRoutes, ModuleInstaller, ModuleRequest,
    ResourceRequest, RouteRequest,
};
use stageflow::{RetryConfig, Stage, StageContext, with_retry};
use std::fmt;
use std::sync::Arc;

/// What a stage does to its target system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Remove,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install, update or uninstall a module
pub struct ModuleStage {
    action: Action,
    request: ModuleRequest,
    installer: Arc<dyn ModuleInstaller>,
    retry: RetryConfig,
}

impl ModuleStage {
    pub fn new(
        action: Action,
        request: ModuleRequest,
        installer: Arc<dyn ModuleInstaller>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            action,
            request,
            installer,
            retry,
        }
    }

    fn verb(&self) -> &'static str {
        match self.action {
            Action::Create => "install",
            Action::Update => "update",
            Action::Remove => "uninstall",
        }
    }
}

impl fmt::Debug for ModuleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleStage")
            .field("action", &self.action)
            .field("module", &self.request.module.id())
            .finish_non_exhaustive()
    }
}

impl Stage for ModuleStage {
    fn id(&self) -> String {
        format!(
            "{}:{}:module-{}",
            self.request.application_id,
            self.request.module.id(),
            self.verb()
        )
    }

    fn description(&self) -> String {
        match (&self.action, &self.request.installed) {
            (Action::Update, Some(installed)) => {
                format!("Update {} to {}", installed.id(), self.request.module.version)
            }
            (Action::Create, _) => format!("Install {}", self.request.module.id()),
            (Action::Update, None) => format!("Update {}", self.request.module.id()),
            (Action::Remove, _) => format!("Uninstall {}", self.request.module.id()),
        }
    }

    fn stage_type(&self) -> &'static str {
        "module"
    }

    fn execute(&self, ctx: &mut StageContext) -> Result<()> {
        log::debug!("{}", self.description());
        match self.action {
            Action::Create | Action::Update => {
                with_retry(&self.retry, &mut ctx.retry, || self.installer.install(&self.request))?;
            }
            Action::Remove => {
                with_retry(&self.retry, &mut ctx.retry, || {
                    self.installer.uninstall(&self.request)
                })?;
            }
        }
        Ok(())
    }

    fn cancel(&self, ctx: &mut StageContext) -> Result<()> {
        match self.action {
            Action::Create => {
                with_retry(&self.retry, &mut ctx.retry, || {
                    self.installer.uninstall(&self.request)
                })?;
            }
            Action::Update => {
                if let Some(reverted) = self.request.reverted() {
                    with_retry(&self.retry, &mut ctx.retry, || self.installer.install(&reverted))?;
                }
            }
            Action::Remove => {}
        }
        Ok(())
    }

    fn cancel_if_failed(&self) -> bool {
        match self.action {
            Action::Create => true,
            Action::Update => self.request.installed.is_some(),
            Action::Remove => false,
        }
    }
}

/// Create, update or remove gateway routes
pub struct RouteStage {
    action: Action,
    request: RouteRequest,
    gateway: Arc<dyn GatewayRoutes>,
    retry: RetryConfig,
}

impl RouteStage {
    pub fn new(
        action: Action,
        request: RouteRequest,
        gateway: Arc<dyn GatewayRoutes>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            action,
            request,
            gateway,
            retry,
        }
    }

    fn call(
        &self,
        action: Action,
        request: &RouteRequest,
        ctx: &mut StageContext,
    ) -> integration::Result<()> {
        with_retry(&self.retry, &mut ctx.retry, || match action {
            Action::Create => self.gateway.add_routes(request),
            Action::Update => self.gateway.update_routes(request),
            Action::Remove => self.gateway.remove_routes(request),
        })
    }
}

impl fmt::Debug for RouteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteStage")
            .field("action", &self.action)
            .field("module", &self.request.module_id)
            .field("routes", &self.request.routes.len())
            .finish_non_exhaustive()
    }
}

impl Stage for RouteStage {
    fn id(&self) -> String {
        format!("{}:{}:routes-{}", self.request.application_id, self.request.module_id, self.action)
    }

    fn description(&self) -> String {
        let count = match self.action {
            Action::Remove => self.request.routes.len().max(self.request.previous.len()),
            _ => self.request.routes.len(),
        };
        format!("{} {count} gateway routes of {}", capitalize(self.action), self.request.module_id)
    }

    fn stage_type(&self) -> &'static str {
        "gateway"
    }

    fn execute(&self, ctx: &mut StageContext) -> Result<()> {
        self.call(self.action, &self.request, ctx)?;
        Ok(())
    }

    fn cancel(&self, ctx: &mut StageContext) -> Result<()> {
        match self.action {
            Action::Create => self.call(Action::Remove, &self.request, ctx)?,
            Action::Update => self.call(Action::Update, &self.request.reverted(), ctx)?,
            Action::Remove => {}
        }
        Ok(())
    }

    fn cancel_if_failed(&self) -> bool {
        self.action != Action::Remove
    }
}

/// Register, update or remove auth resources
pub struct ResourceStage {
    action: Action,
    request: ResourceRequest,
    auth: Arc<dyn AuthResources>,
    retry: RetryConfig,
}

impl ResourceStage {
    pub fn new(
        action: Action,
        request: ResourceRequest,
        auth: Arc<dyn AuthResources>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            action,
            request,
            auth,
            retry,
        }
    }

    fn call(
        &self,
        action: Action,
        request: &ResourceRequest,
        ctx: &mut StageContext,
    ) -> integration::Result<()> {
        with_retry(&self.retry, &mut ctx.retry, || match action {
            Action::Create => self.auth.register_resources(request),
            Action::Update => self.auth.update_resources(request),
            Action::Remove => self.auth.remove_resources(request),
        })
    }
}

impl fmt::Debug for ResourceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStage")
            .field("action", &self.action)
            .field("realm", &self.request.realm)
            .field("module", &self.request.module_id)
            .finish_non_exhaustive()
    }
}

impl Stage for ResourceStage {
    fn id(&self) -> String {
        format!(
            "{}:{}:resources-{}",
            self.request.application_id, self.request.module_id, self.action
        )
    }

    fn description(&self) -> String {
        format!(
            "{} auth resources of {} in realm {}",
            capitalize(self.action),
            self.request.module_id,
            self.request.realm
        )
    }

    fn stage_type(&self) -> &'static str {
        "auth"
    }

    fn execute(&self, ctx: &mut StageContext) -> Result<()> {
        self.call(self.action, &self.request, ctx)?;
        Ok(())
    }

    fn cancel(&self, ctx: &mut StageContext) -> Result<()> {
        match self.action {
            Action::Create => self.call(Action::Remove, &self.request, ctx)?,
            Action::Update => self.call(Action::Update, &self.request.reverted(), ctx)?,
            Action::Remove => {}
        }
        Ok(())
    }

    fn cancel_if_failed(&self) -> bool {
        self.action != Action::Remove
    }
}

/// Publish an entitlement event; failures are logged, never raised
pub struct EventStage {
    event: EntitlementEvent,
    publisher: Arc<dyn EventPublisher>,
    retry: RetryConfig,
}

impl EventStage {
    pub fn new(
        event: EntitlementEvent,
        publisher: Arc<dyn EventPublisher>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            event,
            publisher,
            retry,
        }
    }
}

impl fmt::Debug for EventStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStage")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

impl Stage for EventStage {
    fn id(&self) -> String {
        format!("{}:{}:event", self.event.application_id, self.event.module_id)
    }

    fn description(&self) -> String {
        format!("Publish {} event for {}", self.event.kind, self.event.module_id)
    }

    fn stage_type(&self) -> &'static str {
        "event"
    }

    fn execute(&self, ctx: &mut StageContext) -> Result<()> {
        let published = with_retry(&self.retry, &mut ctx.retry, || {
            self.publisher.publish(&self.event)
        });
        if let Err(e) = published {
            log::warn!(
                "Failed to publish {} event for {}: {e}",
                self.event.kind,
                self.event.module_id
            );
        }
        Ok(())
    }
}

fn capitalize(action: Action) -> &'static str {
    match action {
        Action::Create => "Create",
        Action::Update => "Update",
        Action::Remove => "Remove",
    }
}
