//! Local stand-ins for the remote systems
//!
//! The CLI has no network clients; every call is logged and counted so an
//! apply run shows what the platform would be asked to do.

use entitlement::Integrations;
use integration::{
    AuthResources, EntitlementEvent, EventPublisher, GatewayRoutes, ModuleInstaller, ModuleRequest,
    ResourceRequest, RouteRequest,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Logs every call at info level
#[derive(Debug, Default)]
pub struct LoggingSystems {
    calls: AtomicUsize,
}

impl LoggingSystems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn call(&self, system: &str, message: String) -> integration::Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        log::info!("[{system}] {message}");
        Ok(())
    }

    /// Wire this sink into every integration slot
    pub fn integrations(self: &Arc<Self>) -> Integrations {
        Integrations::new(self.clone())
            .with_gateway(self.clone())
            .with_auth(self.clone())
            .with_events(self.clone())
    }
}

impl ModuleInstaller for LoggingSystems {
    fn install(&self, request: &ModuleRequest) -> integration::Result<()> {
        let message = match &request.installed {
            Some(installed) => format!(
                "{}: update {} -> {}",
                request.tenant,
                installed.id(),
                request.module.id()
            ),
            None => format!("{}: install {}", request.tenant, request.module.id()),
        };
        self.call("module-manager", message)
    }

    fn uninstall(&self, request: &ModuleRequest) -> integration::Result<()> {
        self.call(
            "module-manager",
            format!("{}: uninstall {}", request.tenant, request.module.id()),
        )
    }
}

impl GatewayRoutes for LoggingSystems {
    fn add_routes(&self, request: &RouteRequest) -> integration::Result<()> {
        self.call(
            "gateway",
            format!(
                "{}: add {} routes of {}",
                request.tenant,
                request.routes.len(),
                request.module_id
            ),
        )
    }

    fn remove_routes(&self, request: &RouteRequest) -> integration::Result<()> {
        self.call(
            "gateway",
            format!(
                "{}: remove {} routes of {}",
                request.tenant,
                request.routes.len(),
                request.module_id
            ),
        )
    }

    fn update_routes(&self, request: &RouteRequest) -> integration::Result<()> {
        self.call(
            "gateway",
            format!(
                "{}: replace {} routes of {} with {}",
                request.tenant,
                request.previous.len(),
                request.module_id,
                request.routes.len()
            ),
        )
    }
}

impl AuthResources for LoggingSystems {
    fn register_resources(&self, request: &ResourceRequest) -> integration::Result<()> {
        self.call(
            "auth",
            format!(
                "{}: register {} resources of {}",
                request.realm,
                request.resources.len(),
                request.module_id
            ),
        )
    }

    fn remove_resources(&self, request: &ResourceRequest) -> integration::Result<()> {
        self.call(
            "auth",
            format!(
                "{}: remove {} resources of {}",
                request.realm,
                request.resources.len(),
                request.module_id
            ),
        )
    }

    fn update_resources(&self, request: &ResourceRequest) -> integration::Result<()> {
        self.call(
            "auth",
            format!(
                "{}: update {} resources of {}",
                request.realm,
                request.resources.len(),
                request.module_id
            ),
        )
    }
}

impl EventPublisher for LoggingSystems {
    fn publish(&self, event: &EntitlementEvent) -> integration::Result<()> {
        self.call(
            "events",
            format!(
                "{}: {} {} ({})",
                event.tenant, event.kind, event.module_id, event.application_id
            ),
        )
    }
}
