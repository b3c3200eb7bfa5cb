//! Ports to external collaborators
//!
//! All calls are blocking; stages invoke them from executor worker threads.

use crate::error::Result;
use crate::types::{
    DescriptorFilter, EntitlementEvent, ModuleRequest, ResourceRequest, RouteRequest,
};
use descriptor::ApplicationDescriptor;

/// Source of application descriptors
pub trait DescriptorSource: Send + Sync {
    /// Fetch one descriptor by id (`<name>-<version>`)
    fn get_application_descriptor(&self, id: &str) -> Result<ApplicationDescriptor>;

    /// All descriptors matching the filter
    fn query_descriptors(&self, filter: &DescriptorFilter) -> Result<Vec<ApplicationDescriptor>>;
}

/// Source of a tenant's current entitlements
pub trait EntitlementSource: Send + Sync {
    /// Ids of applications entitled to the tenant
    fn find_entitled_applications(&self, tenant: &str) -> Result<Vec<String>>;
}

/// Module manager
pub trait ModuleInstaller: Send + Sync {
    /// Install the module, or update it when `request.installed` is set
    fn install(&self, request: &ModuleRequest) -> Result<()>;

    fn uninstall(&self, request: &ModuleRequest) -> Result<()>;
}

/// Gateway route manager
pub trait GatewayRoutes: Send + Sync {
    fn add_routes(&self, request: &RouteRequest) -> Result<()>;

    fn remove_routes(&self, request: &RouteRequest) -> Result<()>;

    fn update_routes(&self, request: &RouteRequest) -> Result<()>;
}

/// Auth resource manager
pub trait AuthResources: Send + Sync {
    fn register_resources(&self, request: &ResourceRequest) -> Result<()>;

    fn remove_resources(&self, request: &ResourceRequest) -> Result<()>;

    fn update_resources(&self, request: &ResourceRequest) -> Result<()>;
}

/// Event bus, best effort
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &EntitlementEvent) -> Result<()>;
}
