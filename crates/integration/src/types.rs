//! Request and event payloads sent to external systems

use chrono::{DateTime, Utc};
use descriptor::{ApplicationDescriptor, ModuleDescriptor, Version, VersionRange};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Install, uninstall or update one module for a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRequest {
    pub tenant: String,
    pub application_id: String,
    /// Module being installed, updated to, or removed
    pub module: ModuleDescriptor,
    /// Currently installed version when updating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<ModuleDescriptor>,
}

impl ModuleRequest {
    pub fn new(
        tenant: impl Into<String>,
        application_id: impl Into<String>,
        module: ModuleDescriptor,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            application_id: application_id.into(),
            module,
            installed: None,
        }
    }

    pub fn with_installed(mut self, installed: Option<ModuleDescriptor>) -> Self {
        self.installed = installed;
        self
    }

    /// The update that restores the installed version
    ///
    /// `None` when there is nothing to go back to.
    pub fn reverted(&self) -> Option<Self> {
        let installed = self.installed.clone()?;
        Some(Self {
            tenant: self.tenant.clone(),
            application_id: self.application_id.clone(),
            module: installed,
            installed: Some(self.module.clone()),
        })
    }
}

/// A gateway route for one interface handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub interface_id: String,
    pub methods: Vec<String>,
    pub path_pattern: String,
}

impl Route {
    /// Routes for every handler of the module's public interfaces
    pub fn for_module(module: &ModuleDescriptor) -> Vec<Route> {
        module
            .public_interfaces()
            .flat_map(|interface| {
                interface.handlers.iter().map(|handler| Route {
                    interface_id: interface.id.clone(),
                    methods: handler.methods.clone(),
                    path_pattern: handler.path_pattern.clone(),
                })
            })
            .collect()
    }
}

/// Create, update or remove the routes of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub tenant: String,
    pub application_id: String,
    pub module_id: String,
    pub routes: Vec<Route>,
    /// Routes of the installed version when updating
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous: Vec<Route>,
}

impl RouteRequest {
    pub fn for_module(
        tenant: &str,
        application_id: &str,
        module: &ModuleDescriptor,
        installed: Option<&ModuleDescriptor>,
    ) -> Self {
        Self {
            tenant: tenant.to_string(),
            application_id: application_id.to_string(),
            module_id: module.id(),
            routes: Route::for_module(module),
            previous: installed.map(Route::for_module).unwrap_or_default(),
        }
    }

    /// Nothing to send to the gateway
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.previous.is_empty()
    }

    /// The update that restores the previous routes
    pub fn reverted(&self) -> Self {
        Self {
            routes: self.previous.clone(),
            previous: self.routes.clone(),
            ..self.clone()
        }
    }
}

/// A protected endpoint registered with the auth resource manager
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResource {
    pub path_pattern: String,
    pub methods: Vec<String>,
    pub permissions: Vec<String>,
}

impl AuthResource {
    /// Resources for every handler that requires permissions
    pub fn for_module(module: &ModuleDescriptor) -> Vec<AuthResource> {
        module
            .provides
            .iter()
            .flat_map(|interface| interface.handlers.iter())
            .filter(|handler| !handler.permissions_required.is_empty())
            .map(|handler| AuthResource {
                path_pattern: handler.path_pattern.clone(),
                methods: handler.methods.clone(),
                permissions: handler.permissions_required.clone(),
            })
            .collect()
    }
}

/// Register, update or remove the auth resources of one module
///
/// Auth resources are realm-scoped; the realm is the tenant's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub realm: String,
    pub application_id: String,
    pub module_id: String,
    pub resources: Vec<AuthResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous: Vec<AuthResource>,
}

impl ResourceRequest {
    pub fn for_module(
        realm: &str,
        application_id: &str,
        module: &ModuleDescriptor,
        installed: Option<&ModuleDescriptor>,
    ) -> Self {
        Self {
            realm: realm.to_string(),
            application_id: application_id.to_string(),
            module_id: module.id(),
            resources: AuthResource::for_module(module),
            previous: installed.map(AuthResource::for_module).unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.previous.is_empty()
    }

    pub fn reverted(&self) -> Self {
        Self {
            resources: self.previous.clone(),
            previous: self.resources.clone(),
            ..self.clone()
        }
    }
}

/// What happened to a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Entitle,
    Upgrade,
    Revoke,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entitle => f.write_str("ENTITLE"),
            Self::Upgrade => f.write_str("UPGRADE"),
            Self::Revoke => f.write_str("REVOKE"),
        }
    }
}

/// Notification published after a module changed for a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementEvent {
    pub kind: EventKind,
    pub tenant: String,
    pub application_id: String,
    pub module_id: String,
    pub timestamp: DateTime<Utc>,
}

impl EntitlementEvent {
    pub fn new(kind: EventKind, tenant: &str, application_id: &str, module_id: &str) -> Self {
        Self {
            kind,
            tenant: tenant.to_string(),
            application_id: application_id.to_string(),
            module_id: module_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Query over the descriptor catalog
///
/// Empty filters match everything; set fields are combined with AND.
#[derive(Debug, Clone, Default)]
pub struct DescriptorFilter {
    pub name: Option<String>,
    pub version_range: Option<VersionRange>,
    pub ids: Vec<String>,
}

impl DescriptorFilter {
    /// All versions of one application
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Exact ids
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, range: VersionRange) -> Self {
        self.version_range = Some(range);
        self
    }

    pub fn matches(&self, app: &ApplicationDescriptor) -> bool {
        if self.name.as_ref().is_some_and(|name| *name != app.name) {
            return false;
        }
        if !self.ids.is_empty() && !self.ids.contains(&app.id()) {
            return false;
        }
        match &self.version_range {
            Some(range) => Version::parse(&app.version).is_ok_and(|v| range.matches(&v)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use descriptor::{InterfaceDescriptor, RoutingEntry};

    fn module(version: &str, path: &str) -> ModuleDescriptor {
        ModuleDescriptor::new("mod-users", version)
            .providing_interface(
                InterfaceDescriptor::new("users", "1.0").with_handler(
                    RoutingEntry::new(&["GET"], path).with_permission("users.collection.get"),
                ),
            )
            .providing_interface(
                InterfaceDescriptor::new("_timer", "1.0")
                    .system()
                    .with_handler(RoutingEntry::new(&["POST"], "/users/expire")),
            )
    }

    #[test]
    fn test_routes_skip_system_interfaces() {
        let routes = Route::for_module(&module("1.0.0", "/users"));
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].interface_id, "users");
    }

    #[test]
    fn test_resources_need_permissions() {
        let resources = AuthResource::for_module(&module("1.0.0", "/users"));
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].permissions, vec!["users.collection.get"]);
    }

    #[test]
    fn test_route_request_reverted() {
        let old = module("1.0.0", "/users");
        let new = module("1.1.0", "/v2/users");
        let request = RouteRequest::for_module("diku", "app-users-1.1.0", &new, Some(&old));
        let reverted = request.reverted();
        assert_eq!(reverted.routes[0].path_pattern, "/users");
        assert_eq!(reverted.previous[0].path_pattern, "/v2/users");
    }

    #[test]
    fn test_module_request_reverted() {
        let request = ModuleRequest::new("diku", "app-1.1.0", module("1.1.0", "/users"))
            .with_installed(Some(module("1.0.0", "/users")));
        let reverted = request.reverted().unwrap();
        assert_eq!(reverted.module.version, "1.0.0");
        assert_eq!(reverted.installed.unwrap().version, "1.1.0");
        let fresh = ModuleRequest::new("diku", "app-1.0.0", module("1.0.0", "/u"));
        assert!(fresh.reverted().is_none());
    }

    #[test]
    fn test_descriptor_filter() {
        let app = ApplicationDescriptor::new("app-users", "1.2.0");
        assert!(DescriptorFilter::default().matches(&app));
        assert!(DescriptorFilter::by_name("app-users").matches(&app));
        assert!(!DescriptorFilter::by_name("app-other").matches(&app));
        assert!(DescriptorFilter::by_ids(["app-users-1.2.0"]).matches(&app));
        let range = VersionRange::parse("^1.0.0").unwrap();
        assert!(DescriptorFilter::by_name("app-users").with_range(range).matches(&app));
        let range = VersionRange::parse(">=2.0.0").unwrap();
        assert!(!DescriptorFilter::default().with_range(range).matches(&app));
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = EntitlementEvent::new(EventKind::Entitle, "diku", "app-1.0.0", "mod-1.0.0");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"applicationId\":\"app-1.0.0\""));
        assert!(json.contains("\"kind\":\"ENTITLE\""));
    }
}
