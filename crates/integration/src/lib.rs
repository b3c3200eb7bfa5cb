//! # Integration
//!
//! Ports to the external systems an entitlement request touches, and the
//! payloads sent to them.
//!
//! - [`DescriptorSource`] / [`EntitlementSource`]: read side (catalog and
//!   current entitlements)
//! - [`ModuleInstaller`], [`GatewayRoutes`], [`AuthResources`]: side
//!   effects performed by stages
//! - [`EventPublisher`]: fire-and-forget notifications
//!
//! Errors carry a [`TargetSystem`] and are classified as transient or
//! permanent via [`Error::category`]; the classification drives
//! [`stageflow::with_retry`].

mod error;
mod memory;
mod ports;
mod types;

pub use error::{Error, ErrorCategory, Result, TargetSystem};
pub use memory::{InMemoryCatalog, InMemoryEntitlements};
pub use ports::{
    AuthResources, DescriptorSource, EntitlementSource, EventPublisher, GatewayRoutes,
    ModuleInstaller,
};
pub use types::{
    AuthResource, DescriptorFilter, EntitlementEvent, EventKind, ModuleRequest, ResourceRequest,
    Route, RouteRequest,
};
