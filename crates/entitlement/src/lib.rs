//! # Entitlement
//!
//! Orchestration core for entitling applications to tenants.
//!
//! ## Pipeline
//!
//! 1. **Plan**: [`ApplicationStateTransitionPlan`] splits a request into
//!    entitle, upgrade and revoke buckets against the tenant's state
//! 2. **Validate**: [`DependencyResolver`] computes dependency closures
//!    (cycles and missing dependencies are errors) and
//!    [`IntegrityValidator`] checks every required interface has a
//!    compatible provider
//! 3. **Sequence**: [`ModuleSequencer`] orders each application's modules
//!    into levels by their interface dependencies
//! 4. **Compose**: [`FlowComposer`] turns the levels into a
//!    [`stageflow::FlowNode`] tree of action stages
//! 5. **Execute**: the tree runs on the stageflow executor with retry,
//!    compensation and the configured strategy
//!
//! [`EntitlementService`] drives all five steps and keeps reports in a
//! [`FlowHistory`].
//!
//! ## Example
//!
//! ```ignore
//! use entitlement::{
//!     EntitlementConfig, EntitlementRequest, EntitlementService, Integrations, RequestType,
//! };
//!
//! let service = EntitlementService::new(config, catalog, entitlements, integrations, history)?;
//! let request =
//!     EntitlementRequest::new("req-1", "diku", RequestType::Entitle, ["app-platform-1.0.0"]);
//! let report = service.execute(&request)?;
//! println!("{}", report.status);
//! ```

pub mod composer;
pub mod config;
pub mod error;
pub mod history;
pub mod integrity;
pub mod interfaces;
pub mod resolver;
pub mod sequencer;
pub mod service;
pub mod stages;
pub mod transition;

// Re-export main types at crate root
pub use composer::{ExecutionMode, FlowComposer, IntegrationSettings, Integrations};
pub use config::{EntitlementConfig, ExecutionSettings, RetrySettings, ValidationSettings};
pub use error::{Error, ErrorKind, Result};
pub use history::{FlowHistory, InMemoryHistory};
pub use integrity::{IntegrityValidator, ValidationMode};
pub use interfaces::{InterfaceItem, IntegrityViolation, RequiredProvidedInterfaces};
pub use resolver::{DependencyResolver, DependencySet};
pub use sequencer::{
    ApplicationSequences, ModuleDescriptorHolder, ModuleKind, ModuleSequencer, ModulesSequence,
};
pub use service::{EntitlementService, PlannedRequest};
pub use stages::{Action, EventStage, ModuleStage, ResourceStage, RouteStage};
pub use transition::{
    ApplicationStateTransitionBucket, ApplicationStateTransitionPlan, EntitlementRequest,
    RequestType, TransitionType,
};
