//! # Descriptor
//!
//! Data model for platform applications and the modules they bundle.
//!
//! - [`ApplicationDescriptor`]: a versioned bundle of backend and UI modules
//!   plus dependencies on other applications
//! - [`ModuleDescriptor`]: a deployable unit that provides and requires
//!   interfaces
//! - [`Version`] / [`VersionRange`]: semantic versions and npm-style ranges
//!   used for applications and modules
//! - [`is_interface_compatible`]: the `major.minor` compatibility rule used
//!   to match required interfaces against provided ones
//!
//! Descriptors deserialize from the camelCase JSON produced by the
//! application registry.

mod error;
mod types;
mod version;

pub use error::{Error, Result};
pub use types::{
    ApplicationDescriptor, Dependency, InterfaceDescriptor, InterfaceReference,
    ModuleDescriptor, RoutingEntry, SYSTEM_INTERFACE_TYPE,
};
pub use version::{
    InterfaceVersion, Version, VersionRange, is_interface_compatible, name_of, parse_id,
};
