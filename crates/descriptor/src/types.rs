//! Descriptor types for applications, modules and interfaces

use serde::{Deserialize, Serialize};

/// Interface type reserved for internal platform wiring
pub const SYSTEM_INTERFACE_TYPE: &str = "system";

/// A named, versioned bundle of modules entitled to a tenant as a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Backend modules, in declaration order
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
    /// UI modules, sequenced separately from backend modules
    #[serde(default)]
    pub ui_modules: Vec<ModuleDescriptor>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl ApplicationDescriptor {
    /// Create an application with no modules or dependencies
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            modules: Vec::new(),
            ui_modules: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Application id (`<name>-<version>`)
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Add a backend module
    pub fn with_module(mut self, module: ModuleDescriptor) -> Self {
        self.modules.push(module);
        self
    }

    /// Add a UI module
    pub fn with_ui_module(mut self, module: ModuleDescriptor) -> Self {
        self.ui_modules.push(module);
        self
    }

    /// Add a dependency on another application
    pub fn with_dependency(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.dependencies.push(Dependency {
            name: name.into(),
            version: version.into(),
        });
        self
    }

    /// Backend and UI modules together
    pub fn all_modules(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.iter().chain(self.ui_modules.iter())
    }

    /// Check whether this application declares a dependency on `name`
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d.name == name)
    }
}

/// A named, versioned deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub provides: Vec<InterfaceDescriptor>,
    #[serde(default)]
    pub requires: Vec<InterfaceReference>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            provides: Vec::new(),
            requires: Vec::new(),
        }
    }

    /// Module id (`<name>-<version>`)
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Declare a provided interface without handlers
    pub fn providing(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.provides.push(InterfaceDescriptor::new(id, version));
        self
    }

    /// Declare a provided interface with full detail
    pub fn providing_interface(mut self, interface: InterfaceDescriptor) -> Self {
        self.provides.push(interface);
        self
    }

    /// Declare a required interface
    pub fn requiring(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.requires.push(InterfaceReference {
            id: id.into(),
            version: version.into(),
        });
        self
    }

    /// Provided interfaces that take part in integrity checks
    pub fn public_interfaces(&self) -> impl Iterator<Item = &InterfaceDescriptor> {
        self.provides.iter().filter(|i| !i.is_system())
    }
}

/// An interface a module provides
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDescriptor {
    pub id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_type: Option<String>,
    #[serde(default)]
    pub handlers: Vec<RoutingEntry>,
}

impl InterfaceDescriptor {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            interface_type: None,
            handlers: Vec::new(),
        }
    }

    /// Mark the interface as system (internal wiring)
    pub fn system(mut self) -> Self {
        self.interface_type = Some(SYSTEM_INTERFACE_TYPE.to_string());
        self
    }

    /// Add a routing entry
    pub fn with_handler(mut self, handler: RoutingEntry) -> Self {
        self.handlers.push(handler);
        self
    }

    /// System interfaces are excluded from integrity checks
    pub fn is_system(&self) -> bool {
        self.interface_type.as_deref() == Some(SYSTEM_INTERFACE_TYPE)
    }

    /// Reference to this interface at its provided version
    pub fn reference(&self) -> InterfaceReference {
        InterfaceReference {
            id: self.id.clone(),
            version: self.version.clone(),
        }
    }
}

/// An HTTP endpoint exposed through an interface
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingEntry {
    #[serde(default)]
    pub methods: Vec<String>,
    pub path_pattern: String,
    #[serde(default)]
    pub permissions_required: Vec<String>,
}

impl RoutingEntry {
    pub fn new(methods: &[&str], path_pattern: impl Into<String>) -> Self {
        Self {
            methods: methods.iter().map(|m| (*m).to_string()).collect(),
            path_pattern: path_pattern.into(),
            permissions_required: Vec::new(),
        }
    }

    /// Require a permission for this endpoint
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions_required.push(permission.into());
        self
    }
}

/// A reference to an interface by id and version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceReference {
    pub id: String,
    pub version: String,
}

impl InterfaceReference {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for InterfaceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// A dependency on another application, by name and version range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}
