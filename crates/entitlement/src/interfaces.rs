//! Required/provided interface sets and their merge algebra

use descriptor::{ApplicationDescriptor, InterfaceReference, is_interface_compatible};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// An interface reference together with the application that owns it
///
/// Two items are equal only when both the reference and the owner match,
/// so an interface provided by several applications stays representable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceItem {
    pub interface: InterfaceReference,
    pub application_id: String,
}

impl InterfaceItem {
    pub fn new(interface: InterfaceReference, application_id: impl Into<String>) -> Self {
        Self {
            interface,
            application_id: application_id.into(),
        }
    }
}

/// A required interface nobody in scope provides
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntegrityViolation {
    /// Application declaring the requirement
    pub application_id: String,
    pub interface: InterfaceReference,
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requires {}", self.application_id, self.interface)
    }
}

/// Required and provided interfaces of one or more applications
///
/// `merge` is set union on both fields, so it is associative and
/// commutative with [`RequiredProvidedInterfaces::default`] as identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredProvidedInterfaces {
    pub required: BTreeSet<InterfaceItem>,
    /// Provided items grouped by interface id
    pub provided: BTreeMap<String, BTreeSet<InterfaceItem>>,
}

impl RequiredProvidedInterfaces {
    /// Requirements and public interfaces of every module of the application
    pub fn of_application(app: &ApplicationDescriptor) -> Self {
        let app_id = app.id();
        let mut result = Self::provided_only(app);
        for module in app.all_modules() {
            for required in &module.requires {
                result
                    .required
                    .insert(InterfaceItem::new(required.clone(), app_id.clone()));
            }
        }
        result
    }

    /// Public interfaces of the application, without its requirements
    pub fn provided_only(app: &ApplicationDescriptor) -> Self {
        let app_id = app.id();
        let mut result = Self::default();
        for interface in app.all_modules().flat_map(|m| m.public_interfaces()) {
            result
                .provided
                .entry(interface.id.clone())
                .or_default()
                .insert(InterfaceItem::new(interface.reference(), app_id.clone()));
        }
        result
    }

    /// Union of two sets
    pub fn merge(mut self, other: Self) -> Self {
        self.merge_from(other);
        self
    }

    /// In-place union
    pub fn merge_from(&mut self, other: Self) {
        self.required.extend(other.required);
        for (id, items) in other.provided {
            self.provided.entry(id).or_default().extend(items);
        }
    }

    /// Whether a compatible provider exists for the reference
    pub fn is_provided(&self, required: &InterfaceReference) -> bool {
        self.provided.get(&required.id).is_some_and(|items| {
            items
                .iter()
                .any(|item| is_interface_compatible(&required.version, &item.interface.version))
        })
    }

    /// One violation per required item without a compatible provider
    pub fn unmet(&self) -> Vec<IntegrityViolation> {
        self.required
            .iter()
            .filter(|item| !self.is_provided(&item.interface))
            .map(|item| IntegrityViolation {
                application_id: item.application_id.clone(),
                interface: item.interface.clone(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.provided.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use descriptor::ModuleDescriptor;

    fn app(name: &str, module: ModuleDescriptor) -> ApplicationDescriptor {
        ApplicationDescriptor::new(name, "1.0.0").with_module(module)
    }

    fn sample() -> (
        RequiredProvidedInterfaces,
        RequiredProvidedInterfaces,
        RequiredProvidedInterfaces,
    ) {
        let a = RequiredProvidedInterfaces::of_application(&app(
            "app-a",
            ModuleDescriptor::new("mod-a", "1.0.0")
                .requiring("foo", "1.0")
                .providing("bar", "2.0"),
        ));
        let b = RequiredProvidedInterfaces::of_application(&app(
            "app-b",
            ModuleDescriptor::new("mod-b", "1.0.0").providing("foo", "1.1"),
        ));
        let c = RequiredProvidedInterfaces::of_application(&app(
            "app-c",
            ModuleDescriptor::new("mod-c", "1.0.0")
                .requiring("bar", "2.0")
                .providing("foo", "1.0"),
        ));
        (a, b, c)
    }

    #[test]
    fn test_merge_is_commutative() {
        let (a, b, _) = sample();
        assert_eq!(a.clone().merge(b.clone()), b.merge(a));
    }

    #[test]
    fn test_merge_is_associative() {
        let (a, b, c) = sample();
        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.merge(b.merge(c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_merge_identity() {
        let (a, _, _) = sample();
        assert_eq!(RequiredProvidedInterfaces::default().merge(a.clone()), a);
        assert_eq!(a.clone().merge(RequiredProvidedInterfaces::default()), a);
    }

    #[test]
    fn test_provided_by_multiple_applications() {
        let (_, b, c) = sample();
        let merged = b.merge(c);
        assert_eq!(merged.provided["foo"].len(), 2);
    }

    #[test]
    fn test_unmet() {
        let (a, b, _) = sample();
        let violations = a.clone().unmet();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].to_string(), "app-a-1.0.0 requires foo 1.0");
        assert!(a.merge(b).unmet().is_empty());
    }

    #[test]
    fn test_system_interfaces_not_provided() {
        let module = ModuleDescriptor::new("mod-a", "1.0.0").providing_interface(
            descriptor::InterfaceDescriptor::new("_tenant", "2.0").system(),
        );
        let result = RequiredProvidedInterfaces::provided_only(&app("app-a", module));
        assert!(result.is_empty());
    }
}
