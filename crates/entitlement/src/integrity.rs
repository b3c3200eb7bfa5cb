//! Interface integrity validation
//!
//! Checks that every interface required by the applications being
//! entitled or upgraded has a compatible provider in scope.

use crate::error::Result;
use crate::interfaces::{IntegrityViolation, RequiredProvidedInterfaces};
use crate::resolver::DependencyResolver;
use descriptor::ApplicationDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// How interfaces are collected for validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMode {
    /// Per target: own requirements against own and dependency interfaces
    #[default]
    Scoped,
    /// All descriptors in scope pooled together
    Combined,
}

/// Validator for required/provided interfaces
#[derive(Debug, Clone, Default)]
pub struct IntegrityValidator {
    mode: ValidationMode,
    exclude_entitled_requirements: bool,
}

impl IntegrityValidator {
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            exclude_entitled_requirements: false,
        }
    }

    /// Skip requirements of targets that are already entitled as is
    pub fn with_exclude_entitled_requirements(mut self, exclude: bool) -> Self {
        self.exclude_entitled_requirements = exclude;
        self
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Collect violations for the target applications
    ///
    /// `visible` holds every descriptor dependencies may resolve to (the
    /// tenant's state after the request); `entitled` the ids entitled
    /// before it. Cycles and missing dependencies are errors; unmet
    /// interfaces are returned, sorted, one per missing requirement.
    pub fn validate(
        &self,
        targets: &[Arc<ApplicationDescriptor>],
        visible: &[Arc<ApplicationDescriptor>],
        entitled: &BTreeSet<String>,
    ) -> Result<Vec<IntegrityViolation>> {
        let mut violations = match self.mode {
            ValidationMode::Scoped => self.validate_scoped(targets, visible, entitled)?,
            ValidationMode::Combined => self.validate_combined(targets, visible, entitled)?,
        };
        violations.sort();
        violations.dedup();

        log::debug!(
            "Validated {} applications ({:?}): {} violations",
            targets.len(),
            self.mode,
            violations.len()
        );
        Ok(violations)
    }

    fn own_interfaces(
        &self,
        app: &ApplicationDescriptor,
        entitled: &BTreeSet<String>,
    ) -> RequiredProvidedInterfaces {
        if self.exclude_entitled_requirements && entitled.contains(&app.id()) {
            RequiredProvidedInterfaces::provided_only(app)
        } else {
            RequiredProvidedInterfaces::of_application(app)
        }
    }

    fn validate_scoped(
        &self,
        targets: &[Arc<ApplicationDescriptor>],
        visible: &[Arc<ApplicationDescriptor>],
        entitled: &BTreeSet<String>,
    ) -> Result<Vec<IntegrityViolation>> {
        let mut resolver =
            DependencyResolver::new(visible.iter().chain(targets.iter()).map(Arc::clone));

        let mut violations = Vec::new();
        for target in targets {
            let closure = resolver.resolve(&target.name)?;
            let interfaces = closure.values().fold(
                self.own_interfaces(target, entitled),
                |acc, dependency| acc.merge(RequiredProvidedInterfaces::provided_only(dependency)),
            );
            violations.extend(interfaces.unmet());
        }
        Ok(violations)
    }

    fn validate_combined(
        &self,
        targets: &[Arc<ApplicationDescriptor>],
        visible: &[Arc<ApplicationDescriptor>],
        entitled: &BTreeSet<String>,
    ) -> Result<Vec<IntegrityViolation>> {
        // Check for cycles and missing dependencies first
        let mut resolver =
            DependencyResolver::new(visible.iter().chain(targets.iter()).map(Arc::clone));
        for target in targets {
            resolver.resolve(&target.name)?;
        }

        let all: BTreeMap<String, &Arc<ApplicationDescriptor>> = visible
            .iter()
            .chain(targets.iter())
            .map(|d| (d.id(), d))
            .collect();

        let interfaces = all
            .values()
            .map(|app| self.own_interfaces(app, entitled))
            .fold(RequiredProvidedInterfaces::default(), RequiredProvidedInterfaces::merge);
        Ok(interfaces.unmet())
    }
}
