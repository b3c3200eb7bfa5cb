//! Module sequencer - orders modules into dependency levels

use crate::error::{Error, Result};
use crate::transition::TransitionType;
use descriptor::{ApplicationDescriptor, ModuleDescriptor};
use std::collections::{BTreeMap, BTreeSet};

/// Backend or UI module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Backend,
    Ui,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "modules",
            Self::Ui => "ui-modules",
        }
    }
}

/// A target module paired with its installed counterpart
///
/// A missing target is a pure removal, a missing installed module a pure
/// addition. At least one side is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptorHolder {
    pairing: Pairing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pairing {
    Added(ModuleDescriptor),
    Changed {
        module: ModuleDescriptor,
        installed: ModuleDescriptor,
    },
    Removed(ModuleDescriptor),
}

impl ModuleDescriptorHolder {
    pub fn new(
        module: Option<ModuleDescriptor>,
        installed: Option<ModuleDescriptor>,
    ) -> Result<Self> {
        let pairing = match (module, installed) {
            (None, None) => {
                return Err(Error::Invariant(
                    "module holder needs a target or an installed module".to_string(),
                ));
            }
            (Some(module), Some(installed)) if module.name != installed.name => {
                return Err(Error::Invariant(format!(
                    "module holder pairs different modules: {} and {}",
                    module.id(),
                    installed.id()
                )));
            }
            (Some(module), Some(installed)) => Pairing::Changed { module, installed },
            (Some(module), None) => Pairing::Added(module),
            (None, Some(installed)) => Pairing::Removed(installed),
        };
        Ok(Self { pairing })
    }

    pub fn module(&self) -> Option<&ModuleDescriptor> {
        match &self.pairing {
            Pairing::Added(module) | Pairing::Changed { module, .. } => Some(module),
            Pairing::Removed(_) => None,
        }
    }

    pub fn installed(&self) -> Option<&ModuleDescriptor> {
        match &self.pairing {
            Pairing::Changed { installed, .. } | Pairing::Removed(installed) => Some(installed),
            Pairing::Added(_) => None,
        }
    }

    /// The target module, or the installed one for removals
    pub fn current(&self) -> &ModuleDescriptor {
        match &self.pairing {
            Pairing::Added(module) | Pairing::Changed { module, .. } | Pairing::Removed(module) => {
                module
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.current().name
    }

    /// True unless both sides exist with identical versions
    pub fn is_version_changed(&self) -> bool {
        match &self.pairing {
            Pairing::Changed { module, installed } => module.version != installed.version,
            _ => true,
        }
    }

    pub fn is_addition(&self) -> bool {
        matches!(self.pairing, Pairing::Added(_))
    }

    pub fn is_removal(&self) -> bool {
        matches!(self.pairing, Pairing::Removed(_))
    }
}

/// Execution order of an application's modules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModulesSequence {
    /// Modules being added or changed, level by level
    pub levels: Vec<Vec<ModuleDescriptorHolder>>,
    /// Modules being removed, scheduled after all live levels
    pub deprecated_levels: Vec<Vec<ModuleDescriptor>>,
}

impl ModulesSequence {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty() && self.deprecated_levels.is_empty()
    }

    pub fn module_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum::<usize>()
            + self.deprecated_levels.iter().map(Vec::len).sum::<usize>()
    }
}

/// Sequenced modules of one application in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationSequences {
    pub application_id: String,
    pub name: String,
    /// Names of applications this one depends on
    pub dependencies: Vec<String>,
    pub transition: TransitionType,
    pub modules: ModulesSequence,
    pub ui_modules: ModulesSequence,
}

impl ApplicationSequences {
    pub fn sequence(&self, kind: ModuleKind) -> &ModulesSequence {
        match kind {
            ModuleKind::Backend => &self.modules,
            ModuleKind::Ui => &self.ui_modules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.ui_modules.is_empty()
    }
}

/// Orders modules by their interface dependencies
pub struct ModuleSequencer;

impl ModuleSequencer {
    /// Pair target modules with installed ones by name
    ///
    /// Returns the holders for every target module and the installed
    /// modules that have no target (deprecated).
    pub fn join(
        modules: &[ModuleDescriptor],
        installed: &[ModuleDescriptor],
    ) -> Result<(Vec<ModuleDescriptorHolder>, Vec<ModuleDescriptor>)> {
        let mut installed_by_name: BTreeMap<&str, &ModuleDescriptor> =
            installed.iter().map(|m| (m.name.as_str(), m)).collect();

        let holders = modules
            .iter()
            .map(|module| {
                let previous = installed_by_name.remove(module.name.as_str()).cloned();
                ModuleDescriptorHolder::new(Some(module.clone()), previous)
            })
            .collect::<Result<Vec<_>>>()?;

        let deprecated = installed_by_name.into_values().cloned().collect();
        Ok((holders, deprecated))
    }

    /// Sequence target modules against installed ones
    ///
    /// Live levels come from the target graph with unchanged modules
    /// dropped; deprecated levels from the installed graph. With
    /// `reverse_deprecated` dependents are removed before their
    /// dependencies.
    pub fn sequence(
        modules: &[ModuleDescriptor],
        installed: &[ModuleDescriptor],
        reverse_deprecated: bool,
    ) -> Result<ModulesSequence> {
        let (holders, deprecated) = Self::join(modules, installed)?;

        let levels: Vec<Vec<ModuleDescriptorHolder>> =
            dependency_levels(holders, |h| h.name().to_string(), |a, b| {
                module_depends_on(a.current(), b.current())
            })
            .into_iter()
            .map(|level| {
                level
                    .into_iter()
                    .filter(ModuleDescriptorHolder::is_version_changed)
                    .collect::<Vec<_>>()
            })
            .filter(|level| !level.is_empty())
            .collect();

        let mut deprecated_levels =
            dependency_levels(deprecated, |m| m.name.clone(), module_depends_on);
        if reverse_deprecated {
            deprecated_levels.reverse();
        }

        Ok(ModulesSequence {
            levels,
            deprecated_levels,
        })
    }

    /// Sequence both module kinds of an application
    pub fn sequence_application(
        transition: TransitionType,
        target: Option<&ApplicationDescriptor>,
        installed: Option<&ApplicationDescriptor>,
    ) -> Result<ApplicationSequences> {
        let app = target.or(installed).ok_or_else(|| {
            Error::Invariant(
                "application sequence needs a target or an installed descriptor".to_string(),
            )
        })?;
        let reverse = transition == TransitionType::Revoke;
        let modules_of = |d: Option<&ApplicationDescriptor>, kind: ModuleKind| {
            d.map_or_else(Vec::new, |d| match kind {
                ModuleKind::Backend => d.modules.clone(),
                ModuleKind::Ui => d.ui_modules.clone(),
            })
        };

        let modules = Self::sequence(
            &modules_of(target, ModuleKind::Backend),
            &modules_of(installed, ModuleKind::Backend),
            reverse,
        )?;
        let ui_modules = Self::sequence(
            &modules_of(target, ModuleKind::Ui),
            &modules_of(installed, ModuleKind::Ui),
            reverse,
        )?;

        log::debug!(
            "Sequenced {} ({transition}): {} module levels, {} UI levels",
            app.id(),
            modules.levels.len() + modules.deprecated_levels.len(),
            ui_modules.levels.len() + ui_modules.deprecated_levels.len()
        );

        Ok(ApplicationSequences {
            application_id: app.id(),
            name: app.name.clone(),
            dependencies: app.dependencies.iter().map(|d| d.name.clone()).collect(),
            transition,
            modules,
            ui_modules,
        })
    }
}

/// Whether `module` requires an interface `other` provides
fn module_depends_on(module: &ModuleDescriptor, other: &ModuleDescriptor) -> bool {
    module.name != other.name
        && module
            .requires
            .iter()
            .any(|required| other.public_interfaces().any(|p| p.id == required.id))
}

/// Group items into levels where each item only depends on earlier levels
///
/// Items are ordered by key first so the result does not depend on input
/// order. Dependencies on items outside the set are ignored. Items left in
/// a cycle are appended as a final level.
pub(crate) fn dependency_levels<T, K, D>(items: Vec<T>, key: K, depends_on: D) -> Vec<Vec<T>>
where
    K: Fn(&T) -> String,
    D: Fn(&T, &T) -> bool,
{
    let mut remaining: Vec<(String, T)> =
        items.into_iter().map(|item| (key(&item), item)).collect();
    remaining.sort_by(|a, b| a.0.cmp(&b.0));

    let mut levels = Vec::new();
    let mut placed: BTreeSet<String> = BTreeSet::new();

    while !remaining.is_empty() {
        let ready: Vec<bool> = remaining
            .iter()
            .map(|(_, item)| {
                remaining
                    .iter()
                    .filter(|(_, other)| depends_on(item, other))
                    .all(|(other_key, _)| placed.contains(other_key))
            })
            .collect();

        if !ready.iter().any(|r| *r) {
            let keys: Vec<&str> = remaining.iter().map(|(k, _)| k.as_str()).collect();
            log::warn!("Dependency cycle between {}, ordering by name", keys.join(", "));
            levels.push(remaining.into_iter().map(|(_, item)| item).collect());
            break;
        }

        let mut level = Vec::new();
        let mut rest = Vec::new();
        for ((key, item), ready) in remaining.into_iter().zip(ready) {
            if ready {
                level.push((key, item));
            } else {
                rest.push((key, item));
            }
        }
        placed.extend(level.iter().map(|(k, _)| k.clone()));
        levels.push(level.into_iter().map(|(_, item)| item).collect());
        remaining = rest;
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ModuleDescriptor {
        ModuleDescriptor::new("mod-b", "1.0.0").providing("x", "1.0")
    }

    fn consumer() -> ModuleDescriptor {
        ModuleDescriptor::new("mod-a", "1.0.0").requiring("x", "1.0")
    }

    fn level_names(sequence: &ModulesSequence) -> Vec<Vec<String>> {
        sequence
            .levels
            .iter()
            .map(|level| level.iter().map(|h| h.name().to_string()).collect())
            .collect()
    }

    #[test]
    fn test_holder_requires_one_side() {
        assert!(matches!(
            ModuleDescriptorHolder::new(None, None),
            Err(Error::Invariant(_))
        ));
        assert!(ModuleDescriptorHolder::new(Some(provider()), Some(consumer())).is_err());
    }

    #[test]
    fn test_is_version_changed() {
        let same = ModuleDescriptorHolder::new(Some(provider()), Some(provider())).unwrap();
        assert!(!same.is_version_changed());
        let newer = ModuleDescriptor::new("mod-b", "1.1.0");
        let changed = ModuleDescriptorHolder::new(Some(newer), Some(provider())).unwrap();
        assert!(changed.is_version_changed());
        let removal = ModuleDescriptorHolder::new(None, Some(provider())).unwrap();
        assert!(removal.is_version_changed());
        assert!(removal.is_removal());
    }

    #[test]
    fn test_provider_before_consumer_for_any_input_order() {
        let extra = ModuleDescriptor::new("mod-c", "1.0.0");
        let orders = [
            vec![consumer(), provider(), extra.clone()],
            vec![provider(), extra.clone(), consumer()],
            vec![extra.clone(), consumer(), provider()],
            vec![extra, provider(), consumer()],
        ];

        let expected = vec![
            vec!["mod-b".to_string(), "mod-c".to_string()],
            vec!["mod-a".to_string()],
        ];
        for modules in orders {
            let sequence = ModuleSequencer::sequence(&modules, &[], false).unwrap();
            assert_eq!(level_names(&sequence), expected);
        }
    }

    #[test]
    fn test_external_requirement_is_level_zero() {
        let sequence = ModuleSequencer::sequence(&[consumer()], &[], false).unwrap();
        assert_eq!(level_names(&sequence), vec![vec!["mod-a".to_string()]]);
    }

    #[test]
    fn test_unchanged_modules_dropped() {
        let modules = vec![
            provider(),
            ModuleDescriptor::new("mod-a", "2.0.0").requiring("x", "1.0"),
        ];
        let installed = vec![provider(), consumer()];
        let sequence = ModuleSequencer::sequence(&modules, &installed, false).unwrap();
        assert_eq!(level_names(&sequence), vec![vec!["mod-a".to_string()]]);
        let holder = &sequence.levels[0][0];
        assert_eq!(holder.installed().unwrap().version, "1.0.0");
        assert!(sequence.deprecated_levels.is_empty());
    }

    #[test]
    fn test_deprecated_levels() {
        let installed = vec![consumer(), provider()];
        let forward = ModuleSequencer::sequence(&[], &installed, false).unwrap();
        assert!(forward.levels.is_empty());
        let names: Vec<&str> =
            forward.deprecated_levels.iter().map(|l| l[0].name.as_str()).collect();
        assert_eq!(names, vec!["mod-b", "mod-a"]);

        let reversed = ModuleSequencer::sequence(&[], &installed, true).unwrap();
        let names: Vec<&str> =
            reversed.deprecated_levels.iter().map(|l| l[0].name.as_str()).collect();
        assert_eq!(names, vec!["mod-a", "mod-b"]);
    }

    #[test]
    fn test_cycle_becomes_final_level() {
        let a = ModuleDescriptor::new("mod-a", "1.0.0").requiring("y", "1.0").providing("x", "1.0");
        let b = ModuleDescriptor::new("mod-b", "1.0.0").requiring("x", "1.0").providing("y", "1.0");
        let c = ModuleDescriptor::new("mod-c", "1.0.0");
        let sequence = ModuleSequencer::sequence(&[a, b, c], &[], false).unwrap();
        assert_eq!(
            level_names(&sequence),
            vec![vec!["mod-c".to_string()], vec!["mod-a".to_string(), "mod-b".to_string()]]
        );
    }

    #[test]
    fn test_sequence_application_for_upgrade() {
        let old = ApplicationDescriptor::new("app", "1.0.0")
            .with_module(provider())
            .with_module(ModuleDescriptor::new("mod-old", "1.0.0"))
            .with_ui_module(ModuleDescriptor::new("folio_app", "1.0.0"));
        let new = ApplicationDescriptor::new("app", "2.0.0")
            .with_module(ModuleDescriptor::new("mod-b", "1.1.0").providing("x", "1.0"))
            .with_module(consumer())
            .with_ui_module(ModuleDescriptor::new("folio_app", "1.0.0"));

        let sequences =
            ModuleSequencer::sequence_application(TransitionType::Upgrade, Some(&new), Some(&old))
                .unwrap();

        assert_eq!(sequences.application_id, "app-2.0.0");
        assert_eq!(
            level_names(&sequences.modules),
            vec![vec!["mod-b".to_string()], vec!["mod-a".to_string()]]
        );
        assert_eq!(sequences.modules.deprecated_levels[0][0].name, "mod-old");
        assert!(sequences.ui_modules.is_empty());
    }
}
