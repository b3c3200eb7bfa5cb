//! Dependency resolver - transitive closure of application dependencies

use crate::error::{Error, Result};
use descriptor::ApplicationDescriptor;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Transitive dependencies of an application, keyed by application name
pub type DependencySet = BTreeMap<String, Arc<ApplicationDescriptor>>;

/// Resolves dependency closures over a fixed set of descriptors
///
/// Dependencies are followed by application name; each name maps to the one
/// concrete descriptor visible to the request. Closures are memoized for the
/// lifetime of the resolver, which is one planning pass.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    descriptors: HashMap<String, Arc<ApplicationDescriptor>>,
    cache: HashMap<String, Arc<DependencySet>>,
}

struct Frame {
    name: String,
    dependencies: Vec<String>,
    next: usize,
}

impl DependencyResolver {
    /// Create a resolver; a later descriptor replaces an earlier one with the same name
    pub fn new(descriptors: impl IntoIterator<Item = Arc<ApplicationDescriptor>>) -> Self {
        let descriptors = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self {
            descriptors,
            cache: HashMap::new(),
        }
    }

    pub fn descriptor(&self, name: &str) -> Option<&Arc<ApplicationDescriptor>> {
        self.descriptors.get(name)
    }

    fn frame(&self, name: &str) -> Frame {
        let dependencies = self
            .descriptors
            .get(name)
            .map(|d| d.dependencies.iter().map(|dep| dep.name.clone()).collect())
            .unwrap_or_default();
        Frame {
            name: name.to_string(),
            dependencies,
            next: 0,
        }
    }

    /// Transitive dependencies of the named application
    ///
    /// Walks the graph depth first with an explicit stack. Fails on the
    /// first cycle with the cycle's chain, or on a dependency without a
    /// descriptor. A repeated call returns the cached closure.
    pub fn resolve(&mut self, name: &str) -> Result<Arc<DependencySet>> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(Arc::clone(cached));
        }
        if !self.descriptors.contains_key(name) {
            return Err(Error::DescriptorNotFound { id: name.to_string() });
        }

        let mut stack = vec![self.frame(name)];
        let mut on_path: HashSet<String> = HashSet::from([name.to_string()]);

        while let Some(frame) = stack.last_mut() {
            if frame.next < frame.dependencies.len() {
                let dependency = frame.dependencies[frame.next].clone();
                frame.next += 1;

                if self.cache.contains_key(&dependency) {
                    continue;
                }
                if on_path.contains(&dependency) {
                    let start = stack
                        .iter()
                        .position(|f| f.name == dependency)
                        .unwrap_or(0);
                    let mut chain: Vec<&str> =
                        stack[start..].iter().map(|f| f.name.as_str()).collect();
                    chain.push(dependency.as_str());
                    return Err(Error::CircularDependency {
                        chain: chain.join(" <- "),
                    });
                }
                if !self.descriptors.contains_key(&dependency) {
                    return Err(Error::DependencyNotFound {
                        name: dependency,
                        required_by: frame.name.clone(),
                    });
                }

                on_path.insert(dependency.clone());
                let next = self.frame(&dependency);
                stack.push(next);
            } else {
                let Some(done) = stack.pop() else { break };
                on_path.remove(&done.name);

                let mut closure = DependencySet::new();
                for dependency in &done.dependencies {
                    if let Some(descriptor) = self.descriptors.get(dependency) {
                        closure.insert(dependency.clone(), Arc::clone(descriptor));
                    }
                    if let Some(transitive) = self.cache.get(dependency) {
                        closure.extend(transitive.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
                    }
                }
                log::debug!("Resolved {} dependencies for {}", closure.len(), done.name);
                self.cache.insert(done.name, Arc::new(closure));
            }
        }

        self.cache
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Invariant(format!("closure of {name} missing after resolution")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str, deps: &[&str]) -> Arc<ApplicationDescriptor> {
        let mut descriptor = ApplicationDescriptor::new(name, "1.0.0");
        for dep in deps {
            descriptor = descriptor.with_dependency(*dep, "^1.0.0");
        }
        Arc::new(descriptor)
    }

    #[test]
    fn test_closure() {
        let mut resolver = DependencyResolver::new([
            app("a", &["b", "c"]),
            app("b", &["d"]),
            app("c", &[]),
            app("d", &[]),
        ]);

        let closure = resolver.resolve("a").unwrap();
        let names: Vec<&str> = closure.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_repeated_resolve_hits_cache() {
        let mut resolver = DependencyResolver::new([app("a", &["b"]), app("b", &[])]);
        let first = resolver.resolve("a").unwrap();
        let second = resolver.resolve("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_cycle_names_chain() {
        let mut resolver = DependencyResolver::new([
            app("a", &["b"]),
            app("b", &["c"]),
            app("c", &["a"]),
        ]);

        match resolver.resolve("a") {
            Err(Error::CircularDependency { chain }) => assert_eq!(chain, "a <- b <- c <- a"),
            other => panic!("expected circular dependency, got {other:?}"),
        }
    }

    #[test]
    fn test_long_cycle_does_not_overflow() {
        let count = 50_000;
        let names: Vec<String> = (0..count).map(|i| format!("app-{i}")).collect();
        let descriptors = names.iter().enumerate().map(|(i, name)| {
            let next = &names[(i + 1) % count];
            Arc::new(
                ApplicationDescriptor::new(name.as_str(), "1.0.0")
                    .with_dependency(next.as_str(), "*"),
            )
        });
        let mut resolver = DependencyResolver::new(descriptors);

        match resolver.resolve("app-0") {
            Err(Error::CircularDependency { chain }) => {
                assert!(chain.starts_with("app-0 <- app-1 <- "));
                assert!(chain.ends_with(" <- app-0"));
            }
            other => panic!("expected circular dependency, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let mut resolver = DependencyResolver::new([app("a", &["b"])]);
        match resolver.resolve("a") {
            Err(Error::DependencyNotFound { name, required_by }) => {
                assert_eq!(name, "b");
                assert_eq!(required_by, "a");
            }
            other => panic!("expected missing dependency, got {other:?}"),
        }
        assert!(matches!(
            resolver.resolve("zzz"),
            Err(Error::DescriptorNotFound { .. })
        ));
    }

    #[test]
    fn test_diamond_shares_closure() {
        let mut resolver = DependencyResolver::new([
            app("a", &["b", "c"]),
            app("b", &["d"]),
            app("c", &["d"]),
            app("d", &[]),
        ]);
        assert_eq!(resolver.resolve("a").unwrap().len(), 3);
        assert_eq!(resolver.resolve("c").unwrap().len(), 1);
    }
}
