//! In-memory descriptor catalog and entitlement store

use crate::error::{Error, Result};
use crate::ports::{DescriptorSource, EntitlementSource};
use crate::types::DescriptorFilter;
use descriptor::{ApplicationDescriptor, Version};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Descriptor catalog held in memory, keyed by application id
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    descriptors: BTreeMap<String, ApplicationDescriptor>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from descriptors; later duplicates replace earlier ones
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ApplicationDescriptor>) -> Self {
        let mut catalog = Self::new();
        for descriptor in descriptors {
            catalog.insert(descriptor);
        }
        catalog
    }

    /// Parse a JSON array of descriptors
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptors: Vec<ApplicationDescriptor> = serde_json::from_str(json)?;
        Ok(Self::from_descriptors(descriptors))
    }

    pub fn insert(&mut self, descriptor: ApplicationDescriptor) {
        let id = descriptor.id();
        if self.descriptors.insert(id.clone(), descriptor).is_some() {
            log::debug!("Replaced descriptor {id}");
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApplicationDescriptor> {
        self.descriptors.values()
    }

    /// Highest version of an application matching the filter
    pub fn latest(&self, filter: &DescriptorFilter) -> Option<&ApplicationDescriptor> {
        self.descriptors
            .values()
            .filter(|d| filter.matches(d))
            .filter_map(|d| Version::parse(&d.version).ok().map(|v| (v, d)))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, d)| d)
    }
}

impl DescriptorSource for InMemoryCatalog {
    fn get_application_descriptor(&self, id: &str) -> Result<ApplicationDescriptor> {
        self.descriptors
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                what: format!("application descriptor {id}"),
            })
    }

    fn query_descriptors(&self, filter: &DescriptorFilter) -> Result<Vec<ApplicationDescriptor>> {
        Ok(self
            .descriptors
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }
}

/// Tenant entitlements held in memory
#[derive(Debug, Default)]
pub struct InMemoryEntitlements {
    tenants: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BTreeSet<String>>> {
        self.tenants.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn entitle(&self, tenant: &str, application_id: impl Into<String>) {
        self.lock()
            .entry(tenant.to_string())
            .or_default()
            .insert(application_id.into());
    }

    pub fn revoke(&self, tenant: &str, application_id: &str) -> bool {
        self.lock()
            .get_mut(tenant)
            .is_some_and(|apps| apps.remove(application_id))
    }
}

impl EntitlementSource for InMemoryEntitlements {
    fn find_entitled_applications(&self, tenant: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .get(tenant)
            .map(|apps| apps.iter().cloned().collect())
            .unwrap_or_default())
    }
}
