//! Application state transitions - which applications are entitled,
//! upgraded or revoked by a request

use crate::error::{Error, Result};
use descriptor::{Version, parse_id};
use serde::{Deserialize, Serialize};
use stageflow::ExecutionStrategy;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Kind of request made by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// Add applications that are not entitled yet
    Entitle,
    /// Move entitled applications to newer versions
    Upgrade,
    /// Remove entitled applications
    Revoke,
    /// Converge on the requested set of applications
    State,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entitle => "entitle",
            Self::Upgrade => "upgrade",
            Self::Revoke => "revoke",
            Self::State => "state",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "entitle" => Ok(Self::Entitle),
            "upgrade" => Ok(Self::Upgrade),
            "revoke" => Ok(Self::Revoke),
            "state" => Ok(Self::State),
            other => Err(Error::InvalidRequest(format!("unknown request type: {other}"))),
        }
    }
}

/// What happens to one application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    Entitle,
    Upgrade,
    Revoke,
}

impl TransitionType {
    pub const ALL: [TransitionType; 3] = [Self::Entitle, Self::Upgrade, Self::Revoke];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entitle => "entitle",
            Self::Upgrade => "upgrade",
            Self::Revoke => "revoke",
        }
    }
}

impl fmt::Display for TransitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to change a tenant's entitlements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementRequest {
    pub request_id: String,
    pub tenant: String,
    pub request_type: RequestType,
    pub application_ids: Vec<String>,
    /// Overrides the configured strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ExecutionStrategy>,
}

impl EntitlementRequest {
    pub fn new<I, S>(
        request_id: impl Into<String>,
        tenant: impl Into<String>,
        request_type: RequestType,
        application_ids: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            request_id: request_id.into(),
            tenant: tenant.into(),
            request_type,
            application_ids: application_ids.into_iter().map(Into::into).collect(),
            strategy: None,
        }
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Applications undergoing the same transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStateTransitionBucket {
    pub transition: TransitionType,
    pub application_ids: BTreeSet<String>,
}

impl ApplicationStateTransitionBucket {
    fn new(transition: TransitionType) -> Self {
        Self {
            transition,
            application_ids: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.application_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.application_ids.len()
    }
}

/// Partition of a request into entitle, upgrade and revoke buckets
///
/// Every application id lands in at most one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStateTransitionPlan {
    pub entitle: ApplicationStateTransitionBucket,
    pub upgrade: ApplicationStateTransitionBucket,
    pub revoke: ApplicationStateTransitionBucket,
    /// Upgrade target id to the currently entitled id it replaces
    pub upgrade_from: BTreeMap<String, String>,
}

impl Default for ApplicationStateTransitionPlan {
    fn default() -> Self {
        Self {
            entitle: ApplicationStateTransitionBucket::new(TransitionType::Entitle),
            upgrade: ApplicationStateTransitionBucket::new(TransitionType::Upgrade),
            revoke: ApplicationStateTransitionBucket::new(TransitionType::Revoke),
            upgrade_from: BTreeMap::new(),
        }
    }
}

impl ApplicationStateTransitionPlan {
    /// Partition requested ids relative to the current entitlements
    pub fn build(
        request_type: RequestType,
        requested: &[String],
        entitled: &[String],
    ) -> Result<Self> {
        let mut requested_by_name: BTreeMap<String, (String, Version)> = BTreeMap::new();
        for id in requested {
            let (name, version) = parse_id(id)?;
            if let Some((other, _)) = requested_by_name.get(&name) {
                return Err(Error::InvalidRequest(format!(
                    "application {name} requested twice ({other}, {id})"
                )));
            }
            requested_by_name.insert(name, (id.clone(), version));
        }

        let mut entitled_by_name: BTreeMap<String, (String, Version)> = BTreeMap::new();
        for id in entitled {
            let (name, version) = parse_id(id)?;
            entitled_by_name.insert(name, (id.clone(), version));
        }

        let mut plan = Self::default();
        match request_type {
            RequestType::Entitle => {
                for (name, (id, _)) in &requested_by_name {
                    match entitled_by_name.get(name) {
                        Some((current, _)) if current == id => {
                            return Err(Error::InvalidRequest(format!("{id} is already entitled")));
                        }
                        Some((current, _)) => {
                            return Err(Error::InvalidRequest(format!(
                                "{current} is already entitled, upgrade it to {id} instead"
                            )));
                        }
                        None => {
                            plan.entitle.application_ids.insert(id.clone());
                        }
                    }
                }
            }
            RequestType::Upgrade => {
                for (name, (id, version)) in &requested_by_name {
                    let Some((current, current_version)) = entitled_by_name.get(name) else {
                        return Err(Error::InvalidRequest(format!(
                            "{id} cannot be upgraded, {name} is not entitled"
                        )));
                    };
                    plan.add_upgrade(id, version, current, current_version)?;
                }
            }
            RequestType::Revoke => {
                for (name, (id, _)) in &requested_by_name {
                    match entitled_by_name.get(name) {
                        Some((current, _)) if current == id => {
                            plan.revoke.application_ids.insert(id.clone());
                        }
                        _ => {
                            return Err(Error::InvalidRequest(format!("{id} is not entitled")));
                        }
                    }
                }
            }
            RequestType::State => {
                for (name, (id, version)) in &requested_by_name {
                    match entitled_by_name.get(name) {
                        None => {
                            plan.entitle.application_ids.insert(id.clone());
                        }
                        Some((current, _)) if current == id => {}
                        Some((current, current_version)) => {
                            plan.add_upgrade(id, version, current, current_version)?;
                        }
                    }
                }
                for (name, (id, _)) in &entitled_by_name {
                    if !requested_by_name.contains_key(name) {
                        plan.revoke.application_ids.insert(id.clone());
                    }
                }
            }
        }

        log::debug!(
            "Transition plan for {request_type}: {} entitle, {} upgrade, {} revoke",
            plan.entitle.len(),
            plan.upgrade.len(),
            plan.revoke.len()
        );
        Ok(plan)
    }

    fn add_upgrade(
        &mut self,
        id: &str,
        version: &Version,
        current: &str,
        current_version: &Version,
    ) -> Result<()> {
        if version == current_version {
            return Err(Error::InvalidRequest(format!("{id} is already entitled")));
        }
        if version < current_version {
            return Err(Error::InvalidRequest(format!(
                "downgrade from {current} to {id} is not supported"
            )));
        }
        self.upgrade.application_ids.insert(id.to_string());
        self.upgrade_from.insert(id.to_string(), current.to_string());
        Ok(())
    }

    pub fn bucket(&self, transition: TransitionType) -> &ApplicationStateTransitionBucket {
        match transition {
            TransitionType::Entitle => &self.entitle,
            TransitionType::Upgrade => &self.upgrade,
            TransitionType::Revoke => &self.revoke,
        }
    }

    /// Non-empty buckets in execution order
    pub fn buckets(&self) -> impl Iterator<Item = &ApplicationStateTransitionBucket> {
        TransitionType::ALL
            .into_iter()
            .map(|t| self.bucket(t))
            .filter(|b| !b.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entitle.is_empty() && self.upgrade.is_empty() && self.revoke.is_empty()
    }

    /// Ids that will be entitled or upgraded to
    pub fn target_ids(&self) -> impl Iterator<Item = &String> {
        self.entitle
            .application_ids
            .iter()
            .chain(self.upgrade.application_ids.iter())
    }

    /// Entitled ids after a successful execution of this plan
    pub fn apply_to(&self, entitled: &[String]) -> Vec<String> {
        self.apply_where(entitled, |_| true)
    }

    /// Entitled ids once the transitions accepted by `applied` took effect
    pub fn apply_where(&self, entitled: &[String], applied: impl Fn(&str) -> bool) -> Vec<String> {
        let mut result: BTreeSet<String> = entitled.iter().cloned().collect();
        for id in self.revoke.application_ids.iter().filter(|id| applied(id)) {
            result.remove(id);
        }
        for id in self.upgrade.application_ids.iter().filter(|id| applied(id)) {
            if let Some(from) = self.upgrade_from.get(id) {
                result.remove(from);
            }
            result.insert(id.clone());
        }
        for id in self.entitle.application_ids.iter().filter(|id| applied(id)) {
            result.insert(id.clone());
        }
        result.into_iter().collect()
    }
}
