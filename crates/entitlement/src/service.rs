//! Entitlement service - plans, validates and executes requests

use crate::composer::{FlowComposer, Integrations};
use crate::config::EntitlementConfig;
use crate::error::{Error, Result};
use crate::history::FlowHistory;
use crate::interfaces::IntegrityViolation;
use crate::resolver::DependencyResolver;
use crate::sequencer::{ApplicationSequences, ModuleSequencer};
use crate::transition::{
    ApplicationStateTransitionPlan, EntitlementRequest, RequestType, TransitionType,
};
use descriptor::{ApplicationDescriptor, Version, VersionRange, name_of};
use integration::{DescriptorSource, EntitlementSource};
use stageflow::{FlowListener, FlowNode, FlowReport, LogListener, StageStatus};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A request that passed planning, with everything needed to execute it
#[derive(Debug, Clone)]
pub struct PlannedRequest {
    pub request: EntitlementRequest,
    pub plan: ApplicationStateTransitionPlan,
    /// Unmet interface requirements; execution is refused unless empty
    pub violations: Vec<IntegrityViolation>,
    /// Descriptors of the requested and the currently entitled applications
    pub descriptors: BTreeMap<String, Arc<ApplicationDescriptor>>,
    /// Ids entitled before the request
    pub entitled: Vec<String>,
}

impl PlannedRequest {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Ids entitled once the request has executed successfully
    pub fn entitled_after(&self) -> Vec<String> {
        self.plan.apply_to(&self.entitled)
    }

    /// Ids entitled after execution, counting only applications whose
    /// flow completed
    ///
    /// Under ignore-on-error some applications may succeed while others
    /// fail; compensated applications count as not applied.
    pub fn entitled_after_report(&self, report: &FlowReport) -> Vec<String> {
        self.plan.apply_where(&self.entitled, |id| match report.flow(id) {
            Some(flow) => flow.status == StageStatus::Succeeded,
            None => {
                let scope = format!("{id}:");
                report
                    .stages
                    .iter()
                    .filter(|stage| stage.stage_id.starts_with(&scope))
                    .all(|stage| stage.status == StageStatus::Succeeded)
            }
        })
    }

    fn descriptor(&self, id: &str) -> Result<&Arc<ApplicationDescriptor>> {
        self.descriptors
            .get(id)
            .ok_or_else(|| {
                Error::Invariant(format!("descriptor {id} was not loaded during planning"))
            })
    }
}

/// Orchestrates entitlement requests end to end
pub struct EntitlementService {
    config: EntitlementConfig,
    descriptors: Arc<dyn DescriptorSource>,
    entitlements: Arc<dyn EntitlementSource>,
    composer: FlowComposer,
    history: Arc<dyn FlowHistory>,
    listener: Arc<dyn FlowListener>,
}

impl EntitlementService {
    pub fn new(
        config: EntitlementConfig,
        descriptors: Arc<dyn DescriptorSource>,
        entitlements: Arc<dyn EntitlementSource>,
        integrations: Integrations,
        history: Arc<dyn FlowHistory>,
    ) -> Result<Self> {
        let composer = FlowComposer::new(
            config.integrations,
            integrations,
            config.retry.to_retry_config(),
            config.execution.mode,
        )?;
        Ok(Self {
            config,
            descriptors,
            entitlements,
            composer,
            history,
            listener: Arc::new(LogListener),
        })
    }

    /// Replace the default log listener
    pub fn with_listener(mut self, listener: Arc<dyn FlowListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn config(&self) -> &EntitlementConfig {
        &self.config
    }

    fn load(&self, id: &str) -> Result<Arc<ApplicationDescriptor>> {
        let descriptor = self.descriptors.get_application_descriptor(id).map_err(|e| match e {
            integration::Error::NotFound { .. } => Error::DescriptorNotFound { id: id.to_string() },
            other => other.into(),
        })?;
        if descriptor.id() != id {
            return Err(Error::Invariant(format!(
                "descriptor source returned {} for {id}",
                descriptor.id()
            )));
        }
        Ok(Arc::new(descriptor))
    }

    /// Build the transition plan and check it against the tenant's state
    ///
    /// Structural problems (unknown descriptors, cycles, missing or
    /// out-of-range dependencies, revoking a dependency that stays in
    /// use) are errors. Unmet interfaces are returned as violations so
    /// callers can show them all at once. Applications that stay entitled
    /// and depend on an upgraded one are checked as if they were targets.
    pub fn plan_and_validate(&self, request: &EntitlementRequest) -> Result<PlannedRequest> {
        if request.application_ids.is_empty() && request.request_type != RequestType::State {
            return Err(Error::InvalidRequest(format!(
                "{} request {} names no applications",
                request.request_type, request.request_id
            )));
        }

        let entitled = self.entitlements.find_entitled_applications(&request.tenant)?;
        let plan = ApplicationStateTransitionPlan::build(
            request.request_type,
            &request.application_ids,
            &entitled,
        )?;

        let mut descriptors = BTreeMap::new();
        for id in plan.target_ids().chain(entitled.iter()) {
            if !descriptors.contains_key(id) {
                descriptors.insert(id.clone(), self.load(id)?);
            }
        }
        let planned = PlannedRequest {
            request: request.clone(),
            plan,
            violations: Vec::new(),
            descriptors,
            entitled,
        };

        let visible = planned
            .entitled_after()
            .iter()
            .map(|id| planned.descriptor(id).cloned())
            .collect::<Result<Vec<_>>>()?;
        check_revocations(&planned, &visible)?;

        let mut targets = planned
            .plan
            .target_ids()
            .map(|id| planned.descriptor(id).cloned())
            .collect::<Result<Vec<_>>>()?;
        let dependents = upgrade_dependents(&planned, &targets, &visible)?;
        let mut entitled_set: BTreeSet<String> = planned.entitled.iter().cloned().collect();
        for dependent in &dependents {
            log::debug!(
                "{} depends on an upgraded application, validating it again",
                dependent.id()
            );
            entitled_set.remove(&dependent.id());
        }
        targets.extend(dependents);
        check_dependency_versions(&targets, &visible)?;

        let violations = self
            .config
            .validation
            .validator()
            .validate(&targets, &visible, &entitled_set)?;

        if violations.is_empty() {
            log::debug!("Request {} is valid", request.request_id);
        } else {
            log::warn!(
                "Request {} has {} unmet interface requirements",
                request.request_id,
                violations.len()
            );
        }
        Ok(PlannedRequest { violations, ..planned })
    }

    /// Module sequences of every application in the plan
    pub fn sequences(&self, planned: &PlannedRequest) -> Result<Vec<ApplicationSequences>> {
        let mut sequences = Vec::new();
        for bucket in planned.plan.buckets() {
            for id in &bucket.application_ids {
                let descriptor = planned.descriptor(id)?;
                let sequence = match bucket.transition {
                    TransitionType::Entitle => ModuleSequencer::sequence_application(
                        bucket.transition,
                        Some(descriptor),
                        None,
                    )?,
                    TransitionType::Upgrade => {
                        let from = planned.plan.upgrade_from.get(id).ok_or_else(|| {
                            Error::Invariant(format!("upgrade of {id} has no installed version"))
                        })?;
                        ModuleSequencer::sequence_application(
                            bucket.transition,
                            Some(descriptor),
                            Some(planned.descriptor(from)?),
                        )?
                    }
                    TransitionType::Revoke => ModuleSequencer::sequence_application(
                        bucket.transition,
                        None,
                        Some(descriptor),
                    )?,
                };
                sequences.push(sequence);
            }
        }
        Ok(sequences)
    }

    /// Execution tree for a planned request
    pub fn build_execution_tree(
        &self,
        planned: &PlannedRequest,
        sequences: &[ApplicationSequences],
    ) -> FlowNode {
        self.composer
            .request_flow(&planned.request.request_id, &planned.request.tenant, sequences)
    }

    /// Plan, validate and execute a request
    pub fn execute(&self, request: &EntitlementRequest) -> Result<FlowReport> {
        let planned = self.plan_and_validate(request)?;
        self.execute_planned(&planned)
    }

    /// Execute a request planned earlier
    ///
    /// Refused when the plan carries interface violations. Stage failures
    /// do not make this an error; they are in the report.
    pub fn execute_planned(&self, planned: &PlannedRequest) -> Result<FlowReport> {
        if !planned.is_valid() {
            return Err(Error::InterfaceIntegrity(planned.violations.clone()));
        }

        let request = &planned.request;
        let sequences = self.sequences(planned)?;
        let tree = self.build_execution_tree(planned, &sequences);
        let options = self.config.execution.to_execute_options(request.strategy);

        log::info!(
            "Executing {} request {} for {} ({} stages)",
            request.request_type,
            request.request_id,
            request.tenant,
            tree.stage_count()
        );
        let report = stageflow::execute(
            &request.request_id,
            &tree,
            &options,
            Arc::clone(&self.listener),
        )?;

        if let Err(e) = self.history.record(&report) {
            log::warn!("Failed to record report of {}: {e:#}", request.request_id);
        }
        log::info!("Request {} finished: {}", request.request_id, report.status);
        Ok(report)
    }

    /// Report of an executed request
    pub fn status(&self, request_id: &str) -> Result<FlowReport> {
        self.history
            .find(request_id)?
            .ok_or_else(|| Error::UnknownRequest(request_id.to_string()))
    }
}

/// Revoked applications must not be needed by anything that stays
fn check_revocations(
    planned: &PlannedRequest,
    remaining: &[Arc<ApplicationDescriptor>],
) -> Result<()> {
    for revoked in &planned.plan.revoke.application_ids {
        let name = name_of(revoked);
        if remaining.iter().any(|app| app.name == name) {
            continue;
        }
        if let Some(dependent) = remaining.iter().find(|app| app.depends_on(&name)) {
            return Err(Error::InvalidRequest(format!(
                "{revoked} cannot be revoked, {} depends on it",
                dependent.id()
            )));
        }
    }
    Ok(())
}

/// Applications that stay entitled but depend, directly or not, on an upgraded one
fn upgrade_dependents(
    planned: &PlannedRequest,
    targets: &[Arc<ApplicationDescriptor>],
    visible: &[Arc<ApplicationDescriptor>],
) -> Result<Vec<Arc<ApplicationDescriptor>>> {
    let upgraded: BTreeSet<String> = planned
        .plan
        .upgrade
        .application_ids
        .iter()
        .map(|id| name_of(id))
        .collect();
    if upgraded.is_empty() {
        return Ok(Vec::new());
    }
    let target_ids: BTreeSet<String> = targets.iter().map(|t| t.id()).collect();

    let mut resolver = DependencyResolver::new(visible.iter().map(Arc::clone));
    let mut dependents = Vec::new();
    for app in visible {
        if target_ids.contains(&app.id()) {
            continue;
        }
        let closure = resolver.resolve(&app.name)?;
        if upgraded.iter().any(|name| closure.contains_key(name)) {
            dependents.push(Arc::clone(app));
        }
    }
    Ok(dependents)
}

/// Declared dependency ranges must accept the version that will be entitled
fn check_dependency_versions(
    targets: &[Arc<ApplicationDescriptor>],
    visible: &[Arc<ApplicationDescriptor>],
) -> Result<()> {
    let by_name: BTreeMap<&str, &Arc<ApplicationDescriptor>> =
        visible.iter().map(|d| (d.name.as_str(), d)).collect();

    for target in targets {
        for dependency in &target.dependencies {
            // Missing dependencies are reported by the resolver
            let Some(found) = by_name.get(dependency.name.as_str()) else {
                continue;
            };
            let range = VersionRange::parse(&dependency.version)?;
            let version = Version::parse(&found.version)?;
            if !range.matches(&version) {
                return Err(Error::InvalidRequest(format!(
                    "{} requires {} {}, but {} would be entitled",
                    target.id(),
                    dependency.name,
                    range,
                    found.id()
                )));
            }
        }
    }
    Ok(())
}
