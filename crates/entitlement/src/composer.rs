//! Flow composer - turns module sequences into an execution tree
//!
//! The tree has four layers:
//!
//! - **module**: remote-system stages, route and resource stages side by
//!   side, then the module manager call, then the event
//! - **level**: all module chains of one level, in parallel
//! - **application**: levels in order (live backend, live UI, deprecated
//!   UI, deprecated backend)
//! - **request**: applications in dependency levels, grouped per bucket
//!   according to the [`ExecutionMode`]

use crate::error::{Error, Result};
use crate::sequencer::{
    ApplicationSequences, ModuleDescriptorHolder, ModuleKind, ModulesSequence, dependency_levels,
};
use crate::stages::{Action, EventStage, ModuleStage, ResourceStage, RouteStage};
use crate::transition::TransitionType;
use descriptor::ModuleDescriptor;
use integration::{
    AuthResources, EntitlementEvent, EventKind, EventPublisher, GatewayRoutes, ModuleInstaller,
    ModuleRequest, ResourceRequest, RouteRequest,
};
use serde::{Deserialize, Serialize};
use stageflow::{FlowNode, RetryConfig};
use std::fmt;
use std::sync::Arc;

/// How the buckets of one request are composed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Entitle and upgrade applications share dependency levels and run
    /// next to the revoke bucket
    #[default]
    Parallel,
    /// Buckets run one after another: entitle, upgrade, revoke
    Ordered,
}

/// Which optional integrations take part in a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    pub gateway: bool,
    pub auth: bool,
    pub events: bool,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            gateway: true,
            auth: true,
            events: true,
        }
    }
}

/// Collaborator implementations available to the composer
#[derive(Clone)]
pub struct Integrations {
    pub installer: Arc<dyn ModuleInstaller>,
    pub gateway: Option<Arc<dyn GatewayRoutes>>,
    pub auth: Option<Arc<dyn AuthResources>>,
    pub events: Option<Arc<dyn EventPublisher>>,
}

impl Integrations {
    pub fn new(installer: Arc<dyn ModuleInstaller>) -> Self {
        Self {
            installer,
            gateway: None,
            auth: None,
            events: None,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn GatewayRoutes>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthResources>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }
}

impl fmt::Debug for Integrations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Integrations")
            .field("gateway", &self.gateway.is_some())
            .field("auth", &self.auth.is_some())
            .field("events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds execution trees from application sequences
pub struct FlowComposer {
    integrations: Integrations,
    retry: RetryConfig,
    mode: ExecutionMode,
}

impl fmt::Debug for FlowComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowComposer")
            .field("integrations", &self.integrations)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl FlowComposer {
    /// Create a composer for the enabled integrations
    ///
    /// An enabled integration without an implementation is a configuration
    /// error; a disabled one is dropped even when provided.
    pub fn new(
        settings: IntegrationSettings,
        integrations: Integrations,
        retry: RetryConfig,
        mode: ExecutionMode,
    ) -> Result<Self> {
        let missing: Vec<&str> = [
            (settings.gateway && integrations.gateway.is_none(), "gateway"),
            (settings.auth && integrations.auth.is_none(), "auth"),
            (settings.events && integrations.events.is_none(), "events"),
        ]
        .into_iter()
        .filter_map(|(missing, name)| missing.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "enabled integrations have no implementation: {}",
                missing.join(", ")
            )));
        }

        let integrations = Integrations {
            installer: integrations.installer,
            gateway: integrations.gateway.filter(|_| settings.gateway),
            auth: integrations.auth.filter(|_| settings.auth),
            events: integrations.events.filter(|_| settings.events),
        };
        log::debug!("Flow composer integrations: {integrations:?}");

        Ok(Self {
            integrations,
            retry,
            mode,
        })
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn event(
        &self,
        tenant: &str,
        app: &ApplicationSequences,
        module: &ModuleDescriptor,
    ) -> Option<FlowNode> {
        let publisher = self.integrations.events.as_ref()?;
        let kind = match app.transition {
            TransitionType::Entitle => EventKind::Entitle,
            TransitionType::Upgrade => EventKind::Upgrade,
            TransitionType::Revoke => EventKind::Revoke,
        };
        let event = EntitlementEvent::new(kind, tenant, &app.application_id, &module.id());
        Some(FlowNode::stage(EventStage::new(event, Arc::clone(publisher), self.retry.clone())))
    }

    fn routes(&self, action: Action, request: RouteRequest) -> Option<FlowNode> {
        let gateway = self.integrations.gateway.as_ref()?;
        if request.is_empty() {
            return None;
        }
        Some(FlowNode::stage(RouteStage::new(
            action,
            request,
            Arc::clone(gateway),
            self.retry.clone(),
        )))
    }

    fn resources(&self, action: Action, request: ResourceRequest) -> Option<FlowNode> {
        let auth = self.integrations.auth.as_ref()?;
        if request.is_empty() {
            return None;
        }
        Some(FlowNode::stage(ResourceStage::new(
            action,
            request,
            Arc::clone(auth),
            self.retry.clone(),
        )))
    }

    fn module_stage(&self, action: Action, request: ModuleRequest) -> FlowNode {
        FlowNode::stage(ModuleStage::new(
            action,
            request,
            Arc::clone(&self.integrations.installer),
            self.retry.clone(),
        ))
    }

    /// Chain for a module being added or moved to a new version
    pub fn module_flow(
        &self,
        tenant: &str,
        app: &ApplicationSequences,
        holder: &ModuleDescriptorHolder,
    ) -> FlowNode {
        let Some(module) = holder.module() else {
            return self.removal_flow(tenant, app, holder.current());
        };
        let id = format!("{}:{}", app.application_id, module.id());
        let installed = holder.installed();
        let action = if installed.is_some() { Action::Update } else { Action::Create };

        let integrations = FlowNode::combine(
            format!("{id}:integrations"),
            vec![
                self.routes(
                    action,
                    RouteRequest::for_module(tenant, &app.application_id, module, installed),
                ),
                self.resources(
                    action,
                    ResourceRequest::for_module(tenant, &app.application_id, module, installed),
                ),
            ],
        );
        let request = ModuleRequest::new(tenant, app.application_id.as_str(), module.clone())
            .with_installed(installed.cloned());

        FlowNode::sequential(
            id,
            vec![
                integrations,
                self.module_stage(action, request),
                self.event(tenant, app, module).unwrap_or_else(|| FlowNode::noop("event")),
            ],
        )
    }

    /// Chain for a module that is no longer part of the application
    pub fn removal_flow(
        &self,
        tenant: &str,
        app: &ApplicationSequences,
        module: &ModuleDescriptor,
    ) -> FlowNode {
        let id = format!("{}:{}", app.application_id, module.id());
        let integrations = FlowNode::combine(
            format!("{id}:integrations"),
            vec![
                self.routes(
                    Action::Remove,
                    RouteRequest::for_module(tenant, &app.application_id, module, None),
                ),
                self.resources(
                    Action::Remove,
                    ResourceRequest::for_module(tenant, &app.application_id, module, None),
                ),
            ],
        );
        let request = ModuleRequest::new(tenant, app.application_id.as_str(), module.clone());

        FlowNode::sequential(
            id,
            vec![
                self.module_stage(Action::Remove, request),
                integrations,
                self.event(tenant, app, module).unwrap_or_else(|| FlowNode::noop("event")),
            ],
        )
    }

    fn live_levels(
        &self,
        tenant: &str,
        app: &ApplicationSequences,
        kind: ModuleKind,
        sequence: &ModulesSequence,
    ) -> FlowNode {
        let id = format!("{}:{}", app.application_id, kind.as_str());
        let levels = sequence
            .levels
            .iter()
            .enumerate()
            .map(|(i, level)| {
                FlowNode::combine(
                    format!("{id}:level-{i}"),
                    level.iter().map(|h| Some(self.module_flow(tenant, app, h))).collect(),
                )
            })
            .collect();
        FlowNode::sequential(id, levels)
    }

    fn deprecated_levels(
        &self,
        tenant: &str,
        app: &ApplicationSequences,
        kind: ModuleKind,
        sequence: &ModulesSequence,
    ) -> FlowNode {
        let id = format!("{}:deprecated-{}", app.application_id, kind.as_str());
        let levels = sequence
            .deprecated_levels
            .iter()
            .enumerate()
            .map(|(i, level)| {
                FlowNode::combine(
                    format!("{id}:level-{i}"),
                    level.iter().map(|m| Some(self.removal_flow(tenant, app, m))).collect(),
                )
            })
            .collect();
        FlowNode::sequential(id, levels)
    }

    /// Flow of one application
    pub fn application_flow(&self, tenant: &str, app: &ApplicationSequences) -> FlowNode {
        FlowNode::sequential(
            app.application_id.clone(),
            vec![
                self.live_levels(tenant, app, ModuleKind::Backend, &app.modules),
                self.live_levels(tenant, app, ModuleKind::Ui, &app.ui_modules),
                self.deprecated_levels(tenant, app, ModuleKind::Ui, &app.ui_modules),
                self.deprecated_levels(tenant, app, ModuleKind::Backend, &app.modules),
            ],
        )
    }

    /// Applications in dependency levels; dependents first when `reverse`
    fn leveled(
        &self,
        id: &str,
        tenant: &str,
        apps: Vec<&ApplicationSequences>,
        reverse: bool,
    ) -> FlowNode {
        let mut levels = dependency_levels(
            apps,
            |a| a.name.clone(),
            |a, b| a.dependencies.contains(&b.name),
        );
        if reverse {
            levels.reverse();
        }
        let levels = levels
            .into_iter()
            .enumerate()
            .map(|(i, level)| {
                FlowNode::combine(
                    format!("{id}:level-{i}"),
                    level
                        .into_iter()
                        .map(|app| Some(self.application_flow(tenant, app)))
                        .collect(),
                )
            })
            .collect();
        FlowNode::sequential(id, levels)
    }

    fn bucket(
        &self,
        request_id: &str,
        tenant: &str,
        sequences: &[ApplicationSequences],
        transition: TransitionType,
    ) -> FlowNode {
        let apps = sequences.iter().filter(|s| s.transition == transition).collect();
        self.leveled(
            &format!("{request_id}:{transition}"),
            tenant,
            apps,
            transition == TransitionType::Revoke,
        )
    }

    /// Execution tree of a whole request
    pub fn request_flow(
        &self,
        request_id: &str,
        tenant: &str,
        sequences: &[ApplicationSequences],
    ) -> FlowNode {
        let tree = match self.mode {
            ExecutionMode::Ordered => FlowNode::sequential(
                request_id,
                TransitionType::ALL
                    .iter()
                    .map(|t| self.bucket(request_id, tenant, sequences, *t))
                    .collect(),
            ),
            ExecutionMode::Parallel => {
                let forward = sequences
                    .iter()
                    .filter(|s| s.transition != TransitionType::Revoke)
                    .collect();
                FlowNode::combine(
                    request_id,
                    vec![
                        Some(self.leveled(&format!("{request_id}:apply"), tenant, forward, false)),
                        Some(self.bucket(request_id, tenant, sequences, TransitionType::Revoke)),
                    ],
                )
            }
        };
        log::debug!(
            "Composed {} stages for request {request_id} ({:?})",
            tree.stage_count(),
            self.mode
        );
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::ModuleSequencer;
    use crate::stages::tests::{Recorder, fast_retry};
    use descriptor::{ApplicationDescriptor, InterfaceDescriptor, RoutingEntry};
    use stageflow::{ExecuteOptions, NoListener, StageStatus, execute};

    fn routed(name: &str, version: &str) -> ModuleDescriptor {
        ModuleDescriptor::new(name, version).providing_interface(
            InterfaceDescriptor::new(format!("{name}-api"), "1.0")
                .with_handler(
                    RoutingEntry::new(&["GET"], format!("/{name}"))
                        .with_permission(format!("{name}.get")),
                ),
        )
    }

    fn composer(
        recorder: &Arc<Recorder>,
        settings: IntegrationSettings,
        mode: ExecutionMode,
    ) -> FlowComposer {
        let integrations = Integrations::new(recorder.clone())
            .with_gateway(recorder.clone())
            .with_auth(recorder.clone())
            .with_events(recorder.clone());
        FlowComposer::new(settings, integrations, fast_retry(1), mode).unwrap()
    }

    fn installer_only(recorder: &Arc<Recorder>) -> FlowComposer {
        let settings = IntegrationSettings {
            gateway: false,
            auth: false,
            events: false,
        };
        composer(recorder, settings, ExecutionMode::Parallel)
    }

    fn entitle(app: &ApplicationDescriptor) -> ApplicationSequences {
        ModuleSequencer::sequence_application(TransitionType::Entitle, Some(app), None).unwrap()
    }

    #[test]
    fn test_enabled_integration_without_implementation() {
        let recorder = Arc::new(Recorder::default());
        let result = FlowComposer::new(
            IntegrationSettings::default(),
            Integrations::new(recorder),
            RetryConfig::default(),
            ExecutionMode::Parallel,
        );
        match result {
            Err(Error::Configuration(message)) => {
                assert!(message.contains("gateway, auth, events"));
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_install_chain_shape() {
        let recorder = Arc::new(Recorder::default());
        let composer = composer(&recorder, IntegrationSettings::default(), ExecutionMode::Parallel);
        let app = ApplicationDescriptor::new("app", "1.0.0").with_module(routed("mod-a", "1.0.0"));

        let tree = composer.application_flow("diku", &entitle(&app));

        let chain = tree.find("app-1.0.0:mod-a-1.0.0").unwrap();
        let ids: Vec<String> = chain.children().iter().map(FlowNode::id).collect();
        assert_eq!(
            ids,
            vec![
                "app-1.0.0:mod-a-1.0.0:integrations",
                "app-1.0.0:mod-a-1.0.0:module-install",
                "app-1.0.0:mod-a-1.0.0:event",
            ]
        );
        assert!(matches!(chain.children()[0], FlowNode::Parallel { .. }));
        assert_eq!(chain.children()[0].children().len(), 2);
    }

    #[test]
    fn test_disabled_integrations_leave_bare_install() {
        let recorder = Arc::new(Recorder::default());
        let composer = installer_only(&recorder);
        let app = ApplicationDescriptor::new("app", "1.0.0").with_module(routed("mod-a", "1.0.0"));

        let tree = composer.application_flow("diku", &entitle(&app));

        assert_eq!(tree.stage_ids(), vec!["app-1.0.0:mod-a-1.0.0:module-install"]);
    }

    #[test]
    fn test_single_integration_is_not_wrapped() {
        let recorder = Arc::new(Recorder::default());
        let settings = IntegrationSettings {
            gateway: true,
            auth: false,
            events: false,
        };
        let composer = composer(&recorder, settings, ExecutionMode::Parallel);
        let app = ApplicationDescriptor::new("app", "1.0.0").with_module(routed("mod-a", "1.0.0"));

        let tree = composer.application_flow("diku", &entitle(&app));

        let chain = tree.find("app-1.0.0:mod-a-1.0.0").unwrap();
        assert!(matches!(chain.children()[0], FlowNode::Stage(_)));
        assert_eq!(chain.children()[0].id(), "app-1.0.0:mod-a-1.0.0:routes-create");
    }

    #[test]
    fn test_upgrade_updates_and_removes_deprecated() {
        let recorder = Arc::new(Recorder::default());
        let composer = composer(&recorder, IntegrationSettings::default(), ExecutionMode::Parallel);
        let installed = ApplicationDescriptor::new("app", "1.0.0")
            .with_module(routed("mod-a", "1.0.0"))
            .with_module(routed("mod-old", "1.0.0"));
        let target =
            ApplicationDescriptor::new("app", "2.0.0").with_module(routed("mod-a", "2.0.0"));
        let sequences = ModuleSequencer::sequence_application(
            TransitionType::Upgrade,
            Some(&target),
            Some(&installed),
        )
        .unwrap();

        let ids = composer.application_flow("diku", &sequences).stage_ids();

        assert!(ids.contains(&"app-2.0.0:mod-a-2.0.0:module-update".to_string()));
        assert!(ids.contains(&"app-2.0.0:mod-a-2.0.0:routes-update".to_string()));
        let uninstall = ids
            .iter()
            .position(|id| id == "app-2.0.0:mod-old-1.0.0:module-uninstall")
            .unwrap();
        let removal = ids
            .iter()
            .position(|id| id == "app-2.0.0:mod-old-1.0.0:routes-remove")
            .unwrap();
        assert!(uninstall < removal);
    }

    #[test]
    fn test_ordered_mode_runs_buckets_in_order() {
        let recorder = Arc::new(Recorder::default());
        let composer = composer(&recorder, IntegrationSettings::default(), ExecutionMode::Ordered);
        let new_app =
            ApplicationDescriptor::new("new", "1.0.0").with_module(routed("mod-n", "1.0.0"));
        let old_app =
            ApplicationDescriptor::new("old", "1.0.0").with_module(routed("mod-o", "1.0.0"));
        let sequences = vec![
            ModuleSequencer::sequence_application(TransitionType::Revoke, None, Some(&old_app))
                .unwrap(),
            entitle(&new_app),
        ];

        let tree = composer.request_flow("req-1", "diku", &sequences);

        let ids: Vec<String> = tree.children().iter().map(FlowNode::id).collect();
        assert_eq!(ids, vec!["req-1:entitle", "req-1:revoke"]);
    }

    #[test]
    fn test_parallel_mode_combines_forward_and_revoke() {
        let recorder = Arc::new(Recorder::default());
        let composer = composer(&recorder, IntegrationSettings::default(), ExecutionMode::Parallel);
        let new_app =
            ApplicationDescriptor::new("new", "1.0.0").with_module(routed("mod-n", "1.0.0"));
        let old_app =
            ApplicationDescriptor::new("old", "1.0.0").with_module(routed("mod-o", "1.0.0"));
        let sequences = vec![
            ModuleSequencer::sequence_application(TransitionType::Revoke, None, Some(&old_app))
                .unwrap(),
            entitle(&new_app),
        ];

        let tree = composer.request_flow("req-1", "diku", &sequences);

        assert!(matches!(tree, FlowNode::Parallel { .. }));
        let ids: Vec<String> = tree.children().iter().map(FlowNode::id).collect();
        assert_eq!(ids, vec!["req-1:apply", "req-1:revoke"]);
    }

    #[test]
    fn test_dependencies_come_first() {
        let recorder = Arc::new(Recorder::default());
        let composer = installer_only(&recorder);
        let base =
            ApplicationDescriptor::new("base", "1.0.0").with_module(routed("mod-base", "1.0.0"));
        let top = ApplicationDescriptor::new("top", "1.0.0")
            .with_module(routed("mod-top", "1.0.0"))
            .with_dependency("base", "^1.0.0");

        let tree = composer.request_flow("req-1", "diku", &[entitle(&top), entitle(&base)]);

        assert_eq!(
            tree.stage_ids(),
            vec![
                "base-1.0.0:mod-base-1.0.0:module-install",
                "top-1.0.0:mod-top-1.0.0:module-install"
            ]
        );
    }

    #[test]
    fn test_failed_install_rolls_back_level() {
        let recorder = Arc::new(Recorder::failing("install mod-2", 409));
        let composer = installer_only(&recorder);
        let app = ApplicationDescriptor::new("app", "1.0.0")
            .with_module(ModuleDescriptor::new("mod-1", "1.0.0"))
            .with_module(ModuleDescriptor::new("mod-2", "1.0.0"))
            .with_module(ModuleDescriptor::new("mod-3", "1.0.0"));
        let tree = composer.request_flow("req-1", "diku", &[entitle(&app)]);

        let options = ExecuteOptions::default().with_jobs(1);
        let report = execute("req-1", &tree, &options, Arc::new(NoListener)).unwrap();

        assert_eq!(report.status, StageStatus::Failed);
        assert_eq!(
            recorder.calls(),
            vec!["install mod-1-1.0.0", "install mod-2-1.0.0", "uninstall mod-1-1.0.0"]
        );
        let status = |id: &str| report.stage(id).map(|s| s.status);
        assert_eq!(status("app-1.0.0:mod-1-1.0.0:module-install"), Some(StageStatus::Cancelled));
        assert_eq!(status("app-1.0.0:mod-2-1.0.0:module-install"), Some(StageStatus::Failed));
        assert_eq!(status("app-1.0.0:mod-3-1.0.0:module-install"), Some(StageStatus::Queued));
    }
}
