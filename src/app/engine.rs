//! `FlowEngine` - the explicitly constructed, shareable owner of one graph.
//!
//! Each engine is independent; there is no process-wide instance. Clones share
//! the same graph. Every mutation collects its events under the lock and
//! publishes them after the lock is released, so listeners may call back into
//! the engine (push data, subscribe, query) from inside a callback.

use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Notify;
use tracing::debug;

use crate::app::config::EngineConfig;
use crate::app::dto::{DefinitionDto, DependencyDto, GraphSnapshot, InstanceDto};
use crate::domain::catalog::DefinitionCatalog;
use crate::domain::definition::DependencyDefinition;
use crate::domain::discovery::{Discovery, InstanceRegistration, ScanReport, Suggestion};
use crate::domain::edge::{Dependency, DependencyOptions};
use crate::domain::error::FlowResult;
use crate::domain::events::{EventBus, EventKind, FlowEvent, Subscription};
use crate::domain::manager::DependencyManager;
use crate::domain::registry::DependencyRegistry;
use crate::domain::types::{
    ComponentType, ConnectionStatus, DataType, DependencyId, InstanceId, PanelId,
};

pub struct FlowEngine<P> {
    inner: Arc<RwLock<EngineData<P>>>,
    bus: EventBus<P>,
    rescan: Arc<Notify>,
    config: EngineConfig,
}

pub(crate) struct EngineData<P> {
    pub(crate) manager: DependencyManager<P>,
    pub(crate) discovery: Discovery,
}

impl<P> Clone for FlowEngine<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            bus: self.bus.clone(),
            rescan: Arc::clone(&self.rescan),
            config: self.config,
        }
    }
}

impl<P: Send + Sync + 'static> Default for FlowEngine<P> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<P: Send + Sync + 'static> FlowEngine<P> {
    pub fn new(config: EngineConfig) -> Self {
        let registry = DependencyRegistry::with_defaults(DefinitionCatalog::new(), config.defaults);
        let manager = DependencyManager::new(registry);
        let bus = manager.bus().clone();
        Self {
            inner: Arc::new(RwLock::new(EngineData {
                manager,
                discovery: Discovery::new(config.discovery.auto_connect),
            })),
            bus,
            rescan: Arc::new(Notify::new()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, EngineData<P>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineData<P>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the write lock, then publish the events it raised.
    fn mutate<R>(&self, f: impl FnOnce(&mut EngineData<P>) -> R) -> R {
        let (out, events) = {
            let mut data = self.write();
            let out = f(&mut *data);
            (out, data.manager.take_events())
        };
        if !events.is_empty() {
            let faults = self.bus.publish_all(&events);
            if !faults.is_empty() {
                debug!(count = faults.len(), "listeners faulted during dispatch");
            }
        }
        out
    }

    pub(crate) fn rescan_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.rescan)
    }

    /// Read-only access to the manager for queries not wrapped here.
    pub fn with_manager<R>(&self, f: impl FnOnce(&DependencyManager<P>) -> R) -> R {
        f(&self.read().manager)
    }

    // ---- definitions ----

    pub fn register_definition(&self, definition: DependencyDefinition<P>) {
        self.mutate(|data| data.manager.register_definition(definition));
        self.rescan.notify_one();
    }

    // ---- instances ----

    pub fn register_instance(
        &self,
        instance_id: impl Into<InstanceId>,
        panel_id: impl Into<PanelId>,
        component_type: impl Into<ComponentType>,
    ) {
        let (instance_id, panel_id, component_type) =
            (instance_id.into(), panel_id.into(), component_type.into());
        self.mutate(|data| {
            let EngineData { manager, discovery } = data;
            discovery.register_instance(manager, instance_id, panel_id, component_type);
        });
        self.rescan.notify_one();
    }

    pub fn set_active(&self, instance_id: &InstanceId, active: bool) -> FlowResult<()> {
        self.mutate(|data| {
            let EngineData { manager, discovery } = data;
            discovery.set_active(manager, instance_id, active)
        })?;
        self.rescan.notify_one();
        Ok(())
    }

    pub fn unregister_instance(&self, instance_id: &InstanceId) -> FlowResult<usize> {
        let removed = self.mutate(|data| {
            let EngineData { manager, discovery } = data;
            discovery.unregister_instance(manager, instance_id)
        })?;
        self.rescan.notify_one();
        Ok(removed)
    }

    pub fn close_panel(&self, panel_id: &PanelId) -> Vec<InstanceId> {
        let closed = self.mutate(|data| {
            let EngineData { manager, discovery } = data;
            discovery.close_panel(manager, panel_id)
        });
        self.rescan.notify_one();
        closed
    }

    pub fn instance(&self, instance_id: &InstanceId) -> Option<InstanceRegistration> {
        self.read().discovery.instance(instance_id).cloned()
    }

    pub fn instances(&self) -> Vec<InstanceRegistration> {
        self.read().discovery.instances().cloned().collect()
    }

    // ---- discovery ----

    pub fn scan(&self) -> ScanReport {
        self.mutate(|data| {
            let EngineData { manager, discovery } = data;
            discovery.scan(manager)
        })
    }

    pub fn needs_rescan(&self) -> bool {
        self.read().discovery.is_dirty()
    }

    pub fn pending_suggestions(&self) -> Vec<Suggestion> {
        self.read().discovery.pending_suggestions()
    }

    pub fn accept_suggestion(&self, suggestion: &Suggestion) -> FlowResult<DependencyId> {
        self.mutate(|data| {
            let EngineData { manager, discovery } = data;
            discovery.accept_suggestion(manager, suggestion)
        })
    }

    // ---- edges ----

    pub fn create_dependency(
        &self,
        provider_id: &InstanceId,
        consumer_id: &InstanceId,
        data_type: &DataType,
        options: DependencyOptions,
    ) -> FlowResult<DependencyId> {
        self.mutate(|data| {
            data.manager
                .connect(provider_id, consumer_id, data_type, options)
        })
    }

    pub fn remove_dependency(&self, id: DependencyId) -> bool {
        self.mutate(|data| data.manager.remove_dependency(id))
    }

    pub fn suspend(&self, id: DependencyId) -> FlowResult<()> {
        self.mutate(|data| data.manager.suspend(id))
    }

    pub fn resume(&self, id: DependencyId) -> FlowResult<()> {
        self.mutate(|data| data.manager.resume(id))
    }

    pub fn dependency(&self, id: DependencyId) -> Option<Dependency> {
        self.read().manager.registry().get(id).cloned()
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        self.read()
            .manager
            .registry()
            .dependencies()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn dependencies_by_provider(&self, provider_id: &InstanceId) -> Vec<Dependency> {
        self.read()
            .manager
            .registry()
            .get_dependencies_by_provider(provider_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn dependencies_by_consumer(&self, consumer_id: &InstanceId) -> Vec<Dependency> {
        self.read()
            .manager
            .registry()
            .get_dependencies_by_consumer(consumer_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn dependencies_by_data_type(&self, data_type: &DataType) -> Vec<Dependency> {
        self.read()
            .manager
            .registry()
            .get_dependencies_by_data_type(data_type)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn find_dependency(
        &self,
        provider_id: &InstanceId,
        consumer_id: &InstanceId,
        data_type: &DataType,
    ) -> Option<Dependency> {
        self.read()
            .manager
            .registry()
            .find_dependency(provider_id, consumer_id, data_type)
            .cloned()
    }

    pub fn status(&self, id: DependencyId) -> Option<ConnectionStatus> {
        self.read().manager.status(id)
    }

    // ---- data plane ----

    pub fn update_data(
        &self,
        provider_id: &InstanceId,
        data_type: &DataType,
        data: P,
    ) -> Vec<DependencyId> {
        self.mutate(|engine| engine.manager.update_data(provider_id, data_type, data))
    }

    pub fn request_data(
        &self,
        consumer_id: &InstanceId,
        provider_id: &InstanceId,
        data_type: &DataType,
    ) -> FlowResult<DependencyId> {
        self.mutate(|data| {
            data.manager
                .request_data(consumer_id, provider_id, data_type)
        })
    }

    pub fn data_for(&self, id: DependencyId) -> Option<Arc<P>> {
        self.read().manager.data_for(id)
    }

    // ---- subscriptions ----

    pub fn on_data_updated<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FlowEvent<P>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(EventKind::DataUpdated, listener)
    }

    pub fn on_status_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FlowEvent<P>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(EventKind::StatusChanged, listener)
    }

    pub fn on_event<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&FlowEvent<P>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, listener)
    }

    pub fn on_any<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FlowEvent<P>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe_all(listener)
    }

    // ---- snapshots ----

    pub fn snapshot(&self) -> GraphSnapshot
    where
        P: Serialize,
    {
        let data = self.read();
        let manager = &data.manager;
        let registry = manager.registry();
        GraphSnapshot {
            definitions: registry
                .catalog()
                .definitions()
                .map(DefinitionDto::from)
                .collect(),
            instances: data.discovery.instances().map(InstanceDto::from).collect(),
            dependencies: registry
                .dependencies()
                .into_iter()
                .map(|dep| {
                    let value = manager
                        .data_for(dep.id)
                        .and_then(|v| serde_json::to_value(v.as_ref()).ok());
                    DependencyDto::new(dep, value)
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FlowEngine<serde_json::Value> {
        let engine = FlowEngine::default();
        engine.register_definition(DependencyDefinition::provider("list", "EmailList", "email"));
        engine.register_definition(DependencyDefinition::consumer("detail", "EmailDetail", "email"));
        engine
    }

    #[test]
    fn test_engines_are_independent() {
        let a = engine();
        let b = engine();
        a.register_instance("list-1", "left", "EmailList");
        assert_eq!(a.instances().len(), 1);
        assert!(b.instances().is_empty());
    }

    #[test]
    fn test_clones_share_graph() {
        let a = engine();
        let b = a.clone();
        a.register_instance("list-1", "left", "EmailList");
        assert!(b.instance(&"list-1".into()).is_some());
        assert!(b.needs_rescan());
    }

    #[test]
    fn test_snapshot_includes_values() {
        let e = engine();
        let (p, c, t) = ("list-1".into(), "detail-1".into(), "email".into());
        e.create_dependency(&p, &c, &t, DependencyOptions::default()).unwrap();
        e.update_data(&p, &t, serde_json::json!({"id": 1}));
        let snap = e.snapshot();
        assert_eq!(snap.definitions.len(), 2);
        assert_eq!(snap.dependencies.len(), 1);
        assert_eq!(snap.dependencies[0].status, ConnectionStatus::Ready);
        assert_eq!(snap.dependencies[0].value, Some(serde_json::json!({"id": 1})));
    }
}
