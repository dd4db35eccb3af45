//! Dependency Manager - the runtime data plane.
//!
//! Owns the registry, the per-edge value store and the provider buffers, and
//! drives edge status transitions.
//!
//! Notifications are queued, not dispatched: the owner drains them with
//! [`DependencyManager::take_events`] once it no longer holds any lock on the
//! manager, or calls [`DependencyManager::flush`] when it owns the manager
//! outright. Listeners may therefore call back into the graph.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::definition::DependencyDefinition;
use crate::domain::edge::{Dependency, DependencyOptions};
use crate::domain::error::{FlowError, FlowResult};
use crate::domain::events::{EventBus, EventKind, FlowEvent, Subscription};
use crate::domain::registry::{Connection, DependencyRegistry};
use crate::domain::types::{ConnectionStatus, DataType, DependencyId, InstanceId};

pub struct DependencyManager<P> {
    registry: DependencyRegistry<P>,
    /// Latest value per edge
    values: HashMap<DependencyId, Arc<P>>,
    /// Latest value per (provider, data type), kept for late-binding consumers
    buffers: HashMap<(InstanceId, DataType), Arc<P>>,
    bus: EventBus<P>,
    /// Events raised since the last drain, in emission order
    outbox: Vec<FlowEvent<P>>,
}

impl<P: Send + Sync + 'static> Default for DependencyManager<P> {
    fn default() -> Self {
        Self::new(DependencyRegistry::default())
    }
}

impl<P: Send + Sync + 'static> DependencyManager<P> {
    pub fn new(registry: DependencyRegistry<P>) -> Self {
        Self {
            registry,
            values: HashMap::new(),
            buffers: HashMap::new(),
            bus: EventBus::new(),
            outbox: Vec::new(),
        }
    }

    pub fn registry(&self) -> &DependencyRegistry<P> {
        &self.registry
    }

    pub fn register_definition(&mut self, definition: DependencyDefinition<P>) {
        self.registry.register_definition(definition);
    }

    pub fn bus(&self) -> &EventBus<P> {
        &self.bus
    }

    pub(crate) fn publish(&mut self, event: FlowEvent<P>) {
        self.outbox.push(event);
    }

    /// Hand over the queued events, leaving the queue empty.
    pub fn take_events(&mut self) -> Vec<FlowEvent<P>> {
        std::mem::take(&mut self.outbox)
    }

    /// Dispatch every queued event to the listeners.
    pub fn flush(&mut self) {
        let events = self.take_events();
        let faults = self.bus.publish_all(&events);
        if !faults.is_empty() {
            debug!(count = faults.len(), "listeners faulted during dispatch");
        }
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

    // ---- edges ----

    /// Create (or reuse) an edge. A value the provider already pushed is
    /// delivered right away when the edge accepts pushes.
    pub fn connect(
        &mut self,
        provider_id: &InstanceId,
        consumer_id: &InstanceId,
        data_type: &DataType,
        options: DependencyOptions,
    ) -> FlowResult<DependencyId> {
        let Connection { id, created } =
            self.registry
                .create_dependency(provider_id, consumer_id, data_type, options)?;
        if !created {
            return Ok(id);
        }
        self.publish(FlowEvent::DependencyCreated {
            dependency_id: id,
            provider_id: provider_id.clone(),
            consumer_id: consumer_id.clone(),
            data_type: data_type.clone(),
        });

        let buffered = self
            .buffers
            .get(&(provider_id.clone(), data_type.clone()))
            .cloned();
        let pushes = self
            .registry
            .get(id)
            .is_some_and(Dependency::receives_updates);
        if let Some(value) = buffered
            && pushes
        {
            self.deliver(id, value);
        }
        Ok(id)
    }

    pub fn remove_dependency(&mut self, id: DependencyId) -> bool {
        match self.registry.take_dependency(id) {
            Some(dep) => {
                self.finish_removal(dep);
                true
            }
            None => {
                debug!(id = %id, "remove on unknown dependency");
                false
            }
        }
    }

    /// Remove every edge touching `instance` and drop its provider buffers.
    pub fn remove_dependencies_for_instance(&mut self, instance: &InstanceId) -> usize {
        let removed = self.registry.remove_dependencies_for_instance(instance);
        let count = removed.len();
        for dep in removed {
            self.finish_removal(dep);
        }
        self.buffers.retain(|(provider, _), _| provider != instance);
        count
    }

    fn finish_removal(&mut self, dep: Dependency) {
        self.values.remove(&dep.id);
        if dep.status != ConnectionStatus::Disconnected {
            self.publish(FlowEvent::StatusChanged {
                dependency_id: dep.id,
                provider_id: dep.provider_id.clone(),
                consumer_id: dep.consumer_id.clone(),
                data_type: dep.data_type.clone(),
                from: dep.status,
                to: ConnectionStatus::Disconnected,
            });
        }
        self.publish(FlowEvent::DependencyRemoved {
            dependency_id: dep.id,
            provider_id: dep.provider_id,
            consumer_id: dep.consumer_id,
            data_type: dep.data_type,
        });
    }

    /// Move an edge to `next`, emitting a status change when it actually moves.
    pub(crate) fn transition(
        &mut self,
        id: DependencyId,
        next: ConnectionStatus,
    ) -> FlowResult<ConnectionStatus> {
        let dep = self.registry.get_mut(id).ok_or(FlowError::UnknownEdge(id))?;
        let from = dep.status;
        if from == next {
            return Ok(from);
        }
        if from == ConnectionStatus::CycleDetected {
            debug!(id = %id, to = %next, "edge parked by cycle detection");
            return Err(FlowError::CycleDetected {
                provider: dep.provider_id.clone(),
                consumer: dep.consumer_id.clone(),
            });
        }
        if !from.can_transition_to(next) {
            warn!(id = %id, %from, to = %next, "illegal status transition ignored");
            return Err(FlowError::IllegalTransition {
                dependency: id,
                from,
                to: next,
            });
        }
        dep.status = next;
        let event = FlowEvent::StatusChanged {
            dependency_id: id,
            provider_id: dep.provider_id.clone(),
            consumer_id: dep.consumer_id.clone(),
            data_type: dep.data_type.clone(),
            from,
            to: next,
        };
        debug!(id = %id, %from, to = %next, "status changed");
        self.publish(event);
        Ok(from)
    }

    pub fn suspend(&mut self, id: DependencyId) -> FlowResult<()> {
        self.transition(id, ConnectionStatus::Suspended).map(|_| ())
    }

    /// Resume a suspended edge: READY if it holds a value, CONNECTING otherwise.
    pub fn resume(&mut self, id: DependencyId) -> FlowResult<()> {
        let status = self.status(id).ok_or(FlowError::UnknownEdge(id))?;
        if status != ConnectionStatus::Suspended {
            return Err(FlowError::IllegalTransition {
                dependency: id,
                from: status,
                to: ConnectionStatus::Ready,
            });
        }
        let next = if self.values.contains_key(&id) {
            ConnectionStatus::Ready
        } else {
            ConnectionStatus::Connecting
        };
        self.transition(id, next).map(|_| ())
    }

    pub fn mark_error(&mut self, id: DependencyId) -> FlowResult<()> {
        self.transition(id, ConnectionStatus::Error).map(|_| ())
    }

    // ---- data plane ----

    /// Push a value from `provider_id` on every matching edge.
    ///
    /// The value is always kept as the provider's latest buffered value so a
    /// consumer binding later still receives it. Returns the edges that stored it.
    pub fn update_data(
        &mut self,
        provider_id: &InstanceId,
        data_type: &DataType,
        data: P,
    ) -> Vec<DependencyId> {
        let data = Arc::new(data);
        self.buffers
            .insert((provider_id.clone(), data_type.clone()), Arc::clone(&data));

        let ids = self
            .registry
            .get_dependencies_by_provider_and_type(provider_id, data_type);
        if ids.is_empty() {
            debug!(provider = %provider_id, data_type = %data_type, "no dependents yet, value buffered");
            return Vec::new();
        }

        let mut delivered = Vec::new();
        for id in ids {
            let receives = self
                .registry
                .get(id)
                .is_some_and(Dependency::receives_updates);
            if !receives {
                continue;
            }
            if self.deliver(id, Arc::clone(&data)) {
                delivered.push(id);
            }
        }
        delivered
    }

    /// Consumer-side pull.
    ///
    /// Without an edge one is created and left CONNECTING (or resolved at once
    /// when the provider already pushed). With stored data the edge is confirmed
    /// READY. Otherwise the provider buffer is consulted.
    pub fn request_data(
        &mut self,
        consumer_id: &InstanceId,
        provider_id: &InstanceId,
        data_type: &DataType,
    ) -> FlowResult<DependencyId> {
        let id = match self.registry.find_dependency(provider_id, consumer_id, data_type) {
            Some(dep) => dep.id,
            None => {
                let id = self.connect(
                    provider_id,
                    consumer_id,
                    data_type,
                    DependencyOptions::default(),
                )?;
                if self.values.contains_key(&id) {
                    return Ok(id);
                }
                id
            }
        };

        let Some(dep) = self.registry.get(id) else {
            return Err(FlowError::UnknownEdge(id));
        };
        let (status, pulls) = (dep.status, dep.sync.allows_pull());
        if matches!(
            status,
            ConnectionStatus::CycleDetected | ConnectionStatus::Suspended
        ) {
            debug!(id = %id, %status, "request on parked edge ignored");
            return Ok(id);
        }
        if !pulls && !self.values.contains_key(&id) {
            debug!(id = %id, "edge is push-only, waiting for provider");
            self.transition(id, ConnectionStatus::Connecting)?;
            return Ok(id);
        }

        if self.values.contains_key(&id) {
            // the last payload was rejected; the older stored value does not clear ERROR
            if status == ConnectionStatus::Error {
                debug!(id = %id, "request on errored edge, waiting for an accepted value");
                return Ok(id);
            }
            self.transition(id, ConnectionStatus::Ready)?;
            return Ok(id);
        }

        self.transition(id, ConnectionStatus::Connecting)?;
        let buffered = self
            .buffers
            .get(&(provider_id.clone(), data_type.clone()))
            .cloned();
        if let Some(value) = buffered {
            self.deliver(id, value);
        }
        Ok(id)
    }

    /// Run definition hooks, store the value, move the edge to READY and notify.
    fn deliver(&mut self, id: DependencyId, data: Arc<P>) -> bool {
        let Some(dep) = self.registry.get(id) else {
            return false;
        };
        let catalog = self.registry.catalog();
        let hooks = [
            catalog.get(&dep.provider_definition_id),
            catalog.get(&dep.consumer_definition_id),
        ];

        let mut value = data;
        let mut rejected_by = None;
        for def in hooks.into_iter().flatten() {
            if !def.accepts(&value) {
                rejected_by = Some(def.id.clone());
                break;
            }
            if let Some(transformed) = def.apply_transform(&value) {
                value = Arc::new(transformed);
            }
        }

        if let Some(definition) = rejected_by {
            let err = FlowError::ValidationFailed {
                dependency: id,
                definition: definition.to_string(),
            };
            warn!(error = %err, "payload rejected by validate hook");
            if let Some(dep) = self.registry.get_mut(id) {
                dep.metrics.rejected += 1;
            }
            // ERROR is not reachable from DISCONNECTED, so step through CONNECTING
            if self.status(id) == Some(ConnectionStatus::Disconnected)
                && let Err(e) = self.transition(id, ConnectionStatus::Connecting)
            {
                debug!(error = %e, "edge not moved to CONNECTING");
            }
            if let Err(e) = self.transition(id, ConnectionStatus::Error) {
                debug!(error = %e, "edge not moved to ERROR");
            }
            return false;
        }

        self.values.insert(id, Arc::clone(&value));
        let Some(dep) = self.registry.get_mut(id) else {
            return false;
        };
        dep.record_delivery();
        let notify = dep.notify_on_change;
        let (provider_id, consumer_id, data_type) = (
            dep.provider_id.clone(),
            dep.consumer_id.clone(),
            dep.data_type.clone(),
        );

        if dep.status != ConnectionStatus::Ready
            && let Err(e) = self.transition(id, ConnectionStatus::Ready)
        {
            debug!(error = %e, "edge not moved to READY");
        }
        if notify {
            self.publish(FlowEvent::DataUpdated {
                dependency_id: id,
                provider_id,
                consumer_id,
                data_type,
                data: value,
            });
        }
        true
    }

    // ---- reads ----

    pub fn status(&self, id: DependencyId) -> Option<ConnectionStatus> {
        self.registry.get(id).map(|d| d.status)
    }

    pub fn data_for(&self, id: DependencyId) -> Option<Arc<P>> {
        self.values.get(&id).cloned()
    }

    pub fn buffered(&self, provider_id: &InstanceId, data_type: &DataType) -> Option<Arc<P>> {
        self.buffers
            .get(&(provider_id.clone(), data_type.clone()))
            .cloned()
    }

    /// Most recently delivered value among the consumer's edges for `data_type`.
    pub fn latest_for_consumer(
        &self,
        consumer_id: &InstanceId,
        data_type: &DataType,
    ) -> Option<(DependencyId, Arc<P>)> {
        self.registry
            .get_dependencies_by_consumer_and_type(consumer_id, data_type)
            .into_iter()
            .filter_map(|id| {
                let dep = self.registry.get(id)?;
                let value = self.values.get(&id)?;
                Some((dep.metrics.last_delivery, id, Arc::clone(value)))
            })
            .max_by_key(|(at, id, _)| (*at, *id))
            .map(|(_, id, value)| (id, value))
    }

    pub fn stored_value_count(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::DefinitionCatalog;
    use std::sync::Mutex;

    fn manager() -> DependencyManager<String> {
        let mut catalog = DefinitionCatalog::new();
        catalog.register(DependencyDefinition::provider("list", "EmailList", "email"));
        catalog.register(DependencyDefinition::consumer("detail", "EmailDetail", "email"));
        DependencyManager::new(DependencyRegistry::new(catalog))
    }

    fn ids() -> (InstanceId, InstanceId, DataType) {
        ("list-1".into(), "detail-1".into(), "email".into())
    }

    #[test]
    fn test_update_marks_ready_and_notifies() {
        let mut m = manager();
        let (p, c, t) = ids();
        let id = m.connect(&p, &c, &t, DependencyOptions::default()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = m.on_any(move |e| {
            s.lock().unwrap().push(e.kind());
            Ok(())
        });

        m.flush();
        let delivered = m.update_data(&p, &t, "hello".to_string());
        assert_eq!(delivered, vec![id]);
        assert!(seen.lock().unwrap().is_empty());
        m.flush();
        assert_eq!(m.status(id), Some(ConnectionStatus::Ready));
        assert_eq!(m.data_for(id).as_deref(), Some(&"hello".to_string()));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::StatusChanged, EventKind::DataUpdated]
        );

        // second push: already READY, only data notification
        seen.lock().unwrap().clear();
        m.update_data(&p, &t, "again".to_string());
        m.flush();
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::DataUpdated]);
    }

    #[test]
    fn test_buffer_then_bind_via_request() {
        let mut m = manager();
        let (p, c, t) = ids();
        assert!(m.update_data(&p, &t, "early".to_string()).is_empty());
        let id = m.request_data(&c, &p, &t).unwrap();
        assert_eq!(m.status(id), Some(ConnectionStatus::Ready));
        assert_eq!(m.data_for(id).as_deref(), Some(&"early".to_string()));
    }

    #[test]
    fn test_request_without_data_stays_connecting() {
        let mut m = manager();
        let (p, c, t) = ids();
        let id = m.request_data(&c, &p, &t).unwrap();
        assert_eq!(m.status(id), Some(ConnectionStatus::Connecting));
        m.update_data(&p, &t, "late".to_string());
        assert_eq!(m.status(id), Some(ConnectionStatus::Ready));
    }

    #[test]
    fn test_suspended_edges_skip_updates() {
        let mut m = manager();
        let (p, c, t) = ids();
        let id = m.connect(&p, &c, &t, DependencyOptions::default()).unwrap();
        m.update_data(&p, &t, "one".to_string());
        m.suspend(id).unwrap();
        assert!(m.update_data(&p, &t, "two".to_string()).is_empty());
        assert_eq!(m.data_for(id).as_deref(), Some(&"one".to_string()));
        m.resume(id).unwrap();
        assert_eq!(m.status(id), Some(ConnectionStatus::Ready));
    }

    #[test]
    fn test_suspend_requires_ready() {
        let mut m = manager();
        let (p, c, t) = ids();
        let id = m.connect(&p, &c, &t, DependencyOptions::default()).unwrap();
        assert!(matches!(
            m.suspend(id),
            Err(FlowError::IllegalTransition { .. })
        ));
        assert_eq!(m.suspend(DependencyId(99)), Err(FlowError::UnknownEdge(DependencyId(99))));
    }

    #[test]
    fn test_cycle_edge_never_receives_data() {
        let mut catalog = DefinitionCatalog::new();
        catalog.register(DependencyDefinition::new(
            "relay",
            "Relay",
            "t",
            crate::domain::types::Role::Both,
        ));
        let mut m: DependencyManager<String> = DependencyManager::new(DependencyRegistry::new(catalog));
        let t = DataType::from("t");
        let (a, b) = (InstanceId::from("a"), InstanceId::from("b"));
        m.connect(&a, &b, &t, DependencyOptions::default()).unwrap();
        let back = m.connect(&b, &a, &t, DependencyOptions::default()).unwrap();

        assert!(m.update_data(&b, &t, "loop".to_string()).is_empty());
        assert_eq!(m.status(back), Some(ConnectionStatus::CycleDetected));
        assert!(matches!(
            m.suspend(back),
            Err(FlowError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_remove_clears_value_and_emits_disconnect() {
        let mut m = manager();
        let (p, c, t) = ids();
        let id = m.connect(&p, &c, &t, DependencyOptions::default()).unwrap();
        m.update_data(&p, &t, "x".to_string());
        m.flush();

        let last = Arc::new(Mutex::new(None));
        let l = last.clone();
        let _sub = m.on_status_changed(move |e| {
            if let FlowEvent::StatusChanged { to, .. } = e {
                *l.lock().unwrap() = Some(*to);
            }
            Ok(())
        });

        assert!(m.remove_dependency(id));
        assert!(!m.remove_dependency(id));
        m.flush();
        assert_eq!(m.stored_value_count(), 0);
        assert_eq!(*last.lock().unwrap(), Some(ConnectionStatus::Disconnected));
    }

    #[test]
    fn test_validate_hook_moves_edge_to_error() {
        let mut catalog = DefinitionCatalog::new();
        catalog.register(DependencyDefinition::provider("p", "Src", "n"));
        catalog.register(
            DependencyDefinition::consumer("c", "Dst", "n").with_validate(|v: &i64| *v >= 0),
        );
        let mut m = DependencyManager::new(DependencyRegistry::new(catalog));
        let (p, c, t): (InstanceId, InstanceId, DataType) = ("s".into(), "d".into(), "n".into());
        let id = m.connect(&p, &c, &t, DependencyOptions::default()).unwrap();

        assert!(m.update_data(&p, &t, -1).is_empty());
        assert_eq!(m.status(id), Some(ConnectionStatus::Error));
        assert_eq!(m.registry().get(id).unwrap().metrics.rejected, 1);

        assert_eq!(m.update_data(&p, &t, 4), vec![id]);
        assert_eq!(m.status(id), Some(ConnectionStatus::Ready));
    }

    #[test]
    fn test_request_keeps_error_over_stale_value() {
        let mut catalog = DefinitionCatalog::new();
        catalog.register(DependencyDefinition::provider("p", "Src", "n"));
        catalog.register(
            DependencyDefinition::consumer("c", "Dst", "n").with_validate(|v: &i64| *v >= 0),
        );
        let mut m = DependencyManager::new(DependencyRegistry::new(catalog));
        let (p, c, t): (InstanceId, InstanceId, DataType) = ("s".into(), "d".into(), "n".into());
        let id = m.connect(&p, &c, &t, DependencyOptions::default()).unwrap();

        m.update_data(&p, &t, 1);
        m.update_data(&p, &t, -5);
        assert_eq!(m.status(id), Some(ConnectionStatus::Error));

        assert_eq!(m.request_data(&c, &p, &t), Ok(id));
        assert_eq!(m.status(id), Some(ConnectionStatus::Error));
        assert_eq!(m.data_for(id).as_deref(), Some(&1));

        m.update_data(&p, &t, 2);
        assert_eq!(m.status(id), Some(ConnectionStatus::Ready));
    }

    #[test]
    fn test_events_are_queued_until_drained() {
        let mut m = manager();
        let (p, c, t) = ids();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let _sub = m.on_any(move |_| {
            *h.lock().unwrap() += 1;
            Ok(())
        });

        m.connect(&p, &c, &t, DependencyOptions::default()).unwrap();
        m.update_data(&p, &t, "queued".to_string());
        assert_eq!(*hits.lock().unwrap(), 0);

        let kinds: Vec<EventKind> = m.take_events().iter().map(FlowEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::DependencyCreated,
                EventKind::StatusChanged,
                EventKind::DataUpdated
            ]
        );
        m.flush();
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn test_transforms_run_provider_then_consumer() {
        let mut catalog = DefinitionCatalog::new();
        catalog.register(DependencyDefinition::provider("p", "Src", "n").with_transform(|v: &i64| v + 1));
        catalog.register(DependencyDefinition::consumer("c", "Dst", "n").with_transform(|v: &i64| v * 10));
        let mut m = DependencyManager::new(DependencyRegistry::new(catalog));
        let (p, c, t): (InstanceId, InstanceId, DataType) = ("s".into(), "d".into(), "n".into());
        let id = m.connect(&p, &c, &t, DependencyOptions::default()).unwrap();
        m.update_data(&p, &t, 1);
        assert_eq!(m.data_for(id).as_deref(), Some(&20));
    }

    #[test]
    fn test_notify_on_change_false_suppresses_data_events() {
        let mut m = manager();
        let (p, c, t) = ids();
        let options = DependencyOptions {
            notify_on_change: Some(false),
            ..DependencyOptions::default()
        };
        let id = m.connect(&p, &c, &t, options).unwrap();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let _sub = m.on_data_updated(move |_| {
            *h.lock().unwrap() += 1;
            Ok(())
        });
        m.update_data(&p, &t, "quiet".to_string());
        m.flush();
        assert_eq!(*hits.lock().unwrap(), 0);
        assert_eq!(m.status(id), Some(ConnectionStatus::Ready));
    }

    #[test]
    fn test_connect_delivers_buffered_value() {
        let mut m = manager();
        let (p, c, t) = ids();
        m.update_data(&p, &t, "before".to_string());
        let id = m.connect(&p, &c, &t, DependencyOptions::default()).unwrap();
        assert_eq!(m.status(id), Some(ConnectionStatus::Ready));
        let (latest_id, value) = m.latest_for_consumer(&c, &t).unwrap();
        assert_eq!(latest_id, id);
        assert_eq!(value.as_str(), "before");
    }

    #[test]
    fn test_remove_for_instance_drops_buffers() {
        let mut m = manager();
        let (p, c, t) = ids();
        m.connect(&p, &c, &t, DependencyOptions::default()).unwrap();
        m.update_data(&p, &t, "v".to_string());
        assert_eq!(m.remove_dependencies_for_instance(&p), 1);
        assert!(m.buffered(&p, &t).is_none());
        assert_eq!(m.registry().index_bucket_count(), 0);
    }
}
