use std::sync::Arc;
use tracing::debug;

use crate::app::engine::FlowEngine;
use crate::domain::events::{EventKind, FlowEvent, Subscription};
use crate::domain::types::{DataType, DependencyId, InstanceId};

/// A consumer started or stopped depending on this provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependentChange {
    Connected(InstanceId),
    Disconnected(InstanceId),
}

type DependentsFn = Arc<dyn Fn(&DependentChange) + Send + Sync>;

/// Hooks a provider component may install.
#[derive(Clone, Default)]
pub struct ProviderCallbacks {
    on_dependents_changed: Option<DependentsFn>,
}

impl ProviderCallbacks {
    pub fn on_dependents_changed(
        mut self,
        f: impl Fn(&DependentChange) + Send + Sync + 'static,
    ) -> Self {
        self.on_dependents_changed = Some(Arc::new(f));
        self
    }
}

pub struct ProviderHandle<P> {
    engine: FlowEngine<P>,
    instance_id: InstanceId,
    data_type: DataType,
    subscriptions: Vec<Subscription>,
}

pub fn register_provider_capability<P: Send + Sync + 'static>(
    engine: &FlowEngine<P>,
    instance_id: impl Into<InstanceId>,
    data_type: impl Into<DataType>,
    callbacks: ProviderCallbacks,
) -> ProviderHandle<P> {
    let instance_id = instance_id.into();
    let data_type = data_type.into();
    let mut subscriptions = Vec::new();

    if let Some(callback) = callbacks.on_dependents_changed {
        for kind in [EventKind::DependencyCreated, EventKind::DependencyRemoved] {
            let (me, dt, cb) = (instance_id.clone(), data_type.clone(), Arc::clone(&callback));
            subscriptions.push(engine.on_event(kind, move |event: &FlowEvent<P>| {
                match event {
                    FlowEvent::DependencyCreated {
                        provider_id,
                        consumer_id,
                        data_type,
                        ..
                    } if provider_id == &me && data_type == &dt => {
                        cb(&DependentChange::Connected(consumer_id.clone()));
                    }
                    FlowEvent::DependencyRemoved {
                        provider_id,
                        consumer_id,
                        data_type,
                        ..
                    } if provider_id == &me && data_type == &dt => {
                        cb(&DependentChange::Disconnected(consumer_id.clone()));
                    }
                    _ => {}
                }
                Ok(())
            }));
        }
    }

    debug!(instance = %instance_id, data_type = %data_type, "provider capability registered");
    ProviderHandle {
        engine: engine.clone(),
        instance_id,
        data_type,
        subscriptions,
    }
}

impl<P: Send + Sync + 'static> ProviderHandle<P> {
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Publish a new value to every dependent. Returns the edges that took it.
    pub fn push_data(&self, data: P) -> Vec<DependencyId> {
        self.engine.update_data(&self.instance_id, &self.data_type, data)
    }

    /// Consumers currently bound to this provider for its data type.
    pub fn list_dependents(&self) -> Vec<InstanceId> {
        let mut dependents: Vec<InstanceId> = self
            .engine
            .dependencies_by_provider(&self.instance_id)
            .into_iter()
            .filter(|d| d.data_type == self.data_type)
            .map(|d| d.consumer_id)
            .collect();
        dependents.sort();
        dependents.dedup();
        dependents
    }
}

impl<P> Drop for ProviderHandle<P> {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::DependencyDefinition;
    use crate::domain::edge::DependencyOptions;
    use std::sync::Mutex;

    fn engine() -> FlowEngine<String> {
        let engine = FlowEngine::default();
        engine.register_definition(DependencyDefinition::provider("list", "EmailList", "email"));
        engine.register_definition(DependencyDefinition::consumer("detail", "EmailDetail", "email"));
        engine
    }

    #[test]
    fn test_dependents_callback_tracks_edges() {
        let engine = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let handle = register_provider_capability(
            &engine,
            "list-1",
            "email",
            ProviderCallbacks::default().on_dependents_changed(move |c| {
                s.lock().unwrap().push(c.clone());
            }),
        );

        let id = engine
            .create_dependency(
                &"list-1".into(),
                &"detail-1".into(),
                &"email".into(),
                DependencyOptions::default(),
            )
            .unwrap();
        assert_eq!(handle.list_dependents(), vec![InstanceId::from("detail-1")]);
        engine.remove_dependency(id);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                DependentChange::Connected("detail-1".into()),
                DependentChange::Disconnected("detail-1".into()),
            ]
        );
        assert!(handle.list_dependents().is_empty());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let engine = engine();
        let before = engine.with_manager(|m| m.bus().listener_count());
        let handle = register_provider_capability(
            &engine,
            "list-1",
            "email",
            ProviderCallbacks::default().on_dependents_changed(|_| {}),
        );
        assert_eq!(engine.with_manager(|m| m.bus().listener_count()), before + 2);
        drop(handle);
        assert_eq!(engine.with_manager(|m| m.bus().listener_count()), before);
    }

    #[test]
    fn test_push_before_dependents_is_buffered() {
        let engine = engine();
        let handle = register_provider_capability(&engine, "list-1", "email", ProviderCallbacks::default());
        assert!(handle.push_data("first".to_string()).is_empty());
        let id = engine
            .create_dependency(
                &"list-1".into(),
                &"detail-1".into(),
                &"email".into(),
                DependencyOptions::default(),
            )
            .unwrap();
        assert_eq!(engine.data_for(id).as_deref(), Some(&"first".to_string()));
    }
}
