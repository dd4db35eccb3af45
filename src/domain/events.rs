//! Typed publish/subscribe for engine notifications.
//!
//! Listeners subscribe per [`EventKind`] or to every event through the separate
//! `subscribe_all` channel. Each listener runs in isolation: an `Err` or a panic
//! is logged as a subscriber fault and the remaining listeners still run.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::error;

use crate::domain::error::FlowError;
use crate::domain::types::{
    ConnectionStatus, DataType, DependencyId, InstanceId, InstanceState, PanelId,
};

pub enum FlowEvent<P> {
    DataUpdated {
        dependency_id: DependencyId,
        provider_id: InstanceId,
        consumer_id: InstanceId,
        data_type: DataType,
        data: Arc<P>,
    },
    StatusChanged {
        dependency_id: DependencyId,
        provider_id: InstanceId,
        consumer_id: InstanceId,
        data_type: DataType,
        from: ConnectionStatus,
        to: ConnectionStatus,
    },
    DependencyCreated {
        dependency_id: DependencyId,
        provider_id: InstanceId,
        consumer_id: InstanceId,
        data_type: DataType,
    },
    DependencyRemoved {
        dependency_id: DependencyId,
        provider_id: InstanceId,
        consumer_id: InstanceId,
        data_type: DataType,
    },
    ConnectionSuggested {
        provider_id: InstanceId,
        consumer_id: InstanceId,
        data_type: DataType,
    },
    InstanceChanged {
        instance_id: InstanceId,
        panel_id: PanelId,
        state: InstanceState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DataUpdated,
    StatusChanged,
    DependencyCreated,
    DependencyRemoved,
    ConnectionSuggested,
    InstanceChanged,
}

impl<P> FlowEvent<P> {
    pub fn kind(&self) -> EventKind {
        match self {
            FlowEvent::DataUpdated { .. } => EventKind::DataUpdated,
            FlowEvent::StatusChanged { .. } => EventKind::StatusChanged,
            FlowEvent::DependencyCreated { .. } => EventKind::DependencyCreated,
            FlowEvent::DependencyRemoved { .. } => EventKind::DependencyRemoved,
            FlowEvent::ConnectionSuggested { .. } => EventKind::ConnectionSuggested,
            FlowEvent::InstanceChanged { .. } => EventKind::InstanceChanged,
        }
    }

    pub fn dependency_id(&self) -> Option<DependencyId> {
        match self {
            FlowEvent::DataUpdated { dependency_id, .. }
            | FlowEvent::StatusChanged { dependency_id, .. }
            | FlowEvent::DependencyCreated { dependency_id, .. }
            | FlowEvent::DependencyRemoved { dependency_id, .. } => Some(*dependency_id),
            _ => None,
        }
    }
}

impl<P> fmt::Debug for FlowEvent<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowEvent::DataUpdated {
                dependency_id,
                data_type,
                ..
            } => write!(f, "DataUpdated({dependency_id}, {data_type})"),
            FlowEvent::StatusChanged {
                dependency_id,
                from,
                to,
                ..
            } => write!(f, "StatusChanged({dependency_id}, {from} -> {to})"),
            FlowEvent::DependencyCreated { dependency_id, .. } => {
                write!(f, "DependencyCreated({dependency_id})")
            }
            FlowEvent::DependencyRemoved { dependency_id, .. } => {
                write!(f, "DependencyRemoved({dependency_id})")
            }
            FlowEvent::ConnectionSuggested {
                provider_id,
                consumer_id,
                data_type,
            } => write!(
                f,
                "ConnectionSuggested({provider_id} -> {consumer_id}, {data_type})"
            ),
            FlowEvent::InstanceChanged {
                instance_id, state, ..
            } => write!(f, "InstanceChanged({instance_id}, {state:?})"),
        }
    }
}

pub type Listener<P> = Arc<dyn Fn(&FlowEvent<P>) -> anyhow::Result<()> + Send + Sync>;

struct BusInner<P> {
    next_id: u64,
    channels: HashMap<EventKind, Vec<(u64, Listener<P>)>>,
    all: Vec<(u64, Listener<P>)>,
}

impl<P> BusInner<P> {
    fn remove(&mut self, id: u64) {
        for listeners in self.channels.values_mut() {
            listeners.retain(|(lid, _)| *lid != id);
        }
        self.channels.retain(|_, listeners| !listeners.is_empty());
        self.all.retain(|(lid, _)| *lid != id);
    }
}

fn lock<P>(inner: &Mutex<BusInner<P>>) -> MutexGuard<'_, BusInner<P>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clones share the same listeners.
pub struct EventBus<P> {
    inner: Arc<Mutex<BusInner<P>>>,
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                channels: HashMap::new(),
                all: Vec::new(),
            })),
        }
    }
}

impl<P: 'static> EventBus<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&FlowEvent<P>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner
                .channels
                .entry(kind)
                .or_default()
                .push((id, Arc::new(listener)));
            id
        };
        self.subscription(id)
    }

    /// Receive every event regardless of kind.
    pub fn subscribe_all<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FlowEvent<P>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.all.push((id, Arc::new(listener)));
            id
        };
        self.subscription(id)
    }

    fn subscription(&self, id: u64) -> Subscription {
        let weak: Weak<Mutex<BusInner<P>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).remove(id);
            }
        })
    }

    /// Deliver `event` to its channel, then to the catch-all channel.
    ///
    /// Listeners are snapshotted first, so a listener may unsubscribe itself or
    /// others without deadlocking. Returns the faults raised by listeners.
    pub fn publish(&self, event: &FlowEvent<P>) -> Vec<FlowError> {
        let listeners: Vec<Listener<P>> = {
            let inner = lock(&self.inner);
            inner
                .channels
                .get(&event.kind())
                .into_iter()
                .flatten()
                .chain(inner.all.iter())
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };

        let mut faults = Vec::new();
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(event)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            error!(event = ?event, %message, "subscriber fault");
            faults.push(FlowError::SubscriberFault {
                event: format!("{event:?}"),
                message,
            });
        }
        faults
    }

    /// Publish a batch in order. Returns the faults raised across the batch.
    pub fn publish_all(&self, events: &[FlowEvent<P>]) -> Vec<FlowError> {
        events.iter().flat_map(|event| self.publish(event)).collect()
    }

    pub fn listener_count(&self) -> usize {
        let inner = lock(&self.inner);
        inner.channels.values().map(Vec::len).sum::<usize>() + inner.all.len()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}

/// Handle returned by every subscribe call.
///
/// `unsubscribe` may be called any number of times, including after the bus
/// (or the engine owning it) has been dropped.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    pub fn unsubscribe(&self) {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn suggested() -> FlowEvent<()> {
        FlowEvent::ConnectionSuggested {
            provider_id: "p".into(),
            consumer_id: "c".into(),
            data_type: "t".into(),
        }
    }

    #[test]
    fn test_kind_channel_and_catch_all() {
        let bus = EventBus::<()>::new();
        let kind_hits = Arc::new(AtomicUsize::new(0));
        let all_hits = Arc::new(AtomicUsize::new(0));
        let k = kind_hits.clone();
        let _s1 = bus.subscribe(EventKind::ConnectionSuggested, move |_| {
            k.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let a = all_hits.clone();
        let _s2 = bus.subscribe_all(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let _s3 = bus.subscribe(EventKind::DataUpdated, |_| panic!("wrong channel"));

        assert!(bus.publish(&suggested()).is_empty());
        assert_eq!(kind_hits.load(Ordering::SeqCst), 1);
        assert_eq!(all_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_faulty_listeners_are_isolated() {
        let bus = EventBus::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _s1 = bus.subscribe_all(|_| Err(anyhow::anyhow!("boom")));
        let _s2 = bus.subscribe_all(|_| panic!("kaboom"));
        let h = hits.clone();
        let _s3 = bus.subscribe_all(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let faults = bus.publish(&suggested());
        assert_eq!(faults.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        match &faults[1] {
            FlowError::SubscriberFault { message, .. } => assert_eq!(message, "kaboom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::<()>::new();
        let sub = bus.subscribe(EventKind::DataUpdated, |_| Ok(()));
        assert_eq!(bus.listener_count(), 1);
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(bus.listener_count(), 0);
        assert!(!sub.is_active());
    }

    #[test]
    fn test_listener_may_subscribe_during_publish() {
        let bus = EventBus::<()>::new();
        let handle = bus.clone();
        let added = Arc::new(Mutex::new(Vec::new()));
        let sink = added.clone();
        let _s = bus.subscribe_all(move |_| {
            sink.lock().unwrap().push(handle.subscribe_all(|_| Ok(())));
            Ok(())
        });

        assert!(bus.publish_all(&[suggested(), suggested()]).is_empty());
        assert_eq!(added.lock().unwrap().len(), 2);
        assert_eq!(bus.listener_count(), 3);
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus = EventBus::<()>::new();
        let sub = bus.subscribe_all(|_| Ok(()));
        drop(bus);
        sub.unsubscribe();
    }
}
