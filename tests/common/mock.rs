//! Recording listeners for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use panel_flow::app::engine::FlowEngine;
use panel_flow::domain::events::{EventKind, FlowEvent, Subscription};
use panel_flow::domain::types::{ConnectionStatus, DependencyId};

/// Captures every event an engine publishes.
pub struct EventRecorder {
    seen: Arc<Mutex<Vec<(EventKind, Option<DependencyId>, Option<ConnectionStatus>)>>>,
    subscription: Subscription,
}

impl EventRecorder {
    pub fn attach<P: Send + Sync + 'static>(engine: &FlowEngine<P>) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = engine.on_any(move |event: &FlowEvent<P>| {
            let to = match event {
                FlowEvent::StatusChanged { to, .. } => Some(*to),
                _ => None,
            };
            sink.lock().unwrap().push((event.kind(), event.dependency_id(), to));
            Ok(())
        });
        Self { seen, subscription }
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.seen.lock().unwrap().iter().map(|(k, _, _)| *k).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.seen.lock().unwrap().iter().filter(|(k, _, _)| *k == kind).count()
    }

    /// Status targets reached by `id`, in order.
    pub fn statuses(&self, id: DependencyId) -> Vec<ConnectionStatus> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, dep, _)| *dep == Some(id))
            .filter_map(|(_, _, to)| *to)
            .collect()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }

    pub fn detach(&self) {
        self.subscription.unsubscribe();
    }
}
