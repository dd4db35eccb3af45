use std::sync::Arc;
use tracing::debug;

use crate::app::engine::FlowEngine;
use crate::domain::edge::Dependency;
use crate::domain::error::FlowResult;
use crate::domain::events::{FlowEvent, Subscription};
use crate::domain::types::{ConnectionStatus, DataType, DependencyId, InstanceId};

pub struct ConsumerHandle<P> {
    engine: FlowEngine<P>,
    instance_id: InstanceId,
    data_type: DataType,
    subscriptions: Vec<Subscription>,
}

pub fn register_consumer_capability<P: Send + Sync + 'static>(
    engine: &FlowEngine<P>,
    instance_id: impl Into<InstanceId>,
    data_type: impl Into<DataType>,
) -> ConsumerHandle<P> {
    let instance_id = instance_id.into();
    let data_type = data_type.into();
    debug!(instance = %instance_id, data_type = %data_type, "consumer capability registered");
    ConsumerHandle {
        engine: engine.clone(),
        instance_id,
        data_type,
        subscriptions: Vec::new(),
    }
}

/// Rank used to fold several edge statuses into one indicator.
fn rank(status: ConnectionStatus) -> u8 {
    match status {
        ConnectionStatus::Ready => 5,
        ConnectionStatus::Connecting => 4,
        ConnectionStatus::Suspended => 3,
        ConnectionStatus::Error => 2,
        ConnectionStatus::CycleDetected => 1,
        ConnectionStatus::Disconnected => 0,
    }
}

impl<P: Send + Sync + 'static> ConsumerHandle<P> {
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    fn edges(&self) -> Vec<Dependency> {
        self.engine
            .dependencies_by_consumer(&self.instance_id)
            .into_iter()
            .filter(|d| d.data_type == self.data_type)
            .collect()
    }

    /// The most recently delivered value across this consumer's edges.
    pub fn current_data(&self) -> Option<Arc<P>> {
        self.engine.with_manager(|m| {
            m.latest_for_consumer(&self.instance_id, &self.data_type)
                .map(|(_, value)| value)
        })
    }

    /// Best status among this consumer's edges, DISCONNECTED when it has none.
    pub fn status(&self) -> ConnectionStatus {
        self.edges()
            .into_iter()
            .map(|d| d.status)
            .max_by_key(|s| rank(*s))
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    /// Pull from every bound provider.
    pub fn request_refresh(&self) -> FlowResult<Vec<DependencyId>> {
        self.edges()
            .into_iter()
            .map(|d| {
                self.engine
                    .request_data(&self.instance_id, &d.provider_id, &self.data_type)
            })
            .collect()
    }

    /// Call `f` with every value delivered to this consumer for its data type.
    pub fn on_change(&mut self, f: impl Fn(&Arc<P>) + Send + Sync + 'static) {
        let (me, dt) = (self.instance_id.clone(), self.data_type.clone());
        let subscription = self.engine.on_data_updated(move |event: &FlowEvent<P>| {
            if let FlowEvent::DataUpdated {
                consumer_id,
                data_type,
                data,
                ..
            } = event
                && consumer_id == &me
                && data_type == &dt
            {
                f(data);
            }
            Ok(())
        });
        self.subscriptions.push(subscription);
    }
}

impl<P> Drop for ConsumerHandle<P> {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}
