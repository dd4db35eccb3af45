use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::domain::types::{
    ComponentType, ConnectionStatus, DataType, DefinitionId, DependencyId, InstanceId,
    SyncStrategy,
};

/// Position of an edge inside a multi-hop chain (A -> B -> C)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPosition {
    pub chain_id: String,
    pub position: u32,
}

/// Per-edge performance counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeMetrics {
    /// Values stored on this edge
    pub updates: u64,
    /// Values refused by a validate hook
    pub rejected: u64,
    pub last_delivery: Option<SystemTime>,
}

/// Caller-tunable edge options.
///
/// `active`, `auto_update` and `notify_on_change` are `None` unless overridden,
/// in which case the engine-wide defaults apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyOptions {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub auto_update: Option<bool>,
    #[serde(default)]
    pub notify_on_change: Option<bool>,
    /// Narrows provider definition selection to this component type.
    #[serde(default)]
    pub provider_type: Option<ComponentType>,
    /// Narrows consumer definition selection to this component type.
    #[serde(default)]
    pub consumer_type: Option<ComponentType>,
    #[serde(default)]
    pub chain: Option<ChainPosition>,
}

impl DependencyOptions {
    pub fn with_types(provider: ComponentType, consumer: ComponentType) -> Self {
        Self {
            provider_type: Some(provider),
            consumer_type: Some(consumer),
            ..Self::default()
        }
    }
}

/// Resolved flags applied to every edge unless its options override them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeDefaults {
    pub active: bool,
    pub auto_update: bool,
    pub notify_on_change: bool,
}

impl Default for EdgeDefaults {
    fn default() -> Self {
        Self {
            active: true,
            auto_update: true,
            notify_on_change: true,
        }
    }
}

/// A live instance-level binding: one provider, one consumer, one data type.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub id: DependencyId,
    pub provider_id: InstanceId,
    pub consumer_id: InstanceId,
    pub provider_definition_id: DefinitionId,
    pub consumer_definition_id: DefinitionId,
    pub data_type: DataType,
    pub status: ConnectionStatus,
    /// Strategy both endpoint definitions agree on
    pub sync: SyncStrategy,
    pub last_updated: SystemTime,
    pub active: bool,
    pub auto_update: bool,
    pub notify_on_change: bool,
    pub chain: Option<ChainPosition>,
    pub metrics: EdgeMetrics,
}

impl Dependency {
    pub fn connects(&self, provider: &InstanceId, consumer: &InstanceId, data_type: &DataType) -> bool {
        &self.provider_id == provider && &self.consumer_id == consumer && &self.data_type == data_type
    }

    pub fn touches(&self, instance: &InstanceId) -> bool {
        &self.provider_id == instance || &self.consumer_id == instance
    }

    /// Whether a pushed value should be stored on this edge.
    pub fn receives_updates(&self) -> bool {
        self.active && self.auto_update && self.sync.allows_push() && self.status.accepts_data()
    }

    pub(crate) fn record_delivery(&mut self) {
        let now = SystemTime::now();
        self.metrics.updates += 1;
        self.metrics.last_delivery = Some(now);
        self.last_updated = now;
    }
}
