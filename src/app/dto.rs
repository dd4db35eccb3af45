use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::definition::DependencyDefinition;
use crate::domain::discovery::{InstanceRegistration, ScanReport};
use crate::domain::edge::{ChainPosition, Dependency};
use crate::domain::types::{ConnectionStatus, InstanceState, Role, SyncStrategy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionDto {
    pub id: String,
    pub owner: String,
    pub data_type: String,
    pub role: Role,
    pub required: bool,
    pub sync: SyncStrategy,
    pub one_to_many: bool,
    pub many_to_one: bool,
    pub allow_multiple: bool,
    pub priority: i32,
    pub has_validate: bool,
    pub has_transform: bool,
}

impl<P> From<&DependencyDefinition<P>> for DefinitionDto {
    fn from(def: &DependencyDefinition<P>) -> Self {
        Self {
            id: def.id.to_string(),
            owner: def.owner.to_string(),
            data_type: def.data_type.to_string(),
            role: def.role,
            required: def.required,
            sync: def.sync,
            one_to_many: def.one_to_many,
            many_to_one: def.many_to_one,
            allow_multiple: def.allow_multiple,
            priority: def.priority,
            has_validate: def.validate.is_some(),
            has_transform: def.transform.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDto {
    pub instance_id: String,
    pub panel_id: String,
    pub component_type: String,
    pub state: InstanceState,
}

impl From<&InstanceRegistration> for InstanceDto {
    fn from(r: &InstanceRegistration) -> Self {
        Self {
            instance_id: r.instance_id.to_string(),
            panel_id: r.panel_id.to_string(),
            component_type: r.component_type.to_string(),
            state: r.state,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyDto {
    pub id: String,
    pub provider_id: String,
    pub consumer_id: String,
    pub data_type: String,
    pub provider_definition_id: String,
    pub consumer_definition_id: String,
    pub status: ConnectionStatus,
    pub sync: SyncStrategy,
    pub active: bool,
    pub auto_update: bool,
    pub notify_on_change: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainPosition>,
    pub updates: u64,
    pub rejected: u64,
    /// Milliseconds since the Unix epoch
    pub last_updated_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl DependencyDto {
    pub fn new(dep: &Dependency, value: Option<serde_json::Value>) -> Self {
        Self {
            id: dep.id.to_string(),
            provider_id: dep.provider_id.to_string(),
            consumer_id: dep.consumer_id.to_string(),
            data_type: dep.data_type.to_string(),
            provider_definition_id: dep.provider_definition_id.to_string(),
            consumer_definition_id: dep.consumer_definition_id.to_string(),
            status: dep.status,
            sync: dep.sync,
            active: dep.active,
            auto_update: dep.auto_update,
            notify_on_change: dep.notify_on_change,
            chain: dep.chain.clone(),
            updates: dep.metrics.updates,
            rejected: dep.metrics.rejected,
            last_updated_ms: epoch_millis(dep.last_updated),
            value,
        }
    }
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Point-in-time view of the whole graph. Output only, never loaded back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub definitions: Vec<DefinitionDto>,
    pub instances: Vec<InstanceDto>,
    pub dependencies: Vec<DependencyDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub suggested: usize,
    pub created: Vec<String>,
    pub rejected: usize,
}

impl From<&ScanReport> for ScanSummary {
    fn from(report: &ScanReport) -> Self {
        Self {
            suggested: report.suggested.len(),
            created: report.created.iter().map(ToString::to_string).collect(),
            rejected: report.rejected,
        }
    }
}

/// One line of the event log printed by `pflow run --events`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub kind: String,
    pub detail: String,
}
