//! JSON scenarios replayed by `pflow run`.
//!
//! A scenario carries an optional engine config, a set of definitions and an
//! ordered list of steps. Payloads are arbitrary JSON values; definitions can
//! declare a `require_fields` validate hook and a `pick` transform hook.

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::app::config::EngineConfig;
use crate::app::dto::{EventRecord, GraphSnapshot, ScanSummary};
use crate::app::engine::FlowEngine;
use crate::domain::definition::DependencyDefinition;
use crate::domain::edge::DependencyOptions;
use crate::domain::error::{FlowError, FlowResult};
use crate::domain::events::FlowEvent;
use crate::domain::types::{DataType, DependencyId, InstanceId, Role, SyncStrategy};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: Option<EngineConfig>,
    #[serde(default)]
    pub definitions: Vec<DefinitionSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse scenario file: {}", path.display()))
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionSpec {
    pub id: String,
    pub owner: String,
    pub data_type: String,
    pub role: Role,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sync: SyncStrategy,
    #[serde(default = "default_true")]
    pub one_to_many: bool,
    #[serde(default = "default_true")]
    pub many_to_one: bool,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default)]
    pub priority: i32,
    /// Payload must be an object carrying all of these keys
    #[serde(default)]
    pub require_fields: Vec<String>,
    /// Keep only these keys of an object payload
    #[serde(default)]
    pub pick: Option<Vec<String>>,
}

impl DefinitionSpec {
    pub fn into_definition(self) -> DependencyDefinition<Value> {
        let mut def = DependencyDefinition::new(self.id, self.owner, self.data_type, self.role)
            .required(self.required)
            .sync(self.sync)
            .one_to_many(self.one_to_many)
            .many_to_one(self.many_to_one)
            .allow_multiple(self.allow_multiple)
            .priority(self.priority);
        if !self.require_fields.is_empty() {
            let fields = self.require_fields;
            def = def.with_validate(move |v: &Value| {
                v.as_object()
                    .is_some_and(|obj| fields.iter().all(|f| obj.contains_key(f)))
            });
        }
        if let Some(keys) = self.pick {
            def = def.with_transform(move |v: &Value| match v.as_object() {
                Some(obj) => Value::Object(
                    obj.iter()
                        .filter(|(k, _)| keys.contains(k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
                None => v.clone(),
            });
        }
        def
    }
}

/// Addresses one edge by its endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeRef {
    pub provider: String,
    pub consumer: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    RegisterDefinition(DefinitionSpec),
    RegisterInstance {
        instance: String,
        panel: String,
        component: String,
    },
    Activate {
        instance: String,
    },
    Deactivate {
        instance: String,
    },
    UnregisterInstance {
        instance: String,
    },
    ClosePanel {
        panel: String,
    },
    Scan,
    AcceptSuggestions,
    Push {
        provider: String,
        data_type: String,
        data: Value,
    },
    Request {
        consumer: String,
        provider: String,
        data_type: String,
    },
    Connect {
        provider: String,
        consumer: String,
        data_type: String,
        #[serde(default)]
        options: DependencyOptions,
    },
    Disconnect(EdgeRef),
    Suspend(EdgeRef),
    Resume(EdgeRef),
}

impl Step {
    fn op(&self) -> &'static str {
        match self {
            Step::RegisterDefinition(_) => "register_definition",
            Step::RegisterInstance { .. } => "register_instance",
            Step::Activate { .. } => "activate",
            Step::Deactivate { .. } => "deactivate",
            Step::UnregisterInstance { .. } => "unregister_instance",
            Step::ClosePanel { .. } => "close_panel",
            Step::Scan => "scan",
            Step::AcceptSuggestions => "accept_suggestions",
            Step::Push { .. } => "push",
            Step::Request { .. } => "request",
            Step::Connect { .. } => "connect",
            Step::Disconnect(_) => "disconnect",
            Step::Suspend(_) => "suspend",
            Step::Resume(_) => "resume",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepOutcome>,
    pub events: Vec<EventRecord>,
    pub graph: GraphSnapshot,
}

impl ScenarioReport {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

/// Build the engine a scenario runs against. `overrides` wins over the
/// scenario's embedded config.
pub fn build_engine(scenario: &Scenario, overrides: Option<EngineConfig>) -> FlowEngine<Value> {
    let config = overrides.or(scenario.config).unwrap_or_default();
    let engine = FlowEngine::new(config);
    for spec in &scenario.definitions {
        engine.register_definition(spec.clone().into_definition());
    }
    engine
}

/// Replay every step. A failing step is recorded and the run continues.
pub fn run_scenario(scenario: &Scenario, engine: &FlowEngine<Value>) -> ScenarioReport {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let subscription = engine.on_any(move |event: &FlowEvent<Value>| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record(event));
        Ok(())
    });

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let op = step.op();
        let outcome = match apply(engine, step) {
            Ok(result) => StepOutcome {
                index,
                op,
                ok: true,
                result,
                error: None,
            },
            Err(e) => {
                warn!(index, op, error = %e, "scenario step failed");
                StepOutcome {
                    index,
                    op,
                    ok: false,
                    result: Value::Null,
                    error: Some(e.to_string()),
                }
            }
        };
        steps.push(outcome);
    }
    subscription.unsubscribe();

    let events = std::mem::take(&mut *events.lock().unwrap_or_else(PoisonError::into_inner));
    debug!(steps = steps.len(), events = events.len(), "scenario finished");
    ScenarioReport {
        steps,
        events,
        graph: engine.snapshot(),
    }
}

fn apply(engine: &FlowEngine<Value>, step: &Step) -> FlowResult<Value> {
    let value = match step {
        Step::RegisterDefinition(spec) => {
            engine.register_definition(spec.clone().into_definition());
            Value::Null
        }
        Step::RegisterInstance {
            instance,
            panel,
            component,
        } => {
            engine.register_instance(instance.as_str(), panel.as_str(), component.as_str());
            Value::Null
        }
        Step::Activate { instance } => {
            engine.set_active(&InstanceId::from(instance.as_str()), true)?;
            Value::Null
        }
        Step::Deactivate { instance } => {
            engine.set_active(&InstanceId::from(instance.as_str()), false)?;
            Value::Null
        }
        Step::UnregisterInstance { instance } => {
            let removed = engine.unregister_instance(&InstanceId::from(instance.as_str()))?;
            serde_json::json!({ "removed_edges": removed })
        }
        Step::ClosePanel { panel } => {
            let closed = engine.close_panel(&panel.as_str().into());
            serde_json::json!({ "closed": closed })
        }
        Step::Scan => json(&ScanSummary::from(&engine.scan())),
        Step::AcceptSuggestions => {
            let mut created = Vec::new();
            for suggestion in engine.pending_suggestions() {
                created.push(engine.accept_suggestion(&suggestion)?.to_string());
            }
            serde_json::json!({ "created": created })
        }
        Step::Push {
            provider,
            data_type,
            data,
        } => {
            let delivered = engine.update_data(
                &provider.as_str().into(),
                &data_type.as_str().into(),
                data.clone(),
            );
            serde_json::json!({ "delivered": ids(&delivered) })
        }
        Step::Request {
            consumer,
            provider,
            data_type,
        } => {
            let id = engine.request_data(
                &consumer.as_str().into(),
                &provider.as_str().into(),
                &data_type.as_str().into(),
            )?;
            edge_state(engine, id)
        }
        Step::Connect {
            provider,
            consumer,
            data_type,
            options,
        } => {
            let id = engine.create_dependency(
                &provider.as_str().into(),
                &consumer.as_str().into(),
                &data_type.as_str().into(),
                options.clone(),
            )?;
            edge_state(engine, id)
        }
        Step::Disconnect(edge) => {
            let id = resolve(engine, edge)?;
            serde_json::json!({ "removed": engine.remove_dependency(id) })
        }
        Step::Suspend(edge) => {
            let id = resolve(engine, edge)?;
            engine.suspend(id)?;
            edge_state(engine, id)
        }
        Step::Resume(edge) => {
            let id = resolve(engine, edge)?;
            engine.resume(id)?;
            edge_state(engine, id)
        }
    };
    Ok(value)
}

fn resolve(engine: &FlowEngine<Value>, edge: &EdgeRef) -> FlowResult<DependencyId> {
    let provider = InstanceId::from(edge.provider.as_str());
    let consumer = InstanceId::from(edge.consumer.as_str());
    let data_type = DataType::from(edge.data_type.as_str());
    engine
        .find_dependency(&provider, &consumer, &data_type)
        .map(|d| d.id)
        .ok_or(FlowError::MissingEdge {
            provider,
            consumer,
            data_type,
        })
}

fn edge_state(engine: &FlowEngine<Value>, id: DependencyId) -> Value {
    serde_json::json!({
        "id": id.to_string(),
        "status": engine.status(id),
    })
}

fn ids(ids: &[DependencyId]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

fn json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn record(event: &FlowEvent<Value>) -> EventRecord {
    let kind = format!("{:?}", event.kind());
    let detail = match event {
        FlowEvent::DataUpdated {
            dependency_id,
            data,
            ..
        } => format!("{dependency_id} <- {data}"),
        FlowEvent::StatusChanged {
            dependency_id,
            from,
            to,
            ..
        } => format!("{dependency_id}: {from} -> {to}"),
        FlowEvent::DependencyCreated {
            dependency_id,
            provider_id,
            consumer_id,
            data_type,
        }
        | FlowEvent::DependencyRemoved {
            dependency_id,
            provider_id,
            consumer_id,
            data_type,
        } => format!("{dependency_id}: {provider_id} -> {consumer_id} ({data_type})"),
        FlowEvent::ConnectionSuggested {
            provider_id,
            consumer_id,
            data_type,
        } => format!("{provider_id} -> {consumer_id} ({data_type})"),
        FlowEvent::InstanceChanged {
            instance_id,
            panel_id,
            state,
        } => format!("{instance_id}@{panel_id}: {state:?}"),
    };
    EventRecord { kind, detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ConnectionStatus;

    const EMAIL: &str = r#"{
        "definitions": [
            {"id": "list", "owner": "EmailList", "data_type": "email", "role": "provider"},
            {"id": "detail", "owner": "EmailDetail", "data_type": "email", "role": "consumer",
             "require_fields": ["id"], "pick": ["id", "subject"]}
        ],
        "steps": [
            {"op": "register_instance", "instance": "list-1", "panel": "left", "component": "EmailList"},
            {"op": "register_instance", "instance": "detail-1", "panel": "right", "component": "EmailDetail"},
            {"op": "activate", "instance": "list-1"},
            {"op": "activate", "instance": "detail-1"},
            {"op": "scan"},
            {"op": "push", "provider": "list-1", "data_type": "email",
             "data": {"id": 7, "subject": "hi", "body": "long"}}
        ]
    }"#;

    #[test]
    fn test_email_scenario_delivers_picked_payload() {
        let scenario: Scenario = serde_json::from_str(EMAIL).unwrap();
        let engine = build_engine(&scenario, None);
        let report = run_scenario(&scenario, &engine);

        assert_eq!(report.failed_steps(), 0);
        let dep = &report.graph.dependencies[0];
        assert_eq!(dep.status, ConnectionStatus::Ready);
        assert_eq!(
            dep.value,
            Some(serde_json::json!({"id": 7, "subject": "hi"}))
        );
        assert!(report.events.iter().any(|e| e.kind == "ConnectionSuggested"));
        assert!(report.events.iter().any(|e| e.kind == "DataUpdated"));
    }

    #[test]
    fn test_rejected_payload_marks_error() {
        let mut scenario: Scenario = serde_json::from_str(EMAIL).unwrap();
        scenario.steps.push(Step::Push {
            provider: "list-1".into(),
            data_type: "email".into(),
            data: serde_json::json!({"subject": "no id"}),
        });
        let engine = build_engine(&scenario, None);
        let report = run_scenario(&scenario, &engine);
        let dep = &report.graph.dependencies[0];
        assert_eq!(dep.status, ConnectionStatus::Error);
        assert_eq!(dep.rejected, 1);
        // last accepted value is retained
        assert_eq!(dep.updates, 1);
    }

    #[test]
    fn test_failing_step_does_not_abort_run() {
        let scenario: Scenario = serde_json::from_str(
            r#"{"steps": [
                {"op": "activate", "instance": "ghost"},
                {"op": "scan"}
            ]}"#,
        )
        .unwrap();
        let engine = build_engine(&scenario, None);
        let report = run_scenario(&scenario, &engine);
        assert_eq!(report.failed_steps(), 1);
        assert!(report.steps[1].ok);
    }
}
