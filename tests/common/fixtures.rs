//! Engine and scenario fixtures for integration tests.
#![allow(dead_code)]

use std::io::Write;

use panel_flow::app::config::EngineConfig;
use panel_flow::app::engine::FlowEngine;
use panel_flow::domain::definition::DependencyDefinition;
use panel_flow::domain::types::{DataType, InstanceId};
use serde_json::{Value, json};
use tempfile::NamedTempFile;

pub const EMAIL: &str = "email";

/// EmailList provides `email`, EmailDetail consumes it.
pub fn email_engine() -> FlowEngine<Value> {
    email_engine_with(EngineConfig::default())
}

pub fn email_engine_with(config: EngineConfig) -> FlowEngine<Value> {
    let engine = FlowEngine::new(config);
    engine.register_definition(DependencyDefinition::provider("email-list", "EmailList", EMAIL));
    engine.register_definition(DependencyDefinition::consumer("email-detail", "EmailDetail", EMAIL));
    engine
}

/// Register and focus an instance.
pub fn mount(engine: &FlowEngine<Value>, instance: &str, panel: &str, component: &str) {
    engine.register_instance(instance, panel, component);
    engine
        .set_active(&InstanceId::from(instance), true)
        .expect("instance just registered");
}

pub fn email(id: u64) -> Value {
    json!({ "id": id, "subject": format!("message {id}"), "from": "a@example.com" })
}

pub fn iid(s: &str) -> InstanceId {
    InstanceId::from(s)
}

pub fn dt(s: &str) -> DataType {
    DataType::from(s)
}

pub fn scenario_file(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp scenario");
    file.write_all(body.as_bytes()).expect("write scenario");
    file
}

pub const EMAIL_SCENARIO: &str = r#"{
    "definitions": [
        {"id": "email-list", "owner": "EmailList", "data_type": "email", "role": "provider"},
        {"id": "email-detail", "owner": "EmailDetail", "data_type": "email", "role": "consumer"}
    ],
    "steps": [
        {"op": "register_instance", "instance": "list-1", "panel": "left", "component": "EmailList"},
        {"op": "register_instance", "instance": "detail-1", "panel": "right", "component": "EmailDetail"},
        {"op": "activate", "instance": "list-1"},
        {"op": "activate", "instance": "detail-1"},
        {"op": "scan"},
        {"op": "push", "provider": "list-1", "data_type": "email", "data": {"id": 1, "subject": "hello"}}
    ]
}"#;
