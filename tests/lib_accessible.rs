//! Sanity check: library and test common module are accessible.

mod common;

use panel_flow::app::engine::FlowEngine;
use panel_flow::domain::types::{ComponentType, DependencyId};

#[test]
fn test_library_accessible() {
    let engine: FlowEngine<String> = FlowEngine::default();
    assert!(engine.dependencies().is_empty());
    assert!(engine.instances().is_empty());
}

#[test]
fn test_fixture_engine_has_email_definitions() {
    let engine = common::fixtures::email_engine();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.definitions.len(), 2);
    assert_eq!(snapshot.definitions[0].owner, "EmailList");
}

#[test]
fn test_identifier_rendering() {
    assert_eq!(DependencyId(4).to_string(), "dep-4");
    assert!(ComponentType::wildcard().matches(&ComponentType::from("Anything")));
}

#[test]
fn test_recorder_detach() {
    use common::mock::EventRecorder;
    use panel_flow::domain::events::EventKind;

    let engine = common::fixtures::email_engine();
    let recorder = EventRecorder::attach(&engine);
    common::fixtures::mount(&engine, "list-1", "left", "EmailList");
    assert_eq!(recorder.count(EventKind::InstanceChanged), 2);
    recorder.detach();
    common::fixtures::mount(&engine, "list-2", "left", "EmailList");
    assert_eq!(recorder.count(EventKind::InstanceChanged), 2);
}
