// crates/weavecore/tests/graph_model_test.rs

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use weavecore::{
    record, EventBus, ExecutionEvent, NodeEvent, NodeKind, NodeRun, NodeRunUpdate, NodeType,
    RunScope, RunStatus, RunUpdate, Value, Workflow, WorkflowRun,
};

#[test]
fn test_editor_workflow_deserializes() {
    let wf: Workflow = serde_json::from_value(json!({
        "name": "from the editor",
        "nodes": [
            {"id": "t", "type": "text", "position": {"x": 0, "y": 0}, "data": {"label": "Prompt", "text": 42}},
            {"id": "c", "type": "cropImage", "data": {"xPercent": "5", "heightPercent": null}},
            {"id": "s", "type": "sticky", "data": {"note": "hello"}}
        ],
        "edges": [
            {"id": "e", "source": "t", "target": "c", "sourceHandle": null, "targetHandle": "x_percent"}
        ]
    }))
    .unwrap();

    let text = wf.find_node("t").unwrap();
    assert_eq!(text.label.as_deref(), Some("Prompt"));
    assert_eq!(text.kind.persisted_output(), Value::from("42"));

    match &wf.find_node("c").unwrap().kind {
        NodeKind::CropImage(c) => {
            assert_eq!(c.x_percent, Some(5.0));
            assert_eq!(c.height_percent, None);
        }
        other => panic!("unexpected kind {:?}", other),
    }

    let sticky = wf.find_node("s").unwrap();
    assert_eq!(sticky.type_name(), "sticky");
    assert_eq!(sticky.kind.node_type(), None);

    assert_eq!(wf.edges[0].source_handle, "output");
    assert_eq!(wf.edges[0].target_handle, "x_percent");
}

#[test]
fn test_node_type_inside_data_wins() {
    let wf: Workflow = serde_json::from_value(json!({
        "id": Uuid::new_v4(),
        "name": "legacy",
        "nodes": [{"id": "l", "data": {"nodeType": "llm", "userMessage": "hi"}}]
    }))
    .unwrap();
    assert_eq!(wf.nodes[0].kind.node_type(), Some(NodeType::Llm));
}

#[test]
fn test_node_without_type_is_rejected() {
    let result: Result<Workflow, _> = serde_json::from_value(json!({
        "name": "broken",
        "nodes": [{"id": "x", "data": {}}]
    }));
    assert!(result.is_err());
}

#[test]
fn test_sanitize_strips_inline_payloads_only() {
    let mut wf: Workflow = serde_json::from_value(json!({
        "name": "uploads",
        "nodes": [
            {"id": "a", "type": "uploadImage", "data": {"imageUrl": "data:image/png;base64,AAAA"}},
            {"id": "b", "type": "uploadVideo", "data": {"videoUrl": "https://cdn.example.com/v.mp4"}},
            {"id": "c", "type": "custom", "data": {"outputUrl": "data:image/png;base64,BBBB", "keep": 1}}
        ]
    }))
    .unwrap();

    wf.sanitize();

    assert_eq!(wf.find_node("a").unwrap().kind.persisted_output(), Value::from(""));
    assert_eq!(
        wf.find_node("b").unwrap().kind.persisted_output(),
        Value::from("https://cdn.example.com/v.mp4")
    );
    let saved = serde_json::to_value(wf.find_node("c").unwrap()).unwrap();
    assert!(saved["data"].get("outputUrl").is_none());
    assert_eq!(saved["data"]["keep"], json!(1.0));
}

#[test]
fn test_run_lifecycle_updates() {
    let mut run = WorkflowRun::start(Uuid::new_v4(), RunScope::Partial, Some(vec!["a".into(), "b".into()]));
    assert_eq!(run.status, RunStatus::Running);

    let mut node_run = NodeRun::start(run.id, "a".into(), "text".into(), record([("x", Value::from(1.0))]));
    NodeRunUpdate::Failed {
        error: "boom".into(),
        duration_ms: 7,
    }
    .apply(&mut node_run, Utc::now())
    .unwrap();
    assert_eq!(node_run.status, RunStatus::Failed);
    assert_eq!(node_run.error.as_deref(), Some("boom"));
    assert_eq!(node_run.duration, Some(7));
    assert!(node_run.outputs.is_none());

    RunUpdate {
        status: RunStatus::Failed,
        duration_ms: 9,
    }
    .apply(&mut run, Utc::now())
    .unwrap();
    assert!(run.status.is_terminal());
    assert_eq!(run.duration, Some(9));
    assert!(run.completed_at.is_some());

    let wire = serde_json::to_value(&run).unwrap();
    assert_eq!(wire["status"], "FAILED");
    assert_eq!(wire["scope"], "PARTIAL");
    assert_eq!(wire["selectedNodes"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_emitter_tags_events_with_run_and_node() {
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let run_id = Uuid::new_v4();

    let emitter = bus.create_emitter(run_id, "crop".into());
    emitter.info("cropping");
    emitter.warn("source was small");

    for expected in ["cropping", "source was small"] {
        match rx.recv().await.unwrap() {
            ExecutionEvent::NodeEvent {
                run_id: got,
                node_id,
                event,
                ..
            } => {
                assert_eq!(got, run_id);
                assert_eq!(node_id, "crop");
                let message = match event {
                    NodeEvent::Info { message } | NodeEvent::Warning { message } => message,
                };
                assert_eq!(message, expected);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}

#[test]
fn test_emitting_without_subscribers_is_harmless() {
    let bus = EventBus::default();
    bus.create_emitter(Uuid::new_v4(), "n".into()).info("nobody listening");
}
