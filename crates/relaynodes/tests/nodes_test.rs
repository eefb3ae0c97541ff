// crates/relaynodes/tests/nodes_test.rs

use relaycore::{
    ErrorKind, EventBus, ExecutionId, NodeError, NodeSpec, Payload, Processor, ProcessorContext,
    RegistryError, RunStatus, Workflow,
};
use relaynodes::*;
use relayruntime::{NodeRegistry, RelayRuntime, RuntimeConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// Helper function to create a test context
fn create_test_context(input: Payload, config: Payload) -> ProcessorContext {
    let event_bus = Arc::new(EventBus::new(100));
    let execution_id = ExecutionId::new_v4();
    let mut ctx = ProcessorContext::new(
        "node",
        event_bus.create_emitter(execution_id, "node".to_string()),
    )
    .with_input(input);
    if let Payload::Object(config) = config {
        ctx.config = config;
    }
    ctx
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("relay-{}-{}", uuid::Uuid::new_v4(), name))
}

#[test]
fn test_register_all_is_complete_and_unique() {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry).unwrap();

    assert_eq!(registry.len(), 12);
    for name in ["input_user", "llm_stub", "output_text", "http_request", "debug_log"] {
        assert!(registry.contains(name), "missing {}", name);
    }

    let err = register_all(&mut registry).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateRegistration(_)));
}

#[test]
fn test_describe_lists_schemas() {
    let registry = default_registry().unwrap();
    let info = registry.describe();

    let output_file = info.iter().find(|i| i.name == "output_file").unwrap();
    assert_eq!(output_file.metadata.category, "output");
    let described = serde_json::to_value(&output_file.schema).unwrap();
    assert!(described.to_string().contains("path"));
}

#[tokio::test]
async fn test_chat_workflow_completes_without_plugin_host() {
    // Nothing listens here; the run must never need it
    let config = RuntimeConfig {
        plugin_host: relayruntime::PluginHostConfig::new("http://127.0.0.1:9"),
        ..RuntimeConfig::default()
    };
    let runtime = RelayRuntime::new(default_registry().unwrap(), config);

    let mut wf = Workflow::new("chat");
    wf.add_node(NodeSpec::new("a", "input_user"));
    wf.add_node(NodeSpec::new("b", "llm_stub").with_config("model", "echo-1"));
    wf.add_node(
        NodeSpec::new("c", "output_text")
            .with_config("field", "response")
            .with_config("template", "Answer: {{input}}"),
    );
    wf.connect("a", "b");
    wf.connect("b", "c");

    let outcome = runtime
        .execute(&wf, json!({"query": "what is relay?"}))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.succeeded(), 3);
    assert_eq!(
        outcome.output("c"),
        Some(&json!({"text": "Answer: [echo-1] what is relay?"}))
    );
}

#[tokio::test]
async fn test_user_input_default_and_required() {
    let ctx = create_test_context(Payload::Null, json!({"default": {"q": "fallback"}}));
    assert_eq!(UserInputProcessor.execute(ctx).await.unwrap(), json!({"q": "fallback"}));

    let ctx = create_test_context(Payload::Null, json!({"required": true}));
    assert!(matches!(
        UserInputProcessor.execute(ctx).await,
        Err(NodeError::MissingInput(_))
    ));

    let ctx = create_test_context(json!("given"), json!({"default": "unused"}));
    assert_eq!(UserInputProcessor.execute(ctx).await.unwrap(), json!("given"));
}

#[tokio::test]
async fn test_file_round_trip() {
    let path = temp_path("out.json");
    let path_str = path.to_string_lossy().to_string();

    let ctx = create_test_context(json!({"pages": 3}), json!({"path": path_str}));
    let written = FileOutputProcessor.execute(ctx).await.unwrap();
    assert_eq!(written["path"], json!(path_str));

    let ctx = create_test_context(Payload::Null, json!({"path": path_str, "format": "json"}));
    let read = FileInputProcessor.execute(ctx).await.unwrap();
    assert_eq!(read["content"], json!({"pages": 3}));

    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn test_file_output_appends() {
    let path = temp_path("log.txt");
    let path_str = path.to_string_lossy().to_string();

    for line in ["one\n", "two\n"] {
        let ctx = create_test_context(json!(line), json!({"path": path_str, "append": true}));
        FileOutputProcessor.execute(ctx).await.unwrap();
    }

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn test_missing_file_is_execution_error() {
    let ctx = create_test_context(json!({"path": "/definitely/not/here.txt"}), json!({}));
    let err = FileInputProcessor.execute(ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionError);
}

#[tokio::test]
async fn test_text_transform_operations() {
    let cases = [
        (json!({"operation": "uppercase"}), json!({"text": "HELLO WORLD"})),
        (json!({"operation": "reverse"}), json!({"text": "dlrow olleh"})),
        (
            json!({"operation": "replace", "from": "world", "to": "relay"}),
            json!({"text": "hello relay"}),
        ),
        (
            json!({"operation": "split", "separator": " "}),
            json!({"parts": ["hello", "world"], "count": 2}),
        ),
        (json!({"operation": "length"}), json!({"length": 11, "words": 2})),
    ];

    for (config, expected) in cases {
        let ctx = create_test_context(json!({"text": "hello world"}), config.clone());
        let output = TextTransformProcessor.execute(ctx).await.unwrap();
        assert_eq!(output, expected, "config {}", config);
    }
}

#[tokio::test]
async fn test_text_transform_rejects_unknown_operation() {
    let processor = TextTransformProcessor;
    let config = json!({"operation": "shout"});
    let err = processor
        .validate_config(config.as_object().unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
}

#[tokio::test]
async fn test_json_parse_and_stringify() {
    let ctx = create_test_context(json!(r#"{"a": [1, 2]}"#), json!({}));
    assert_eq!(JsonParseProcessor.execute(ctx).await.unwrap(), json!({"a": [1, 2]}));

    let ctx = create_test_context(json!({"json": "not json"}), json!({}));
    assert!(JsonParseProcessor.execute(ctx).await.is_err());

    let ctx = create_test_context(json!({"a": 1}), json!({"pretty": false}));
    assert_eq!(
        JsonStringifyProcessor.execute(ctx).await.unwrap(),
        json!({"json": r#"{"a":1}"#})
    );
}

#[tokio::test]
async fn test_data_transform_pick_rename_set() {
    let ctx = create_test_context(
        json!({"title": "Invoice", "pages": 3, "author": "n/a"}),
        json!({
            "pick": ["title", "pages"],
            "rename": {"pages": "page_count"},
            "set": {"source": "relay"}
        }),
    );

    let output = DataTransformProcessor.execute(ctx).await.unwrap();
    assert_eq!(
        output,
        json!({"title": "Invoice", "page_count": 3, "source": "relay"})
    );

    let ctx = create_test_context(json!([1, 2]), json!({}));
    assert!(matches!(
        DataTransformProcessor.execute(ctx).await,
        Err(NodeError::InvalidInputType { .. })
    ));
}

#[tokio::test]
async fn test_http_request_posts_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/hooks/ingest")
        .match_header("x-token", "secret")
        .match_body(mockito::Matcher::Json(json!({"doc": 7})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accepted": true}"#)
        .create_async()
        .await;

    let ctx = create_test_context(
        json!({"body": {"doc": 7}}),
        json!({
            "url": format!("{}/hooks/ingest", server.url()),
            "method": "POST",
            "headers": {"x-token": "secret"}
        }),
    );

    let output = HttpRequestProcessor::new().execute(ctx).await.unwrap();
    assert_eq!(output["status"], json!(201));
    assert_eq!(output["json"], json!({"accepted": true}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_delay_passes_input_and_honours_cancellation() {
    let ctx = create_test_context(json!({"k": "v"}), json!({"delay_ms": 5}));
    assert_eq!(DelayProcessor.execute(ctx).await.unwrap(), json!({"k": "v"}));

    let ctx = create_test_context(json!({}), json!({"delay_ms": 60_000}));
    let token = ctx.cancellation.clone();
    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(1), DelayProcessor.execute(ctx))
        .await
        .expect("delay must stop when cancelled");
    assert!(matches!(result, Err(NodeError::Cancelled)));
}

#[tokio::test]
async fn test_debug_log_emits_node_event() {
    let event_bus = EventBus::new(16);
    let mut rx = event_bus.subscribe();
    let ctx = ProcessorContext::new(
        "dbg",
        event_bus.create_emitter(ExecutionId::new_v4(), "dbg".to_string()),
    )
    .with_input(json!({"x": 1}))
    .with_config("message", "checkpoint");

    let output = DebugLogProcessor.execute(ctx).await.unwrap();

    assert_eq!(output, json!({"x": 1}));
    let event = rx.try_recv().unwrap();
    assert!(serde_json::to_string(&event).unwrap().contains("checkpoint"));
}

#[tokio::test]
async fn test_unknown_business_name_is_not_core() {
    let runtime = RelayRuntime::new(default_registry().unwrap(), RuntimeConfig::default());
    let mut wf = Workflow::new("business");
    wf.add_node(NodeSpec::new("parse", "FileParsingProcessor"));

    let outcome = runtime.execute(&wf, json!({})).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    match outcome.result("parse") {
        Some(relaycore::NodeResult::Failed { kind, message }) => {
            assert_eq!(*kind, ErrorKind::UnresolvedProcessor);
            assert!(message.contains("input_user"), "lists core processors: {}", message);
            assert!(message.contains("plugin binding"));
        }
        other => panic!("expected unresolved processor, got {:?}", other),
    }
}

#[tokio::test]
async fn test_delay_reports_progress() {
    let event_bus = EventBus::new(16);
    let mut rx = event_bus.subscribe();
    let ctx = ProcessorContext::new(
        "wait",
        event_bus.create_emitter(ExecutionId::new_v4(), "wait".to_string()),
    )
    .with_config("delay_ms", 10);

    DelayProcessor.execute(ctx).await.unwrap();

    let mut percents = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let relaycore::ExecutionEvent::NodeEvent {
            event: relaycore::NodeEvent::Progress { percent, .. },
            ..
        } = event
        {
            percents.push(percent);
        }
    }
    assert_eq!(percents, vec![50.0, 100.0]);
}
