mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toolbridge::error::{DiscoveryError, InvocationError, RemoteError, ValidationErrorKind};
use toolbridge::state::{MemoryStore, SqliteStore, Storage};
use toolbridge::types::{Framework, RecordFilter, RecordStatus};
use toolbridge::{BridgeConfig, ToolAdapter};

fn config() -> BridgeConfig {
    BridgeConfig {
        invoke_timeout_ms: 2_000,
        ..BridgeConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_search_is_recorded_once() {
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Reply(json!("hits"))));
    let bridge = bridge_with(config(), Arc::new(MemoryStore::new()));

    let adapters = bridge.discover(source.clone(), "langchain").await.unwrap();
    let tool = adapters[0].as_langchain().unwrap();

    let err = tool.arun(args(json!({}))).await.unwrap_err();
    assert_eq!(err.validation().unwrap().kind, ValidationErrorKind::MissingRequired);
    assert_eq!(source.calls(), 0);

    let records = all_records(&bridge).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Rejected);
    assert!(records[0].is_anomaly);
    assert!(records[0].anomaly_reason.as_deref().unwrap().contains("MISSING_REQUIRED"));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_search_is_silent_when_disabled() {
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Reply(json!("hits"))));
    let bridge = bridge_with(
        BridgeConfig {
            record_rejections: false,
            ..config()
        },
        Arc::new(MemoryStore::new()),
    );

    let adapters = bridge.discover(source.clone(), "crewai").await.unwrap();
    let reply = adapters[0].call(json!({})).await;
    assert!(reply.is_error);
    assert!(matches!(reply.error, Some(InvocationError::Validation(_))));
    assert_eq!(source.calls(), 0);
    assert!(all_records(&bridge).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn string_payload_judged_against_return_type() {
    let source = Arc::new(
        ScriptedSource::new("dummy")
            .tool(lookup_manifest("string"), Script::Reply(json!("42"))),
    );
    let as_string = bridge_with(config(), Arc::new(MemoryStore::new()));
    let adapters = as_string.discover(source, "autogen").await.unwrap();
    let reply = adapters[0].call(json!({"key": "answer"})).await;
    assert_eq!(reply.content, "42");
    assert!(!all_records(&as_string).await[0].is_anomaly);

    let source = Arc::new(
        ScriptedSource::new("dummy")
            .tool(lookup_manifest("number"), Script::Reply(json!("42"))),
    );
    let as_number = bridge_with(config(), Arc::new(MemoryStore::new()));
    let adapters = as_number.discover(source, "autogen").await.unwrap();
    let reply = adapters[0].call(json!({"key": "answer"})).await;
    assert!(!reply.is_error);
    let records = all_records(&as_number).await;
    let record = &records[0];
    assert!(record.is_anomaly);
    assert!(record.anomaly_reason.as_deref().unwrap().contains("return type"));
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_is_a_recorded_anomaly() {
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Hang));
    let bridge = bridge_with(
        BridgeConfig {
            invoke_timeout_ms: 50,
            ..config()
        },
        Arc::new(MemoryStore::new()),
    );
    let adapters = bridge.discover(source, "langchain").await.unwrap();

    let err = adapters[0]
        .as_langchain()
        .unwrap()
        .arun(args(json!({"query": "slow"})))
        .await
        .unwrap_err();
    assert!(matches!(err.cause, InvocationError::Remote(RemoteError::Timeout { after_ms: 50 })));

    let records = all_records(&bridge).await;
    let record = &records[0];
    assert_eq!(record.status, RecordStatus::Timeout);
    assert!(record.is_anomaly);
    assert!(record.anomaly_reason.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_success_is_flagged() {
    let source = Arc::new(
        ScriptedSource::new("dummy")
            .tool(search_manifest(), Script::Delay(Duration::from_millis(60), json!("late"))),
    );
    let bridge = bridge_with(
        BridgeConfig {
            latency_threshold_ms: 10,
            ..config()
        },
        Arc::new(MemoryStore::new()),
    );
    let adapters = bridge.discover(source, "autogen").await.unwrap();
    let reply = adapters[0].call(json!({"query": "x"})).await;
    assert_eq!(reply.content, "late");

    let records = all_records(&bridge).await;
    let record = &records[0];
    assert_eq!(record.status, RecordStatus::Success);
    assert!(record.anomaly_reason.as_deref().unwrap().contains("latency"));
}

#[tokio::test(flavor = "multi_thread")]
async fn coercions_are_recorded() {
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Reply(json!("ok"))));
    let bridge = bridge_with(config(), Arc::new(MemoryStore::new()));
    let adapters = bridge.discover(source, "langchain").await.unwrap();

    adapters[0].call(json!({"query": "x", "limit": "5"})).await;
    let records = all_records(&bridge).await;
    let record = &records[0];
    assert_eq!(record.coercions, vec!["limit".to_string()]);
    assert_eq!(record.input_arguments["limit"], json!(5));
}

async fn concurrent_calls_each_leave_a_record(store: Arc<dyn Storage>) {
    const CALLS: usize = 24;
    let source = Arc::new(
        ScriptedSource::new("dummy")
            .tool(search_manifest(), Script::Delay(Duration::from_millis(5), json!("ok"))),
    );
    let bridge = bridge_with(config(), store);
    let adapter = bridge.discover(source.clone(), "autogen").await.unwrap().remove(0);

    let mut handles = Vec::new();
    for i in 0..CALLS {
        let adapter = adapter.clone();
        handles.push(tokio::spawn(async move {
            adapter.call(json!({"query": format!("q{i}")})).await
        }));
    }
    for handle in handles {
        assert!(!handle.await.unwrap().is_error);
    }

    assert_eq!(source.calls(), CALLS);
    let records = all_records(&bridge).await;
    assert_eq!(records.len(), CALLS);
    assert_eq!(bridge.recorder().storage_failures(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_on_memory_store() {
    concurrent_calls_each_leave_a_record(Arc::new(MemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_on_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("registry.db")).unwrap();
    concurrent_calls_each_leave_a_record(Arc::new(store)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rediscovery_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("registry.db")).unwrap());
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Reply(json!("ok"))));
    let bridge = bridge_with(config(), store);

    let first = bridge.discover(source.clone(), "crewai").await.unwrap();
    let second = bridge.discover(source, "CREWAI").await.unwrap();
    assert!(first[0].same_as(&second[0]));
    assert_eq!(bridge.registry().list_manifests().await.unwrap().len(), 1);

    let manifest = bridge.registry().get_manifest("search").await.unwrap();
    assert_eq!(manifest.source(), "dummy");
    assert_eq!(&manifest.fingerprint(), first[0].fingerprint());
}

#[tokio::test(flavor = "multi_thread")]
async fn discovery_skips_bad_manifests() {
    let source = Arc::new(
        ScriptedSource::new("dummy")
            .tool(search_manifest(), Script::Reply(json!("ok")))
            .tool(
                json!({"name": "broken", "parameters": [{"name": "x", "type": "tuple"}]}),
                Script::Reply(json!("never")),
            )
            .tool(
                json!({"name": "classify", "parameters": [{"name": "class", "type": "string", "required": true}]}),
                Script::Reply(json!("ok")),
            ),
    );
    let bridge = bridge_with(config(), Arc::new(MemoryStore::new()));

    let crew = bridge.discover(source.clone(), "crewai").await.unwrap();
    assert_eq!(crew.len(), 1);
    assert_eq!(crew[0].name(), "search");

    // `class` is only a problem for keyword-argument frameworks.
    let autogen = bridge.discover(source, "autogen").await.unwrap();
    assert_eq!(autogen.len(), 2);
}

#[tokio::test]
async fn unsupported_framework_is_refused() {
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Reply(json!("ok"))));
    let bridge = bridge_with(config(), Arc::new(MemoryStore::new()));
    let err = bridge.discover(source, "semantic-kernel").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::UnsupportedFramework(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn storage_outage_does_not_break_calls() {
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Reply(json!("still works"))));
    let bridge = bridge_with(config(), Arc::new(FailingStore));

    let adapters = bridge.discover(source, "crewai").await.unwrap();
    let tool = adapters[0].as_crewai().unwrap().clone();
    let out = tokio::task::spawn_blocking(move || tool.run(args(json!({"query": "x"}))))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out, "still works");
    assert_eq!(bridge.recorder().storage_failures(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn autogen_cancellation_is_recorded() {
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Hang));
    let bridge = bridge_with(
        BridgeConfig {
            invoke_timeout_ms: 0,
            ..config()
        },
        Arc::new(MemoryStore::new()),
    );
    let adapters = bridge.discover(source, "autogen").await.unwrap();
    let tool = adapters[0].as_autogen().unwrap().clone();

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = tool.run(json!({"query": "x"}), &token).await;
    assert!(result.is_error);
    assert!(result.content.contains("cancelled"));

    let records = all_records(&bridge).await;
    let record = &records[0];
    assert_eq!(record.status, RecordStatus::Cancelled);
    assert!(record.is_anomaly);
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_invocation_is_recorded_as_cancelled() {
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Hang));
    let bridge = bridge_with(
        BridgeConfig {
            invoke_timeout_ms: 0,
            ..config()
        },
        Arc::new(MemoryStore::new()),
    );
    let adapter = bridge.discover(source.clone(), "langchain").await.unwrap().remove(0);

    let task = tokio::spawn(async move { adapter.call(json!({"query": "x"})).await });
    while source.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    task.abort();
    let _ = task.await;

    let mut records = Vec::new();
    for _ in 0..100 {
        records = all_records(&bridge).await;
        if !records.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn feed_and_filters_see_every_framework() {
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Reply(json!("ok"))));
    let bridge = bridge_with(
        BridgeConfig {
            frameworks: Framework::ALL.to_vec(),
            ..config()
        },
        Arc::new(MemoryStore::new()),
    );
    let mut feed = bridge.registry().subscribe();

    let adapters = bridge.discover_configured(source).await.unwrap();
    assert_eq!(adapters.len(), 3);
    for adapter in &adapters {
        assert_eq!(adapter.definition().parameters["title"], "SearchInput");
        adapter.call(json!({"query": "x"})).await;
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(feed.recv().await.unwrap().framework);
    }
    assert_eq!(seen, Framework::ALL.to_vec());

    let crew_only = bridge
        .registry()
        .list_records(RecordFilter::new().framework(Framework::CrewAi))
        .collect()
        .await
        .unwrap();
    assert_eq!(crew_only.len(), 1);

    let stats = bridge.registry().tool_stats("search").await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.anomalies, 0);
}

#[tokio::test]
async fn crewai_call_on_current_thread_runtime_reaches_the_tool() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("registry.db")).unwrap());
    let source = Arc::new(ScriptedSource::new("dummy").tool(search_manifest(), Script::Reply(json!("hits"))));
    let bridge = bridge_with(config(), store);

    let adapters = bridge.discover(source.clone(), "crewai").await.unwrap();
    let reply = adapters[0].call(json!({"query": "cats"})).await;
    assert!(!reply.is_error, "{}", reply.content);
    assert_eq!(reply.content, "hits");

    let rejected = adapters[0].call(json!({})).await;
    assert!(matches!(rejected.error, Some(InvocationError::Validation(_))));

    let tool = adapters[0].as_crewai().unwrap().clone();
    let pooled = tokio::task::spawn_blocking(move || tool.run(args(json!({"query": "dogs"}))))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pooled, "hits");

    assert_eq!(source.calls(), 2);
    let records = all_records(&bridge).await;
    let statuses: Vec<RecordStatus> = records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [RecordStatus::Success, RecordStatus::Rejected, RecordStatus::Success]
    );
    assert_eq!(bridge.recorder().storage_failures(), 0);
}
