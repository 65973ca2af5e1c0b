//! End-to-end tests for pipeline execution.

use crate::config::PipelineConfig;
use crate::context::MiddlewareContext;
use crate::core::{Asset, GenerationRequest, LifecyclePhase, RunStatus};
use crate::graph::DependencyGraph;
use crate::middleware::{FnMiddleware, Middleware, MiddlewareDefinition, Next};
use crate::pipeline::GenerationPipeline;
use crate::services::{Channel, ConfigMap, MockChannelProvider};
use crate::testing::{
    FailingMiddleware, OutputMiddleware, PanickingMiddleware, PipelineHarness,
    RecordingMiddleware, StoppingMiddleware, TEST_CHANNEL_ID,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn recording(harness: &PipelineHarness, name: &str, phase: LifecyclePhase) -> MiddlewareDefinition {
    MiddlewareDefinition::new(name, Arc::new(RecordingMiddleware::new(name, harness.log.clone())))
        .with_phase(phase)
}

fn stopping(harness: &PipelineHarness, name: &str, phase: LifecyclePhase) -> MiddlewareDefinition {
    MiddlewareDefinition::new(name, Arc::new(StoppingMiddleware::new(name, harness.log.clone())))
        .with_phase(phase)
}

fn failing(name: &str, message: &str, phase: LifecyclePhase) -> MiddlewareDefinition {
    MiddlewareDefinition::new(name, Arc::new(FailingMiddleware::new(name, message))).with_phase(phase)
}

fn config_map(value: serde_json::Value) -> ConfigMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => ConfigMap::new(),
    }
}

/// Captures the merged config it sees for its own name.
#[derive(Debug, Default)]
struct ConfigProbe {
    name: String,
    seen: Mutex<Option<ConfigMap>>,
}

#[async_trait]
impl Middleware for ConfigProbe {
    async fn execute(&self, ctx: &MiddlewareContext, next: Next) -> anyhow::Result<RunStatus> {
        let config = ctx.middleware_config(&self.name).await;
        *self.seen.lock() = config;
        Ok(next.run().await)
    }
}

#[tokio::test]
async fn test_stop_scenario() {
    let harness = PipelineHarness::new();
    harness.register(recording(&harness, "A", LifecyclePhase::Prepare)).unwrap();
    harness
        .register(stopping(&harness, "B", LifecyclePhase::Prepare).after("A"))
        .unwrap();
    harness.register(recording(&harness, "C", LifecyclePhase::Finalize)).unwrap();

    let plan = harness.pipeline().unwrap().validate().unwrap();
    assert_eq!(plan.names(), vec![vec!["A"], vec!["B"], vec!["C"]]);

    let result = harness.run("a cat").await.unwrap();
    assert!(result.success);
    assert_eq!(result.stopped_by.as_deref(), Some("B"));
    assert!(result.error.is_none());
    assert!(harness.log.finished_before("A", "B"));
    assert!(harness.log.ran("C"));
    assert_eq!(harness.events.events_of_type("pipeline.stopped").len(), 1);
}

#[tokio::test]
async fn test_phases_run_in_order() {
    let harness = PipelineHarness::new();
    let phases = [
        ("upload", LifecyclePhase::PostRequest),
        ("connector", LifecyclePhase::Request),
        ("billing", LifecyclePhase::Prepare),
        ("preset", LifecyclePhase::PreRequest),
        ("task", LifecyclePhase::Prepare),
        ("record", LifecyclePhase::Finalize),
    ];
    for (name, phase) in phases {
        harness.register(recording(&harness, name, phase)).unwrap();
    }

    let result = harness.run("x").await.unwrap();
    assert!(result.success);

    for (earlier, later) in [
        ("billing", "preset"),
        ("task", "preset"),
        ("preset", "connector"),
        ("connector", "upload"),
        ("upload", "record"),
    ] {
        assert!(
            harness.log.finished_before(earlier, later),
            "{earlier} should finish before {later} starts"
        );
    }
}

#[tokio::test]
async fn test_unrelated_siblings_order_independent() {
    let run = |config: PipelineConfig| async move {
        let harness = PipelineHarness::new().with_config(config);
        for (name, text) in [("left", "l"), ("right", "r")] {
            harness
                .register(
                    MiddlewareDefinition::new(name, Arc::new(OutputMiddleware::new(Asset::text(text))))
                        .with_phase(LifecyclePhase::Request),
                )
                .unwrap();
        }
        let result = harness.run("x").await.unwrap();
        let mut texts: Vec<String> = result
            .assets()
            .iter()
            .filter_map(|a| a.content.clone())
            .collect();
        texts.sort();
        (result.success, texts)
    };

    let concurrent = run(PipelineConfig::default()).await;
    let serial = run(
        PipelineConfig::new()
            .with_max_level_concurrency(1)
            .with_randomized_order(false),
    )
    .await;

    assert_eq!(concurrent, serial);
    assert_eq!(concurrent, (true, vec!["l".to_string(), "r".to_string()]));
}

#[tokio::test]
async fn test_stop_skips_rest_of_level_and_later_levels() {
    let harness = PipelineHarness::new().with_config(
        PipelineConfig::new()
            .with_max_level_concurrency(1)
            .with_randomized_order(false),
    );
    harness.register(stopping(&harness, "stopper", LifecyclePhase::Prepare)).unwrap();
    harness.register(recording(&harness, "sibling", LifecyclePhase::Prepare)).unwrap();
    harness.register(recording(&harness, "connector", LifecyclePhase::Request)).unwrap();
    harness.register(recording(&harness, "record", LifecyclePhase::Finalize)).unwrap();

    let plan = harness.pipeline().unwrap().validate().unwrap();
    let first_level: Vec<String> = plan.names()[0].clone();
    let stopper_at = first_level.iter().position(|n| n == "stopper").unwrap();

    let result = harness.run("x").await.unwrap();
    assert!(result.success);
    assert_eq!(result.stopped_by.as_deref(), Some("stopper"));

    let skipped = harness.events.middlewares_for("middleware.skipped");
    for name in &first_level[stopper_at + 1..] {
        assert!(!harness.log.ran(name));
        assert!(skipped.contains(name));
    }
    assert!(!harness.log.ran("connector"));
    assert!(harness.log.ran("record"));
}

#[tokio::test]
async fn test_error_halts_but_finalize_runs() {
    let harness = PipelineHarness::new();
    harness
        .register(failing("quota", "quota exceeded", LifecyclePhase::Prepare))
        .unwrap();
    harness.register(recording(&harness, "connector", LifecyclePhase::Request)).unwrap();
    harness
        .register(failing("audit", "audit store offline", LifecyclePhase::Finalize))
        .unwrap();
    harness.register(recording(&harness, "record", LifecyclePhase::Finalize)).unwrap();

    let result = harness.run("x").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("quota exceeded"));
    assert!(!harness.log.ran("connector"));
    assert!(harness.log.ran("record"));
    assert_eq!(harness.events.middlewares_for("pipeline.failed"), vec!["quota"]);
}

#[tokio::test]
async fn test_blank_error_message_is_replaced() {
    let harness = PipelineHarness::new();
    harness.register(failing("broken", "", LifecyclePhase::Request)).unwrap();
    harness.register(recording(&harness, "record", LifecyclePhase::Finalize)).unwrap();

    let result = harness.run("x").await.unwrap();
    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(!error.is_empty());
    assert!(error.contains("broken"));
    assert!(harness.log.ran("record"));
}

#[tokio::test]
async fn test_finalize_sees_recorded_error() {
    let harness = PipelineHarness::new();
    let seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let probe = {
        let seen = Arc::clone(&seen);
        FnMiddleware::new("probe", move |ctx: &MiddlewareContext| {
            *seen.lock() = ctx.error();
            Ok(RunStatus::Continue)
        })
    };

    harness
        .register(failing("connector", "upstream 503", LifecyclePhase::Request))
        .unwrap();
    harness
        .register(MiddlewareDefinition::new("probe", Arc::new(probe)).with_phase(LifecyclePhase::Finalize))
        .unwrap();

    let result = harness.run("x").await.unwrap();
    assert!(!result.success);
    assert_eq!(seen.lock().as_deref(), Some("upstream 503"));
}

#[tokio::test]
async fn test_empty_plan_skips_collaborators() {
    let mut channels = MockChannelProvider::new();
    channels.expect_get_channel().times(0);

    let pipeline = GenerationPipeline::builder(Arc::new(DependencyGraph::new()))
        .channels(Arc::new(channels))
        .build()
        .unwrap();

    let result = pipeline.execute(GenerationRequest::new(7, "x")).await;
    assert!(result.success);
    assert_eq!(result.output, Some(Vec::new()));
}

#[tokio::test]
async fn test_channel_provider_error_fails_cleanly() {
    let mut channels = MockChannelProvider::new();
    channels
        .expect_get_channel()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("database unavailable")));

    let graph = Arc::new(DependencyGraph::new());
    graph
        .register(MiddlewareDefinition::new("noop", Arc::new(crate::middleware::PassThrough)))
        .unwrap();
    let pipeline = GenerationPipeline::builder(graph)
        .channels(Arc::new(channels))
        .build()
        .unwrap();

    let result = pipeline.execute(GenerationRequest::new(7, "x")).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("database unavailable"));
}

#[tokio::test]
async fn test_cycle_fails_request() {
    let harness = PipelineHarness::new();
    harness
        .register(recording(&harness, "A", LifecyclePhase::Request).after("B"))
        .unwrap();
    harness
        .register(recording(&harness, "B", LifecyclePhase::Request).after("A"))
        .unwrap();

    let pipeline = harness.pipeline().unwrap();
    tokio_test::assert_err!(pipeline.validate());

    let result = pipeline.execute(PipelineHarness::request("x")).await;
    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains('A') && error.contains('B'));
    assert!(!harness.log.ran("A"));
    assert_eq!(harness.events.events_of_type("pipeline.failed").len(), 1);
}

#[tokio::test]
async fn test_channel_name_must_be_resolved_first() {
    let harness = PipelineHarness::new();
    harness.register(recording(&harness, "A", LifecyclePhase::Request)).unwrap();

    let pipeline = harness.pipeline().unwrap();
    let result = pipeline.execute(GenerationRequest::new("studio", "x")).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("studio"));
    assert!(!harness.log.ran("A"));
}

#[tokio::test]
async fn test_missing_channel() {
    let harness = PipelineHarness::new();
    harness.register(recording(&harness, "A", LifecyclePhase::Request)).unwrap();

    let result = harness
        .pipeline()
        .unwrap()
        .execute(GenerationRequest::new(404, "x"))
        .await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Channel 404 not found"));
    assert!(!harness.log.ran("A"));

    let lenient = PipelineHarness::new().with_config(PipelineConfig::new().with_require_channel(false));
    lenient.register(recording(&lenient, "A", LifecyclePhase::Request)).unwrap();
    let result = lenient
        .pipeline()
        .unwrap()
        .execute(GenerationRequest::new(404, "x"))
        .await;
    assert!(result.success);
    assert!(lenient.log.ran("A"));
}

#[tokio::test]
async fn test_disabled_middleware_skipped() {
    let harness = PipelineHarness::new();
    harness.register(recording(&harness, "watermark", LifecyclePhase::PostRequest)).unwrap();
    harness.register(recording(&harness, "upload", LifecyclePhase::PostRequest)).unwrap();
    harness.settings.set_enabled("watermark", false);

    let result = harness.run("x").await.unwrap();
    assert!(result.success);
    assert!(!harness.log.ran("watermark"));
    assert!(harness.log.ran("upload"));

    let skipped = harness.events.events_of_type("middleware.skipped");
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].1.as_ref().unwrap()["reason"], "disabled");
}

#[tokio::test]
async fn test_channel_override_disables_middleware() {
    let harness = PipelineHarness::new();
    harness.channels.insert(
        Channel::new(TEST_CHANNEL_ID, "test").with_override("nsfw", config_map(json!({"enabled": false}))),
    );
    harness.register(recording(&harness, "nsfw", LifecyclePhase::PreRequest)).unwrap();

    let result = harness.run("x").await.unwrap();
    assert!(result.success);
    assert!(!harness.log.ran("nsfw"));
}

#[tokio::test]
async fn test_channel_override_merges_config() {
    let harness = PipelineHarness::new();
    harness
        .settings
        .set_config("resize", config_map(json!({"width": 512, "quality": "low"})));
    harness.channels.insert(
        Channel::new(TEST_CHANNEL_ID, "test").with_override("resize", config_map(json!({"quality": "high"}))),
    );

    let probe = Arc::new(ConfigProbe {
        name: "resize".to_string(),
        ..ConfigProbe::default()
    });
    harness
        .register(MiddlewareDefinition::new("resize", probe.clone()).with_phase(LifecyclePhase::PostRequest))
        .unwrap();

    harness.run("x").await.unwrap();
    let seen = probe.seen.lock().clone().unwrap();
    assert_eq!(seen["width"], 512);
    assert_eq!(seen["quality"], "high");
}

#[tokio::test]
async fn test_panic_becomes_error() {
    let harness = PipelineHarness::new();
    harness
        .register(
            MiddlewareDefinition::new("fragile", Arc::new(PanickingMiddleware::new("index out of range")))
                .with_phase(LifecyclePhase::Request),
        )
        .unwrap();
    harness.register(recording(&harness, "record", LifecyclePhase::Finalize)).unwrap();

    let result = harness.run("x").await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("index out of range"));
    assert!(harness.log.ran("record"));
}

#[tokio::test]
async fn test_output_and_task_id_surface() {
    let harness = PipelineHarness::new();
    harness
        .register(
            MiddlewareDefinition::new(
                "task",
                Arc::new(OutputMiddleware::new(Asset::text("ok")).with_task_id(42)),
            )
            .with_phase(LifecyclePhase::Prepare),
        )
        .unwrap();

    let result = harness.run("x").await.unwrap();
    assert!(result.success);
    assert_eq!(result.task_id, Some(42));
    assert_eq!(result.assets().len(), 1);

    harness
        .register(failing("connector", "timeout", LifecyclePhase::Request))
        .unwrap();
    let result = harness.run("x").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.task_id, Some(42));
}

#[tokio::test]
async fn test_services_reach_middlewares() {
    let harness = PipelineHarness::new();
    harness
        .services
        .register_named("greeting", Arc::new(String::from("hello")))
        .unwrap();
    harness
        .register(MiddlewareDefinition::new(
            "greeter",
            Arc::new(FnMiddleware::new("greeter", |ctx: &MiddlewareContext| {
                let greeting = ctx
                    .service_named::<String>("greeting")
                    .ok_or_else(|| anyhow::anyhow!("greeting service missing"))?;
                ctx.push_output(Asset::text(greeting.as_str()));
                Ok(RunStatus::Continue)
            })),
        ))
        .unwrap();

    let result = harness.run("x").await.unwrap();
    assert!(result.success);
    assert_eq!(result.assets()[0].content.as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_lifecycle_events() {
    let harness = PipelineHarness::new();
    harness.register(recording(&harness, "A", LifecyclePhase::Request)).unwrap();

    let result = harness.run("x").await.unwrap();
    assert!(result.success);
    assert_eq!(
        harness.events.event_types(),
        vec![
            "pipeline.started",
            "middleware.started",
            "middleware.completed",
            "pipeline.completed"
        ]
    );

    let (_, data) = &harness.events.events()[0];
    let data = data.as_ref().unwrap();
    assert_eq!(data["channel_id"], TEST_CHANNEL_ID);
    assert!(data["request_id"].is_string());
}
