// Integration tests for end-to-end dispatch scenarios: happy path,
// cancellation, unknown topics, handler retry, two-worker lease exclusivity,
// and timer overwrite.
//
// These exercise a real Redis instance and are gated behind
// TIMER_ENGINE_TEST_REDIS_URL so `cargo test` stays hermetic by default.
// Run with: TIMER_ENGINE_TEST_REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use timer_engine::{Engine, EngineConfig, HandlerError, JsonSchema, Router};

fn redis_url() -> Option<String> {
    let url = std::env::var("TIMER_ENGINE_TEST_REDIS_URL").ok()?;
    let _ = tracing_subscriber::fmt::try_init();
    Some(url)
}

fn unique_config(namespace: &str) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.timeline_key = format!("test_timeline_{namespace}");
    config.payloads_key = format!("test_payloads_{namespace}");
    config.poll_interval = Duration::from_millis(50);
    config.shutdown_grace = Duration::from_millis(200);
    config
}

#[tokio::test]
#[ignore]
async fn happy_path_dispatches_once() {
    let Some(url) = redis_url() else { return };

    let invocations = Arc::new(AtomicUsize::new(0));
    let seen = invocations.clone();

    let mut router = Router::new();
    router
        .register(
            "ping",
            Arc::new(JsonSchema),
            Arc::new(move |payload: serde_json::Value| {
                let seen = seen.clone();
                async move {
                    assert_eq!(payload["msg"], "hi");
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), HandlerError>(())
                }
            }),
        )
        .unwrap();

    let engine = Engine::new(&url, router, unique_config("happy_path")).await.unwrap();
    engine
        .set_timer("ping", "t1", &json!({ "msg": "hi" }), Duration::from_millis(50))
        .await
        .unwrap();

    let run = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_forever().await }
    });

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    engine.stop();
    run.await.unwrap().unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(engine.stats().dispatched, 1);
}

#[tokio::test]
#[ignore]
async fn cancellation_prevents_dispatch() {
    let Some(url) = redis_url() else { return };

    let invocations = Arc::new(AtomicUsize::new(0));
    let seen = invocations.clone();

    let mut router = Router::new();
    router
        .register(
            "ping",
            Arc::new(JsonSchema),
            Arc::new(move |_payload: serde_json::Value| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), HandlerError>(())
                }
            }),
        )
        .unwrap();

    let engine = Engine::new(&url, router, unique_config("cancellation")).await.unwrap();
    engine
        .set_timer("ping", "t2", &json!({ "msg": "x" }), Duration::from_secs(10))
        .await
        .unwrap();
    engine.remove_timer("ping", "t2").await.unwrap();

    let run = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_forever().await }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.stop();
    run.await.unwrap().unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[ignore]
async fn unknown_topic_is_left_for_an_operator() {
    let Some(url) = redis_url() else { return };

    let engine = Engine::new(&url, Router::new(), unique_config("unknown_topic")).await.unwrap();
    engine
        .set_timer("missing", "t3", &json!({}), Duration::from_millis(10))
        .await
        .unwrap();

    let run = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_forever().await }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    engine.stop();
    run.await.unwrap().unwrap();

    assert!(engine.stats().skipped >= 1);
}

#[tokio::test]
#[ignore]
async fn handler_failure_leaves_timer_for_retry() {
    let Some(url) = redis_url() else { return };

    let attempts = Arc::new(AtomicUsize::new(0));
    let counted = attempts.clone();

    let mut router = Router::new();
    router
        .register(
            "flaky",
            Arc::new(JsonSchema),
            Arc::new(move |_payload: serde_json::Value| {
                let counted = counted.clone();
                async move {
                    let n = counted.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err::<(), HandlerError>("boom".into())
                    } else {
                        Ok(())
                    }
                }
            }),
        )
        .unwrap();

    let engine = Engine::new(&url, router, unique_config("retry")).await.unwrap();
    engine
        .set_timer("flaky", "t5", &json!({}), Duration::from_millis(10))
        .await
        .unwrap();

    let run = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_forever().await }
    });

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    engine.stop();
    run.await.unwrap().unwrap();

    assert!(attempts.load(Ordering::SeqCst) >= 2);
    assert_eq!(engine.stats().dispatched, 1);
    assert_eq!(engine.stats().failed, 1);
}

#[tokio::test]
#[ignore]
async fn two_workers_dispatch_a_shared_timer_exactly_once() {
    let Some(url) = redis_url() else { return };

    let invocations = Arc::new(AtomicUsize::new(0));

    let build_engine = || {
        let seen = invocations.clone();
        let mut router = Router::new();
        router
            .register(
                "ping",
                Arc::new(JsonSchema),
                Arc::new(move |_payload: serde_json::Value| {
                    let seen = seen.clone();
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), HandlerError>(())
                    }
                }),
            )
            .unwrap();
        router
    };

    let config = unique_config("two_workers");
    let engine_a = Engine::new(&url, build_engine(), config.clone()).await.unwrap();
    let engine_b = Engine::new(&url, build_engine(), config).await.unwrap();

    engine_a
        .set_timer("ping", "t6", &json!({}), Duration::from_millis(10))
        .await
        .unwrap();

    let run_a = tokio::spawn({
        let engine = engine_a.clone();
        async move { engine.run_forever().await }
    });
    let run_b = tokio::spawn({
        let engine = engine_b.clone();
        async move { engine.run_forever().await }
    });

    tokio::time::sleep(Duration::from_millis(800)).await;
    engine_a.stop();
    engine_b.stop();
    run_a.await.unwrap().unwrap();
    run_b.await.unwrap().unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[ignore]
async fn overwrite_dispatches_the_latest_payload() {
    let Some(url) = redis_url() else { return };

    let observed = Arc::new(std::sync::Mutex::new(None));
    let captured = observed.clone();

    let mut router = Router::new();
    router
        .register(
            "ping",
            Arc::new(JsonSchema),
            Arc::new(move |payload: serde_json::Value| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some(payload);
                    Ok::<(), HandlerError>(())
                }
            }),
        )
        .unwrap();

    let engine = Engine::new(&url, router, unique_config("overwrite")).await.unwrap();
    engine
        .set_timer("ping", "t4", &json!({ "msg": "a" }), Duration::from_secs(10))
        .await
        .unwrap();
    engine
        .set_timer("ping", "t4", &json!({ "msg": "b" }), Duration::from_millis(20))
        .await
        .unwrap();

    let run = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_forever().await }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    engine.stop();
    run.await.unwrap().unwrap();

    assert_eq!(*observed.lock().unwrap(), Some(json!({ "msg": "b" })));
}
