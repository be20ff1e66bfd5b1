//! Queue-fed runs.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use ci_healer::config::{StoreBackend, WorkerConfig};
use ci_healer::providers::{Provider, ProviderEnv, ProviderRegistry};
use ci_healer::shutdown::ShutdownSignal;
use ci_healer::storage::NewJob;
use ci_healer::traits::LogSources;
use ci_healer::worker::{Worker, WorkerStats};
use test_case::test_case;

use super::support::{dockerfile_diagnosis, dockerfile_with, Sandbox, StubModel};

fn worker(sandbox: &Sandbox, model: Arc<StubModel>, shutdown: ShutdownSignal) -> Worker {
    let sources: Arc<dyn LogSources> =
        Arc::new(ProviderRegistry::new(ProviderEnv::default()).unwrap());
    Worker::new(
        Arc::new(sandbox.engine(model).with_shutdown(shutdown.clone())),
        Arc::clone(&sandbox.stores.queue),
        sources,
        WorkerConfig {
            dequeue_wait_ms: 50,
            poll_interval_ms: 10,
            max_job_log_chars: 10_000,
        },
        shutdown,
    )
}

#[test_case(StoreBackend::File ; "file backend")]
#[test_case(StoreBackend::Sqlite ; "sqlite backend")]
#[tokio::test]
async fn test_local_job_is_fetched_and_healed(backend: StoreBackend) {
    let sandbox = Sandbox::new(backend).await;
    let model = Arc::new(StubModel::new(
        dockerfile_diagnosis(0.95),
        [dockerfile_with("ENV FIX_APPLIED=true")],
    ));
    sandbox
        .stores
        .queue
        .enqueue(NewJob::new(Provider::Local, "local-simulation"))
        .await
        .unwrap();

    let stats = worker(&sandbox, Arc::clone(&model), ShutdownSignal::new())
        .drain()
        .await;

    assert_eq!(stats, WorkerStats { completed: 1, failed: 0 });
    assert!(sandbox.read("Dockerfile").contains("FIX_APPLIED"));
    assert_eq!(model.diagnoses(), 1);
}

#[tokio::test]
async fn test_missing_provider_env_fails_job_and_continues() {
    let sandbox = Sandbox::new(StoreBackend::File).await;
    let model = Arc::new(StubModel::new(dockerfile_diagnosis(0.2), []));
    let queue = &sandbox.stores.queue;
    queue.enqueue(NewJob::new(Provider::Jenkins, "job/1")).await.unwrap();
    queue
        .enqueue(NewJob::new(Provider::Local, "2").with_logs("npm ERR! 404"))
        .await
        .unwrap();

    let stats = worker(&sandbox, model, ShutdownSignal::new()).drain().await;

    assert_eq!(stats, WorkerStats { completed: 1, failed: 1 });
    assert_eq!(queue.pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_worker_exits_when_shutdown_requested() {
    let sandbox = Sandbox::new(StoreBackend::File).await;
    let shutdown = ShutdownSignal::new();
    let worker = worker(
        &sandbox,
        Arc::new(StubModel::new(dockerfile_diagnosis(0.2), [])),
        shutdown.clone(),
    );

    let handle = tokio::spawn(async move { worker.run().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger();

    let stats = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker should stop")
        .unwrap();
    assert_eq!(stats, WorkerStats::default());
}
