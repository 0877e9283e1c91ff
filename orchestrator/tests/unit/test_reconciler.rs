//! Reconciler worker tests

mod common;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::oneshot;

use arkd::deploy::fsm::InstanceStatus;
use arkd::deploy::registry::CreateInstanceRequest;
use arkd::jobs::BuildStatus;
use arkd::workers::reconciler;

use common::{product_payload, Harness};

fn fast_options() -> reconciler::Options {
    reconciler::Options {
        interval: Duration::from_millis(10),
        initial_delay: Duration::ZERO,
    }
}

fn shutdown_channel() -> (oneshot::Sender<()>, Pin<Box<dyn Future<Output = ()> + Send>>) {
    let (tx, rx) = oneshot::channel::<()>();
    let signal = Box::pin(async move {
        let _ = rx.await;
    });
    (tx, signal)
}

#[tokio::test]
async fn test_worker_advances_instances_until_shutdown() {
    let h = Harness::new();
    h.catalog
        .create(&product_payload("api", Some("web")))
        .await
        .unwrap();
    let instance = h
        .registry
        .create_instance(CreateInstanceRequest {
            product_id: "api".to_string(),
            target_host: "node1".to_string(),
            environment: "PROD".to_string(),
            ssh_user: None,
        })
        .await
        .unwrap();

    let (stop, signal) = shutdown_channel();
    let registry = h.registry.clone();
    let worker = tokio::spawn(async move {
        reconciler::run(&fast_options(), &registry, tokio::time::sleep, signal).await;
    });

    h.jobs.finish_job("deploy-api", BuildStatus::Success);
    let running = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let current = h.registry.get_instance(&instance.id).await.unwrap();
            if current.status() == InstanceStatus::Running {
                return current;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker never reconciled the instance");
    assert_eq!(running.url.as_deref(), Some("http://100.1.2.3:8080/"));

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker ignored shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_worker_stops_during_initial_delay() {
    let h = Harness::new();
    let (stop, signal) = shutdown_channel();
    let registry = h.registry.clone();
    let options = reconciler::Options {
        initial_delay: Duration::from_secs(3600),
        ..fast_options()
    };
    let worker = tokio::spawn(async move {
        reconciler::run(&options, &registry, tokio::time::sleep, signal).await;
    });

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker ignored shutdown")
        .unwrap();
}
