//! Deployment registry tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use arkd::deploy::fsm::InstanceStatus;
use arkd::deploy::registry::{
    CreateInstanceRequest, DeploymentRegistry, RegisterInstance, RegistryOptions,
};
use arkd::errors::ArkError;
use arkd::filesys::file::File;
use arkd::jobs::BuildStatus;

use common::{node, product_payload, Harness};

fn request(product: &str, host: &str, env: &str) -> CreateInstanceRequest {
    CreateInstanceRequest {
        product_id: product.to_string(),
        target_host: host.to_string(),
        environment: env.to_string(),
        ssh_user: None,
    }
}

async fn harness_with_api(web_service: Option<&str>) -> Harness {
    let h = Harness::new();
    h.catalog
        .create(&product_payload("api", web_service))
        .await
        .unwrap();
    h
}

// ================================ CREATE ================================= //

#[tokio::test]
async fn test_create_then_get_is_provisioning() {
    let h = harness_with_api(Some("web")).await;

    let created = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();

    let fetched = h.registry.get_instance(&created.id).await.unwrap();
    assert_eq!(fetched.status(), InstanceStatus::Provisioning);
    assert!(!fetched.build_id.is_empty());
    assert_eq!(fetched.job_name, "deploy-api");
    assert_eq!(fetched.device_id, "node1");
    assert!(fetched.url.is_none());
    assert_eq!(
        fetched.builds.get("deploy-api"),
        Some(&fetched.build_id)
    );
}

#[tokio::test]
async fn test_create_passes_job_parameters() {
    let h = harness_with_api(Some("web")).await;
    let instance = h
        .registry
        .create_instance(request("api", "node1", "prod"))
        .await
        .unwrap();

    let triggered = h.jobs.triggered();
    assert_eq!(triggered.len(), 1);
    let params = &triggered[0].params;
    assert_eq!(params["INSTANCE_ID"], instance.id);
    assert_eq!(params["PRODUCT_ID"], "api");
    assert_eq!(params["ENV"], "prod");
    assert_eq!(params["TARGET_HOST"], "100.1.2.3");
    assert_eq!(params["SSH_USER"], "root");
    assert_eq!(
        params["ARK_CALLBACK_URL"],
        "http://ark.test:5050/api/instances/register"
    );
    assert_eq!(params["WEB_SERVICE"], "web");
    assert_eq!(params["WEB_PORT"], "8080");
}

#[tokio::test]
async fn test_create_uses_ssh_user_override() {
    let h = harness_with_api(None).await;
    h.ssh_users.set("100.1.2.3", "ubuntu").await.unwrap();

    let instance = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();
    assert_eq!(instance.ssh_user, "ubuntu");
    assert_eq!(h.jobs.triggered()[0].params["SSH_USER"], "ubuntu");

    // An explicit user wins over the map
    let mut explicit = request("api", "node1", "PROD");
    explicit.ssh_user = Some("pi".to_string());
    h.registry.delete_instance(&instance.id, true).await.unwrap();
    let instance = h.registry.create_instance(explicit).await.unwrap();
    assert_eq!(instance.ssh_user, "pi");
}

#[tokio::test]
async fn test_create_rejects_offline_and_unknown_hosts() {
    let h = harness_with_api(None).await;

    assert!(matches!(
        h.registry
            .create_instance(request("api", "node2", "PROD"))
            .await,
        Err(ArkError::InvalidArgument(_))
    ));
    assert!(matches!(
        h.registry
            .create_instance(request("api", "node9", "PROD"))
            .await,
        Err(ArkError::NotFound(_))
    ));

    assert!(h.registry.list_instances().await.is_empty());
    assert!(h.jobs.triggered().is_empty());
}

#[tokio::test]
async fn test_create_validation() {
    let h = harness_with_api(None).await;

    for (req, what) in [
        (request("api", "node1", "STAGING"), "environment"),
        (request("", "node1", "PROD"), "product"),
        (request("api", " ", "PROD"), "host"),
        // No DEV job configured
        (request("api", "node1", "DEV"), "deploy job"),
    ] {
        assert!(
            matches!(
                h.registry.create_instance(req).await,
                Err(ArkError::InvalidArgument(_))
            ),
            "{}",
            what
        );
    }

    assert!(matches!(
        h.registry
            .create_instance(request("missing", "node1", "PROD"))
            .await,
        Err(ArkError::NotFound(_))
    ));

    let mut bad_user = request("api", "node1", "PROD");
    bad_user.ssh_user = Some("root; rm -rf /".to_string());
    assert!(matches!(
        h.registry.create_instance(bad_user).await,
        Err(ArkError::InvalidArgument(_))
    ));

    assert!(h.registry.list_instances().await.is_empty());
    assert!(h.jobs.triggered().is_empty());
}

#[tokio::test]
async fn test_trigger_failure_leaves_no_record() {
    let h = harness_with_api(None).await;
    h.jobs.set_fail_triggers(true);

    assert!(matches!(
        h.registry
            .create_instance(request("api", "node1", "PROD"))
            .await,
        Err(ArkError::Unavailable(_))
    ));
    assert!(h.registry.list_instances().await.is_empty());

    // The target is free again afterwards
    h.jobs.set_fail_triggers(false);
    h.registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_one_live_instance_per_target() {
    let h = harness_with_api(None).await;
    h.registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();

    assert!(matches!(
        h.registry
            .create_instance(request("api", "node1", "production"))
            .await,
        Err(ArkError::Conflict(_))
    ));
    assert_eq!(h.jobs.trigger_count("deploy-api"), 1);
}

#[tokio::test]
async fn test_concurrent_creates_trigger_once() {
    let h = harness_with_api(None).await;
    h.jobs.set_trigger_delay(Duration::from_millis(50));

    let (a, b) = tokio::join!(
        h.registry.create_instance(request("api", "node1", "PROD")),
        h.registry.create_instance(request("api", "node1", "PROD")),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert!(matches!(a.err().or(b.err()), Some(ArkError::Conflict(_))));
    assert_eq!(h.jobs.trigger_count("deploy-api"), 1);
    assert_eq!(h.registry.list_instances().await.len(), 1);
}

#[tokio::test]
async fn test_aliases_of_one_host_share_a_slot() {
    let h = harness_with_api(None).await;
    let first = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();
    assert_eq!(first.target_device.as_deref(), Some("id-node1"));
    assert_eq!(first.target_address, "100.1.2.3");

    for alias in ["100.1.2.3", "NODE1", "id-node1", "node1.tail1234.ts.net"] {
        assert!(
            matches!(
                h.registry
                    .create_instance(request("api", alias, "PROD"))
                    .await,
                Err(ArkError::Conflict(_))
            ),
            "{}",
            alias
        );
    }
    assert_eq!(h.jobs.trigger_count("deploy-api"), 1);
    assert_eq!(h.registry.list_instances().await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_creates_through_aliases_trigger_once() {
    let h = harness_with_api(None).await;
    h.jobs.set_trigger_delay(Duration::from_millis(50));

    let (a, b) = tokio::join!(
        h.registry.create_instance(request("api", "node1", "PROD")),
        h.registry.create_instance(request("api", "100.1.2.3", "PROD")),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert!(matches!(a.err().or(b.err()), Some(ArkError::Conflict(_))));
    assert_eq!(h.jobs.trigger_count("deploy-api"), 1);
}

#[tokio::test]
async fn test_failed_instance_does_not_block_redeploy() {
    let h = harness_with_api(None).await;
    let first = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();

    h.jobs.finish_job("deploy-api", BuildStatus::Failed);
    h.registry.reconcile().await;

    let failed = h.registry.get_instance(&first.id).await.unwrap();
    assert_eq!(failed.status(), InstanceStatus::Failed);
    assert!(failed.fsm.error().is_some_and(|e| e.contains("deploy-api")));

    h.registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();
    assert_eq!(h.registry.list_instances().await.len(), 2);
}

// =============================== RECONCILE =============================== //

#[tokio::test]
async fn test_job_success_runs_with_url() {
    let h = harness_with_api(Some("web")).await;
    let instance = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();

    // Still queued: nothing changes
    h.registry.reconcile().await;
    assert_eq!(
        h.registry.get_instance(&instance.id).await.unwrap().status(),
        InstanceStatus::Provisioning
    );

    h.jobs.finish_job("deploy-api", BuildStatus::Success);
    h.registry.reconcile().await;

    let running = h.registry.get_instance(&instance.id).await.unwrap();
    assert_eq!(running.status(), InstanceStatus::Running);
    assert_eq!(running.url.as_deref(), Some("http://100.1.2.3:8080/"));
}

#[tokio::test]
async fn test_job_success_without_web_service_has_no_url() {
    let h = harness_with_api(None).await;
    let instance = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();

    h.jobs.finish_job("deploy-api", BuildStatus::Success);
    h.registry.reconcile().await;

    let running = h.registry.get_instance(&instance.id).await.unwrap();
    assert_eq!(running.status(), InstanceStatus::Running);
    assert!(running.url.is_none());
}

#[tokio::test]
async fn test_scenario_api_on_node1_prod() {
    let h = Harness::with_nodes(vec![node("node1", "100.1.2.3", true)]);
    h.catalog
        .create(&product_payload("api", Some("web")))
        .await
        .unwrap();

    let instance = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();
    assert_eq!(instance.status(), InstanceStatus::Provisioning);
    assert_eq!(h.jobs.triggered()[0].params["TARGET_HOST"], "100.1.2.3");

    h.jobs.finish_job("deploy-api", BuildStatus::Success);
    h.registry.reconcile().await;

    let instance = h.registry.get_instance(&instance.id).await.unwrap();
    assert_eq!(instance.status(), InstanceStatus::Running);
    assert!(instance.url.is_some_and(|u| !u.is_empty()));
}

// ================================ DELETE ================================= //

async fn running_instance(h: &Harness) -> String {
    let instance = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();
    h.jobs.finish_job("deploy-api", BuildStatus::Success);
    h.registry.reconcile().await;
    instance.id
}

#[tokio::test]
async fn test_delete_unknown_is_not_found() {
    let h = harness_with_api(None).await;

    assert!(matches!(
        h.registry.delete_instance("nope", false).await,
        Err(ArkError::NotFound(_))
    ));
    assert!(matches!(
        h.registry.delete_instance("nope", true).await,
        Err(ArkError::NotFound(_))
    ));
    assert!(h.jobs.triggered().is_empty());
    assert!(h.registry.list_instances().await.is_empty());
}

#[tokio::test]
async fn test_delete_confirmed_by_job() {
    let h = harness_with_api(None).await;
    let id = running_instance(&h).await;

    let outcome = h.registry.delete_instance(&id, false).await.unwrap();
    assert_eq!(outcome.status, InstanceStatus::Deleting);
    assert_eq!(outcome.job_name.as_deref(), Some("delete-api"));
    assert!(outcome.build_id.is_some());
    assert_eq!(outcome.device_id, "node1");

    // The record stays until the delete job succeeds
    let deleting = h.registry.get_instance(&id).await.unwrap();
    assert_eq!(deleting.status(), InstanceStatus::Deleting);
    assert!(deleting.builds.contains_key("delete-api"));

    h.jobs.finish_job("delete-api", BuildStatus::Success);
    h.registry.reconcile().await;
    assert!(matches!(
        h.registry.get_instance(&id).await,
        Err(ArkError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_deletes_trigger_once() {
    let h = harness_with_api(None).await;
    let id = running_instance(&h).await;
    h.jobs.set_trigger_delay(Duration::from_millis(50));

    let (a, b) = tokio::join!(
        h.registry.delete_instance(&id, false),
        h.registry.delete_instance(&id, false),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);
    assert_eq!(h.jobs.trigger_count("delete-api"), 1);

    // A repeated call while deleting returns the same outcome
    let again = h.registry.delete_instance(&id, false).await.unwrap();
    assert_eq!(again, a);
    assert_eq!(h.jobs.trigger_count("delete-api"), 1);
}

#[tokio::test]
async fn test_delete_job_failure_restores_status() {
    let h = harness_with_api(None).await;
    let id = running_instance(&h).await;

    h.registry.delete_instance(&id, false).await.unwrap();
    h.jobs.finish_job("delete-api", BuildStatus::Failed);
    h.registry.reconcile().await;

    let restored = h.registry.get_instance(&id).await.unwrap();
    assert_eq!(restored.status(), InstanceStatus::Running);
    assert!(restored.fsm.error().is_some());
    assert!(restored.delete_build_id.is_none());

    // A later delete triggers a fresh job
    h.registry.delete_instance(&id, false).await.unwrap();
    assert_eq!(h.jobs.trigger_count("delete-api"), 2);
}

#[tokio::test]
async fn test_delete_trigger_failure_restores_status() {
    let h = harness_with_api(None).await;
    let id = running_instance(&h).await;
    h.jobs.set_fail_triggers(true);

    assert!(matches!(
        h.registry.delete_instance(&id, false).await,
        Err(ArkError::Unavailable(_))
    ));
    assert_eq!(
        h.registry.get_instance(&id).await.unwrap().status(),
        InstanceStatus::Running
    );

    h.jobs.set_fail_triggers(false);
    let outcome = h.registry.delete_instance(&id, false).await.unwrap();
    assert_eq!(outcome.status, InstanceStatus::Deleting);
}

#[tokio::test]
async fn test_delete_while_provisioning_ignores_late_deploy_result() {
    let h = harness_with_api(None).await;
    let instance = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();

    let outcome = h.registry.delete_instance(&instance.id, false).await.unwrap();
    assert_eq!(outcome.status, InstanceStatus::Deleting);

    // The deploy build finishing afterwards must not revive the instance
    h.jobs.finish_job("deploy-api", BuildStatus::Success);
    h.registry.reconcile().await;
    assert_eq!(
        h.registry.get_instance(&instance.id).await.unwrap().status(),
        InstanceStatus::Deleting
    );

    h.jobs.finish_job("delete-api", BuildStatus::Success);
    h.registry.reconcile().await;
    assert!(matches!(
        h.registry.get_instance(&instance.id).await,
        Err(ArkError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_without_delete_job() {
    let h = Harness::new();
    let mut payload = product_payload("api", None);
    payload.delete_job = None;
    h.catalog.create(&payload).await.unwrap();
    let id = running_instance(&h).await;

    assert!(matches!(
        h.registry.delete_instance(&id, false).await,
        Err(ArkError::FailedPrecondition(_))
    ));
    assert_eq!(
        h.registry.get_instance(&id).await.unwrap().status(),
        InstanceStatus::Running
    );

    // Force drops the record without any job
    let outcome = h.registry.delete_instance(&id, true).await.unwrap();
    assert_eq!(outcome.status, InstanceStatus::Stopped);
    assert!(outcome.build_id.is_none());
    assert!(h.registry.list_instances().await.is_empty());
    assert_eq!(h.jobs.triggered().len(), 1);
}

// =============================== CALLBACK ================================ //

#[tokio::test]
async fn test_register_callback() {
    let h = harness_with_api(Some("web")).await;
    let instance = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();

    let registered = h
        .registry
        .register_callback(RegisterInstance {
            instance_id: instance.id.clone(),
            target_host: Some("100.1.2.3".to_string()),
            target_port: Some(3000),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(registered.status(), InstanceStatus::Running);
    assert_eq!(registered.url.as_deref(), Some("http://100.1.2.3:3000/"));

    let completed = h
        .registry
        .register_callback(RegisterInstance {
            instance_id: instance.id.clone(),
            friendly_url: Some("https://api.node1.example".to_string()),
            status: Some("success".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(completed.status(), InstanceStatus::Success);
    assert_eq!(completed.url.as_deref(), Some("https://api.node1.example"));

    // The late build result does not move it back
    h.jobs.finish_job("deploy-api", BuildStatus::Success);
    h.registry.reconcile().await;
    assert_eq!(
        h.registry.get_instance(&instance.id).await.unwrap().status(),
        InstanceStatus::Success
    );
}

#[tokio::test]
async fn test_register_callback_records_proxy_route() {
    let h = harness_with_api(Some("web")).await;
    let id = running_instance(&h).await;

    h.registry
        .register_callback(RegisterInstance {
            instance_id: id.clone(),
            target_port: Some(3000),
            ..Default::default()
        })
        .await
        .unwrap();
    // Without a reported host the resolved address is used
    let route = h.routes.get(&id).await.unwrap();
    assert_eq!(route.target_host, "100.1.2.3");
    assert_eq!(route.target_port, 3000);

    h.registry.delete_instance(&id, false).await.unwrap();
    h.jobs.finish_job("delete-api", BuildStatus::Success);
    h.registry.reconcile().await;
    assert!(matches!(h.routes.get(&id).await, Err(ArkError::NotFound(_))));
}

#[tokio::test]
async fn test_register_callback_rejections() {
    let h = harness_with_api(None).await;

    assert!(matches!(
        h.registry
            .register_callback(RegisterInstance {
                instance_id: "nope".to_string(),
                ..Default::default()
            })
            .await,
        Err(ArkError::NotFound(_))
    ));
    assert!(matches!(
        h.registry
            .register_callback(RegisterInstance::default())
            .await,
        Err(ArkError::InvalidArgument(_))
    ));

    let instance = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();
    assert!(matches!(
        h.registry
            .register_callback(RegisterInstance {
                instance_id: instance.id.clone(),
                target_port: Some(70000),
                ..Default::default()
            })
            .await,
        Err(ArkError::InvalidArgument(_))
    ));

    h.jobs.finish_job("deploy-api", BuildStatus::Failed);
    h.registry.reconcile().await;
    assert!(matches!(
        h.registry
            .register_callback(RegisterInstance {
                instance_id: instance.id,
                target_port: Some(80),
                ..Default::default()
            })
            .await,
        Err(ArkError::FailedPrecondition(_))
    ));
}

// ============================== LOGS / MISC ============================== //

#[tokio::test]
async fn test_logs_merge_every_build() {
    let h = harness_with_api(None).await;
    let id = running_instance(&h).await;
    h.registry.delete_instance(&id, false).await.unwrap();

    let logs = h.registry.logs(&id).await.unwrap();
    assert_eq!(logs.instance.id, id);
    assert_eq!(logs.logs.len(), 2);
    assert!(logs.logs["deploy-api"].starts_with("console of deploy-api#"));
    assert!(logs.logs["delete-api"].starts_with("console of delete-api#"));

    assert!(matches!(
        h.registry.logs("nope").await,
        Err(ArkError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_product_delete_blocked_while_referenced() {
    let h = harness_with_api(None).await;
    let instance = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();

    assert!(matches!(
        h.registry.delete_product("api").await,
        Err(ArkError::Conflict(_))
    ));

    h.registry.delete_instance(&instance.id, true).await.unwrap();
    h.registry.delete_product("api").await.unwrap();
    assert!(matches!(
        h.registry.delete_product("api").await,
        Err(ArkError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_newest_first() {
    let h = Harness::with_nodes(vec![
        node("node1", "100.70.0.1", true),
        node("node2", "100.70.0.2", true),
    ]);
    h.catalog.create(&product_payload("api", None)).await.unwrap();

    let first = h
        .registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = h
        .registry
        .create_instance(request("api", "node2", "PROD"))
        .await
        .unwrap();

    let ids: Vec<String> = h
        .registry
        .list_instances()
        .await
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

// ============================== PERSISTENCE ============================== //

fn temp_file(name: &str) -> File {
    let dir = std::env::temp_dir().join(format!("arkd-registry-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    File::new(dir.join(name))
}

fn registry_over(h: &Harness) -> DeploymentRegistry {
    DeploymentRegistry::new(
        h.catalog.clone(),
        h.mesh.clone(),
        h.jobs.clone(),
        h.ssh_users.clone(),
        h.routes.clone(),
        RegistryOptions::default(),
    )
}

#[tokio::test]
async fn test_instances_survive_reload() {
    let h = harness_with_api(None).await;
    let file = temp_file("instances.json");

    let registry = registry_over(&h).with_file(file.clone()).await.unwrap();
    let created = registry
        .create_instance(request("api", "node1", "PROD"))
        .await
        .unwrap();

    let reloaded = Arc::new(registry_over(&h).with_file(file).await.unwrap());
    let instance = reloaded.get_instance(&created.id).await.unwrap();
    assert_eq!(instance, created);

    // Reloaded records keep reconciling
    h.jobs.finish_job("deploy-api", BuildStatus::Success);
    reloaded.reconcile().await;
    assert_eq!(
        reloaded.get_instance(&created.id).await.unwrap().status(),
        InstanceStatus::Running
    );
}

#[tokio::test]
async fn test_interrupted_delete_reverts_on_reload() {
    let h = harness_with_api(None).await;
    let file = temp_file("instances.json");
    std::fs::write(
        file.path(),
        r#"[{
            "id": "i-1",
            "product_id": "api",
            "target_host": "node1",
            "environment": "PROD",
            "status": "deleting",
            "status_before_delete": "running",
            "build_id": "deploy-api#1",
            "job_name": "deploy-api",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }]"#,
    )
    .unwrap();

    let registry = registry_over(&h).with_file(file).await.unwrap();
    registry.reconcile().await;

    let instance = registry.get_instance("i-1").await.unwrap();
    assert_eq!(instance.status(), InstanceStatus::Running);
    assert_eq!(instance.fsm.error(), Some("delete interrupted"));
}
