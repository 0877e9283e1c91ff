//! Product catalog tests

mod common;

use std::collections::BTreeMap;

use arkd::catalog::ProductCatalog;
use arkd::errors::ArkError;
use arkd::filesys::file::File;
use arkd::models::product::Environment;
use openapi_server::models::ProductPayload;

use common::product_payload;

fn temp_file(name: &str) -> File {
    let dir = std::env::temp_dir().join(format!("arkd-catalog-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    File::new(dir.join(name))
}

#[tokio::test]
async fn test_product_round_trip() {
    let catalog = ProductCatalog::in_memory();
    let created = catalog
        .create(&product_payload("api", Some("web")))
        .await
        .unwrap();

    let fetched = catalog.get("api").await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.name, "api service");
    assert_eq!(fetched.description, "test product");
    assert_eq!(fetched.web_service.as_deref(), Some("web"));
    assert_eq!(fetched.web_port, 8080);
    assert_eq!(fetched.delete_job(), Some("delete-api"));

    // Only the environment that was set carries a job
    assert_eq!(fetched.deploy_job(Environment::Prod), Some("deploy-api"));
    assert_eq!(fetched.deploy_job(Environment::Dev), None);
    assert_eq!(fetched.deploy_jobs.len(), 1);

    let listed = catalog.list().await;
    assert_eq!(listed, vec![created]);
}

#[tokio::test]
async fn test_list_sorted_by_id() {
    let catalog = ProductCatalog::in_memory();
    for id in ["worker", "api", "db"] {
        catalog.create(&product_payload(id, None)).await.unwrap();
    }
    let ids: Vec<String> = catalog.list().await.into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["api", "db", "worker"]);
}

#[tokio::test]
async fn test_empty_deploy_jobs_dropped() {
    let catalog = ProductCatalog::in_memory();
    let mut payload = product_payload("api", None);
    payload.deploy_jobs = Some(BTreeMap::from([
        ("prod".to_string(), "deploy-api".to_string()),
        ("DEV".to_string(), "  ".to_string()),
    ]));

    let product = catalog.create(&payload).await.unwrap();
    assert_eq!(
        product.deploy_jobs,
        BTreeMap::from([(Environment::Prod, "deploy-api".to_string())])
    );
}

#[tokio::test]
async fn test_create_validation() {
    let catalog = ProductCatalog::in_memory();

    let mut bad_id = product_payload("api", None);
    bad_id.id = Some("My API".to_string());
    assert!(matches!(
        catalog.create(&bad_id).await,
        Err(ArkError::InvalidArgument(_))
    ));

    let mut bad_env = product_payload("api", None);
    bad_env.deploy_jobs = Some(BTreeMap::from([(
        "staging".to_string(),
        "deploy-api".to_string(),
    )]));
    assert!(matches!(
        catalog.create(&bad_env).await,
        Err(ArkError::InvalidArgument(_))
    ));

    let mut bad_job = product_payload("api", None);
    bad_job.delete_job = Some("../escape".to_string());
    assert!(matches!(
        catalog.create(&bad_job).await,
        Err(ArkError::InvalidArgument(_))
    ));

    let mut bad_port = product_payload("api", None);
    bad_port.web_port = Some(70000);
    assert!(matches!(
        catalog.create(&bad_port).await,
        Err(ArkError::InvalidArgument(_))
    ));

    let missing_name = ProductPayload {
        id: Some("api".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        catalog.create(&missing_name).await,
        Err(ArkError::InvalidArgument(_))
    ));

    assert!(catalog.list().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let catalog = ProductCatalog::in_memory();
    catalog.create(&product_payload("api", None)).await.unwrap();
    assert!(matches!(
        catalog.create(&product_payload("api", None)).await,
        Err(ArkError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_update_replaces_present_fields() {
    let catalog = ProductCatalog::in_memory();
    catalog
        .create(&product_payload("api", Some("web")))
        .await
        .unwrap();

    let patch = ProductPayload {
        description: Some("new description".to_string()),
        web_port: Some(9000),
        ..Default::default()
    };
    let updated = catalog.update("api", &patch).await.unwrap();
    assert_eq!(updated.description, "new description");
    assert_eq!(updated.web_port, 9000);
    // Untouched fields survive
    assert_eq!(updated.name, "api service");
    assert_eq!(updated.deploy_job(Environment::Prod), Some("deploy-api"));
    assert_eq!(catalog.get("api").await.unwrap(), updated);
}

#[tokio::test]
async fn test_update_rejects_id_change_and_unknown() {
    let catalog = ProductCatalog::in_memory();
    catalog.create(&product_payload("api", None)).await.unwrap();

    let rename = ProductPayload {
        id: Some("other".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        catalog.update("api", &rename).await,
        Err(ArkError::InvalidArgument(_))
    ));
    assert!(matches!(
        catalog.update("missing", &ProductPayload::default()).await,
        Err(ArkError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete() {
    let catalog = ProductCatalog::in_memory();
    catalog.create(&product_payload("api", None)).await.unwrap();

    tokio_test::assert_ok!(catalog.delete("api").await);
    assert!(matches!(catalog.get("api").await, Err(ArkError::NotFound(_))));
    assert!(matches!(
        catalog.delete("api").await,
        Err(ArkError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_persisted_catalog_reloads() {
    let file = temp_file("products.json");
    {
        let catalog = ProductCatalog::load(file.clone()).await.unwrap();
        catalog
            .create(&product_payload("api", Some("web")))
            .await
            .unwrap();
        catalog.create(&product_payload("db", None)).await.unwrap();
        catalog.delete("db").await.unwrap();
    }

    let reloaded = ProductCatalog::load(file).await.unwrap();
    let products = reloaded.list().await;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id, "api");
    assert_eq!(products[0].web_service.as_deref(), Some("web"));
}
