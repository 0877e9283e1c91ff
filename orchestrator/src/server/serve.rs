//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{any, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ArkError;
use crate::server::handlers::{
    build_logs_handler, build_status_handler, create_deployment_handler, create_product_handler,
    delete_deployment_handler, delete_product_handler, delete_ssh_user_handler,
    deployment_logs_handler, get_deployment_handler, get_device_handler, get_product_handler,
    get_ssh_user_handler, health_handler, list_deployments_handler, list_devices_handler,
    list_jobs_handler, list_products_handler, list_ssh_users_handler,
    method_not_allowed_handler, not_found_handler, pending_jobs_handler, proxy_instance_handler,
    proxy_short_handler, put_ssh_user_handler, register_instance_handler,
    update_product_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Products
        .route(
            "/api/products",
            get(list_products_handler).post(create_product_handler),
        )
        .route(
            "/api/products/{id}",
            get(get_product_handler)
                .put(update_product_handler)
                .delete(delete_product_handler),
        )
        // Deployments
        .route(
            "/api/deployments",
            get(list_deployments_handler).post(create_deployment_handler),
        )
        .route(
            "/api/deployments/{id}",
            get(get_deployment_handler).delete(delete_deployment_handler),
        )
        .route("/api/deployments/pending", get(pending_jobs_handler))
        .route("/api/deployments/{id}/logs", get(deployment_logs_handler))
        .route(
            "/api/deployments/job/{job}/build/{build}/status",
            get(build_status_handler),
        )
        .route(
            "/api/deployments/job/{job}/build/{build}/logs",
            get(build_logs_handler),
        )
        .route("/api/instances/register", post(register_instance_handler))
        // Instance proxy
        .route("/instances/register", post(register_instance_handler))
        .route("/instances/by-short/{short}", any(proxy_short_handler))
        .route("/instances/by-short/{short}/", any(proxy_short_handler))
        .route("/instances/by-short/{short}/{*path}", any(proxy_short_handler))
        .route("/instances/{id}", any(proxy_instance_handler))
        .route("/instances/{id}/", any(proxy_instance_handler))
        .route("/instances/{id}/{*path}", any(proxy_instance_handler))
        // Mesh devices
        .route("/api/tailscale/devices", get(list_devices_handler))
        .route("/api/tailscale/devices/{id}", get(get_device_handler))
        // SSH users
        .route("/api/ssh-users", get(list_ssh_users_handler))
        .route(
            "/api/ssh-users/{host}",
            get(get_ssh_user_handler)
                .put(put_ssh_user_handler)
                .delete(delete_ssh_user_handler),
        )
        // Job catalog
        .route("/api/jobs", get(list_jobs_handler))
        // Unmatched paths and methods
        .fallback(not_found_handler)
        .method_not_allowed_fallback(method_not_allowed_handler)
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ArkError>>, ArkError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ArkError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ArkError::ServerError(e.to_string()))
    });

    Ok(handle)
}
