//! Product payload validation

use std::collections::BTreeMap;

use openapi_server::models::ProductPayload;

use crate::errors::ArkError;
use crate::models::product::{Environment, Product, DEFAULT_WEB_PORT};

/// Whether `id` is a product slug (`^[a-z0-9-]+$`)
pub fn is_valid_slug(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Whether `name` can be interpolated into a CI job path
pub fn is_safe_job_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name
            .chars()
            .any(|c| c == '\\' || c.is_whitespace() || c.is_control())
}

/// Whether `name` is a container service name (`[a-z0-9_-]`)
pub fn is_safe_service_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn parse_deploy_jobs(
    jobs: &BTreeMap<String, String>,
) -> Result<BTreeMap<Environment, String>, ArkError> {
    let mut parsed = BTreeMap::new();
    let mut seen: BTreeMap<Environment, &str> = BTreeMap::new();
    for (key, job) in jobs {
        let env: Environment = key.parse().map_err(ArkError::InvalidArgument)?;
        // "PROD" and "production" name the same slot
        if let Some(first) = seen.insert(env, key.as_str()) {
            return Err(ArkError::InvalidArgument(format!(
                "deploy_jobs names {} twice: {:?} and {:?}",
                env, first, key
            )));
        }
        let job = job.trim();
        if job.is_empty() {
            continue;
        }
        parsed.insert(env, job.to_string());
    }
    Ok(parsed)
}

fn parse_web_port(port: u32) -> Result<u16, ArkError> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| ArkError::InvalidArgument(format!("web_port out of range: {}", port)))
}

fn normalize_service(service: &str) -> Option<String> {
    Some(service.trim().to_string()).filter(|s| !s.is_empty())
}

/// Check the invariants of a fully built product
pub fn validate_product(product: &Product) -> Result<(), ArkError> {
    if !is_valid_slug(&product.id) {
        return Err(ArkError::InvalidArgument(format!(
            "invalid product id: {:?} (allowed: a-z, 0-9, -)",
            product.id
        )));
    }
    if product.name.trim().is_empty() {
        return Err(ArkError::InvalidArgument("product name is required".to_string()));
    }
    for (env, job) in &product.deploy_jobs {
        if !is_safe_job_name(job) {
            return Err(ArkError::InvalidArgument(format!(
                "invalid deploy job for {}: {:?}",
                env, job
            )));
        }
    }
    if !product.delete_job.is_empty() && !is_safe_job_name(&product.delete_job) {
        return Err(ArkError::InvalidArgument(format!(
            "invalid delete job: {:?}",
            product.delete_job
        )));
    }
    if let Some(service) = &product.web_service {
        if !is_safe_service_name(service) {
            return Err(ArkError::InvalidArgument(format!(
                "invalid web_service: {:?} (allowed: a-z, 0-9, _, -)",
                service
            )));
        }
    }
    if product.web_port == 0 {
        return Err(ArkError::InvalidArgument("web_port out of range: 0".to_string()));
    }
    Ok(())
}

/// Build a new product from a create payload
pub fn product_from_payload(payload: &ProductPayload) -> Result<Product, ArkError> {
    let id = payload.id.as_deref().unwrap_or_default().trim().to_string();
    if id.is_empty() {
        return Err(ArkError::InvalidArgument("product id is required".to_string()));
    }

    let product = Product {
        id,
        name: payload.name.as_deref().unwrap_or_default().trim().to_string(),
        description: payload.description.clone().unwrap_or_default(),
        deploy_jobs: match &payload.deploy_jobs {
            Some(jobs) => parse_deploy_jobs(jobs)?,
            None => BTreeMap::new(),
        },
        delete_job: payload.delete_job.as_deref().unwrap_or_default().trim().to_string(),
        web_service: payload.web_service.as_deref().and_then(normalize_service),
        web_port: match payload.web_port {
            Some(port) => parse_web_port(port)?,
            None => DEFAULT_WEB_PORT,
        },
    };
    validate_product(&product)?;
    Ok(product)
}

/// Apply an update payload on top of a stored product
pub fn apply_patch(current: &Product, patch: &ProductPayload) -> Result<Product, ArkError> {
    if let Some(id) = patch.id.as_deref().map(str::trim) {
        if !id.is_empty() && id != current.id {
            return Err(ArkError::InvalidArgument(format!(
                "product id cannot change: {:?} -> {:?}",
                current.id, id
            )));
        }
    }

    let mut next = current.clone();
    if let Some(name) = &patch.name {
        next.name = name.trim().to_string();
    }
    if let Some(description) = &patch.description {
        next.description = description.clone();
    }
    if let Some(jobs) = &patch.deploy_jobs {
        next.deploy_jobs = parse_deploy_jobs(jobs)?;
    }
    if let Some(job) = &patch.delete_job {
        next.delete_job = job.trim().to_string();
    }
    if let Some(service) = &patch.web_service {
        next.web_service = normalize_service(service);
    }
    if let Some(port) = patch.web_port {
        next.web_port = parse_web_port(port)?;
    }
    validate_product(&next)?;
    Ok(next)
}
