//! Tailscale API client

use openapi_client::models::tailscale::{DevicesResponse, TailscaleDevice};
use url::form_urlencoded::byte_serialize;

use crate::errors::ArkError;
use crate::http::client::HttpClient;

impl HttpClient {
    /// List every device in `tailnet`
    pub async fn tailscale_devices(&self, tailnet: &str) -> Result<Vec<TailscaleDevice>, ArkError> {
        let tailnet: String = byte_serialize(tailnet.trim().as_bytes()).collect();
        let response: DevicesResponse = self
            .get_json(&format!("/tailnet/{}/devices", tailnet))
            .await?;
        Ok(response.devices)
    }
}
