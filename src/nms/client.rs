use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::resolve::PortDirectory;
use super::types::*;
use crate::models::{CoreRouter, PortDetails, RouterOs};

/// LibreNMS API client
pub struct NmsClient {
    base_url: String,
    token: String,
    client: Client,
}

impl NmsClient {
    pub fn new(url: String, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v0{}", self.base_url, path)
    }

    /// Helper to perform an authenticated GET. `None` when LibreNMS answers 404.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let resp = self
            .client
            .get(self.api_url(path))
            .header("X-Auth-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LibreNMS API error {}: {}", status, body));
        }

        Ok(Some(resp.json().await?))
    }

    async fn get_port(&self, port_id: i64) -> Result<NmsPort> {
        let resp: Option<PortResponse> = self.get_json(&format!("/ports/{}", port_id)).await?;
        resp.and_then(|r| r.port.into_iter().next())
            .ok_or_else(|| anyhow::anyhow!("Port {} not found", port_id))
    }

    async fn get_device(&self, device_id: i64) -> Result<NmsDevice> {
        let resp: Option<DeviceResponse> = self.get_json(&format!("/devices/{}", device_id)).await?;
        resp.and_then(|r| r.devices.into_iter().next())
            .ok_or_else(|| anyhow::anyhow!("Device {} not found", device_id))
    }
}

#[async_trait]
impl PortDirectory for NmsClient {
    async fn search_ports(&self, needle: &str) -> Result<Vec<i64>> {
        let resp: Option<PortSearchResponse> = self
            .get_json(&format!("/ports/search/ifAlias/{}", needle))
            .await
            .with_context(|| format!("Port search for '{}'", needle))?;

        Ok(resp
            .map(|r| r.ports.into_iter().map(|p| p.port_id).collect())
            .unwrap_or_default())
    }

    async fn port_details(&self, port_id: i64) -> Result<PortDetails> {
        let port = self.get_port(port_id).await?;
        let device = self.get_device(port.device_id).await?;

        Ok(PortDetails {
            port_id: port.port_id,
            port_name: port.if_name,
            description: port.if_alias.unwrap_or_default(),
            router: CoreRouter {
                mgmt_ip: device.ip.filter(|ip| !ip.is_empty()).unwrap_or_else(|| device.hostname.clone()),
                hostname: device.hostname,
                os: RouterOs::from(device.os),
                location: device.location.unwrap_or_default(),
            },
        })
    }
}
