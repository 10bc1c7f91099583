use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::net::Ipv4Addr;
use std::time::Duration;

use super::mgmt::AddressBook;
use super::types::*;
use crate::config::Config;

/// phpIPAM API client, authenticated with a session token
pub struct IpamClient {
    base_url: String,
    app_id: String,
    token: String,
    client: Client,
}

impl IpamClient {
    /// Build the HTTP client and exchange the basic credentials for a token
    pub async fn login(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(cfg.ipam_insecure_tls)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        let base_url = cfg.ipam_base_url.trim_end_matches('/').to_string();
        let url = format!("{}/api/{}/user/", base_url, cfg.ipam_app_id);

        let resp = client
            .post(&url)
            .header("Authorization", format!("Basic {}", cfg.ipam_auth))
            .send()
            .await
            .context("phpIPAM authentication request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("phpIPAM authentication error {}: {}", status, body));
        }

        let body: IpamResponse<IpamToken> = resp.json().await?;
        let token = match body.data {
            Some(t) => t.token,
            None => anyhow::bail!("phpIPAM returned no token: {}", body.message.unwrap_or_default()),
        };

        tracing::debug!("Authenticated to phpIPAM at {}", base_url);

        Ok(Self {
            base_url,
            app_id: cfg.ipam_app_id.clone(),
            token,
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}{}", self.base_url, self.app_id, path)
    }

    /// Helper to perform a GET and unwrap the `data` member. 404 means "nothing there".
    async fn get_data<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let resp = self
            .client
            .get(self.api_url(path))
            .header("token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("phpIPAM API error {}: {}", status, body));
        }

        let body: IpamResponse<T> = resp.json().await?;
        Ok(body.data)
    }

    /// Find the id of a subnet by its base address within a section
    pub async fn find_subnet_id(&self, section_id: &str, subnet: &str) -> Result<String> {
        let subnets: Vec<IpamSubnet> = self
            .get_data(&format!("/sections/{}/subnets/", section_id))
            .await?
            .unwrap_or_default();

        let found = subnets
            .into_iter()
            .find(|s| s.subnet == subnet)
            .ok_or_else(|| anyhow::anyhow!("Subnet {} not found in section {}", subnet, section_id))?;

        tracing::info!("Mgmt subnet {} has id {}", subnet, found.id);
        Ok(found.id)
    }
}

#[async_trait]
impl AddressBook for IpamClient {
    async fn first_free(&self, subnet_id: &str) -> Result<Ipv4Addr> {
        self.get_data(&format!("/subnets/{}/first_free/", subnet_id))
            .await?
            .ok_or_else(|| anyhow::anyhow!("Subnet {} has no free address", subnet_id))
    }

    async fn subnet_addresses(&self, subnet_id: &str) -> Result<Vec<Ipv4Addr>> {
        let addresses: Vec<IpamAddress> = self
            .get_data(&format!("/subnets/{}/addresses/", subnet_id))
            .await?
            .unwrap_or_default();
        Ok(addresses.into_iter().map(|a| a.ip).collect())
    }

    async fn reserve_first_free(&self, subnet_id: &str, label: &str) -> Result<Ipv4Addr> {
        let resp = self
            .client
            .post(self.api_url(&format!("/addresses/first_free/{}/", subnet_id)))
            .header("token", &self.token)
            .json(&AddressLabel::new(label))
            .send()
            .await?;

        if resp.status() != StatusCode::CREATED {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("status code {}: {}", status.as_u16(), body));
        }

        let body: IpamResponse<Ipv4Addr> = resp.json().await?;
        match body.data {
            Some(ip) => Ok(ip),
            None => anyhow::bail!(
                "phpIPAM did not return the reserved address: {}",
                body.message.unwrap_or_default()
            ),
        }
    }

    async fn search_hostname(&self, needle: &str) -> Result<Vec<IpamAddress>> {
        Ok(self
            .get_data(&format!("/addresses/search_hostname/{}/", needle))
            .await?
            .unwrap_or_default())
    }

    async fn set_hostname(&self, address_id: &str, hostname: &str) -> Result<()> {
        let resp = self
            .client
            .patch(self.api_url(&format!("/addresses/{}/", address_id)))
            .header("token", &self.token)
            .json(&AddressLabel::new(hostname))
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "address {}: status code {}: {}",
                address_id,
                status.as_u16(),
                body
            ));
        }

        Ok(())
    }
}
