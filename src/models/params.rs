use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::utils::{de_opt_u32, is_valid_hostname};

/// Physical interfaces of a Telco 280, in front-panel order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelcoPort {
    #[serde(rename = "1/1/1")]
    P1_1_1,
    #[serde(rename = "1/2/1")]
    P1_2_1,
    #[serde(rename = "1/2/2")]
    P1_2_2,
    #[serde(rename = "1/3/1")]
    P1_3_1,
}

impl TelcoPort {
    pub const ALL: [TelcoPort; 4] = [Self::P1_1_1, Self::P1_2_1, Self::P1_2_2, Self::P1_3_1];

    /// Ports the Telco can be cabled to the core on. Checked in this order.
    pub const UPLINK_CANDIDATES: [TelcoPort; 2] = [Self::P1_1_1, Self::P1_3_1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P1_1_1 => "1/1/1",
            Self::P1_2_1 => "1/2/1",
            Self::P1_2_2 => "1/2/2",
            Self::P1_3_1 => "1/3/1",
        }
    }

    pub fn is_uplink_candidate(&self) -> bool {
        Self::UPLINK_CANDIDATES.contains(self)
    }
}

impl fmt::Display for TelcoPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TelcoPort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| format!("unknown Telco interface '{}'", s))
    }
}

/// Service types sold on a Telco circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    Dia,
    MplsPassthrough,
    Sip,
    Epl,
    Evpl,
    Vpls,
}

impl ServiceType {
    /// Customer VLAN carrying this service on the Telco
    pub fn vlan_id(&self) -> u16 {
        match self {
            Self::Dia => 10,
            Self::MplsPassthrough => 20,
            Self::Sip => 30,
            Self::Epl | Self::Evpl | Self::Vpls => 40,
        }
    }

    /// Voice is the only latency-sensitive service
    pub fn is_latency_sensitive(&self) -> bool {
        matches!(self, Self::Sip)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dia => "DIA",
            Self::MplsPassthrough => "MPLS_PASSTHROUGH",
            Self::Sip => "SIP",
            Self::Epl => "EPL",
            Self::Evpl => "EVPL",
            Self::Vpls => "VPLS",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload/download rates in Mbps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bandwidth {
    pub upload: u32,
    pub download: u32,
}

/// Customer site details, only used to label the IPAM records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Customer {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
}

/// One customer service to be delivered through the Telco
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawService")]
pub struct Service {
    pub pon: String,
    pub service_type: ServiceType,
    pub lan_interface: TelcoPort,
    pub bandwidth: Bandwidth,
    pub customer: Customer,
}

/// Service as written in the parameters file: either a symmetric
/// `BANDWIDTH` or an explicit upload/download pair.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct RawService {
    pon: String,
    #[serde(rename = "TYPE")]
    service_type: ServiceType,
    lan_interface: TelcoPort,
    #[serde(default, deserialize_with = "de_opt_u32")]
    bandwidth: Option<u32>,
    #[serde(default, deserialize_with = "de_opt_u32")]
    upload_bandwidth: Option<u32>,
    #[serde(default, deserialize_with = "de_opt_u32")]
    download_bandwidth: Option<u32>,
    #[serde(flatten)]
    customer: Customer,
}

impl TryFrom<RawService> for Service {
    type Error = String;

    fn try_from(raw: RawService) -> std::result::Result<Self, Self::Error> {
        if raw.pon.trim().is_empty() {
            return Err("service PON must not be empty".to_string());
        }

        let bandwidth = match (raw.bandwidth, raw.upload_bandwidth, raw.download_bandwidth) {
            (Some(bw), _, _) => Bandwidth { upload: bw, download: bw },
            (None, Some(upload), Some(download)) => Bandwidth { upload, download },
            _ => {
                return Err(format!(
                    "service {} needs BANDWIDTH or both UPLOAD_BANDWIDTH and DOWNLOAD_BANDWIDTH",
                    raw.pon
                ))
            }
        };

        Ok(Self {
            pon: raw.pon.trim().to_string(),
            service_type: raw.service_type,
            lan_interface: raw.lan_interface,
            bandwidth,
            customer: raw.customer,
        })
    }
}

/// Per-run input record, loaded once from `CONFIG_PARAMETERS.json` and never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ConfigParameters {
    pub inventory_number: String,
    pub hostname: String,
    pub services: Vec<Service>,
}

impl ConfigParameters {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid parameters in {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(raw)?;
        params.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(params)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.services.is_empty() {
            return Err("SERVICES must list at least one service".to_string());
        }
        if !is_valid_hostname(&self.hostname) {
            return Err(format!("HOSTNAME '{}' is not a valid hostname", self.hostname));
        }
        if !is_valid_hostname(&self.inventory_number) {
            return Err(format!(
                "INVENTORY_NUMBER '{}' contains invalid characters",
                self.inventory_number
            ));
        }
        Ok(())
    }

    /// Circuit identifiers, in service order
    pub fn pons(&self) -> Vec<String> {
        self.services.iter().map(|s| s.pon.clone()).collect()
    }

    /// IPAM hostname for the mgmt block once the Telco is in service:
    /// `<PON>... - <Company> - <Street> <City>, <State> <Zip> - <TYPE>...`
    pub fn inventory_description(&self) -> String {
        let pons = self.pons().join(" ");
        let types = self
            .services
            .iter()
            .map(|s| s.service_type.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let c = &self.services[0].customer;

        format!(
            "{} - {} - {} {}, {} {} - {}",
            pons, c.company_name, c.street, c.city, c.state, c.zip_code, types
        )
        .trim()
        .to_string()
    }
}
