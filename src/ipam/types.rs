use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::utils::de_string_or_number;

// --- phpIPAM API types ---

/// Envelope around every phpIPAM response
#[derive(Debug, Deserialize)]
pub struct IpamResponse<T> {
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpamToken {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpamSubnet {
    #[serde(deserialize_with = "de_string_or_number")]
    pub id: String,
    pub subnet: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpamAddress {
    #[serde(deserialize_with = "de_string_or_number")]
    pub id: String,
    pub ip: Ipv4Addr,
    #[serde(default)]
    pub hostname: Option<String>,
}

// --- Request types ---

#[derive(Debug, Serialize)]
pub(crate) struct AddressLabel {
    pub hostname: String,
    pub description: String,
}

impl AddressLabel {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            description: String::new(),
        }
    }
}
