use serde::Deserialize;

// --- LibreNMS API types ---

#[derive(Debug, Deserialize)]
pub struct PortSearchResponse {
    #[serde(default)]
    pub ports: Vec<NmsPortRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmsPortRef {
    pub port_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PortResponse {
    #[serde(default)]
    pub port: Vec<NmsPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmsPort {
    pub port_id: i64,
    pub device_id: i64,
    #[serde(rename = "ifName", default)]
    pub if_name: String,
    #[serde(rename = "ifAlias", default)]
    pub if_alias: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceResponse {
    #[serde(default)]
    pub devices: Vec<NmsDevice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmsDevice {
    pub hostname: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub os: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_and_device() {
        let raw = r#"{"status": "ok", "port": [{
            "port_id": 8812, "device_id": 41, "ifName": "GigabitEthernet0/0/0/7.254",
            "ifAlias": "PON-1001 (PRESTAGED)", "ifOperStatus": "down"
        }]}"#;
        let resp: PortResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.port[0].if_name, "GigabitEthernet0/0/0/7.254");
        assert_eq!(resp.port[0].if_alias.as_deref(), Some("PON-1001 (PRESTAGED)"));

        let raw = r#"{"status": "ok", "devices": [{
            "device_id": 41, "hostname": "core1.pop", "ip": "", "location": null, "os": "iosxr"
        }]}"#;
        let resp: DeviceResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.devices[0].os, "iosxr");
        assert_eq!(resp.devices[0].location, None);
    }

    #[test]
    fn test_parse_empty_search() {
        let raw = r#"{"status": "error", "message": "No ports found"}"#;
        let resp: PortSearchResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.ports.is_empty());
    }
}
