//! Core-port discovery.
//!
//! A core port is reserved for a circuit by giving it a description with the
//! circuit's PON and a prestage marker, e.g. `PON-1001 (PRESTAGED)`. Once the
//! port is configured the marker is removed and only the PON remains. Lookup
//! tries the prestaged form first and falls back to the configured form, so a
//! second run against the same circuit finds the port it already configured.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::ProvisionError;
use crate::models::{CorePort, PortDetails};

/// Marker carried by the description of a reserved, unconfigured port
pub const PRESTAGE_MARKER: &str = "PRESTAGE";

/// Port inventory of the monitoring system
#[async_trait]
pub trait PortDirectory: Send + Sync {
    /// Ids of ports whose description contains `needle`
    async fn search_ports(&self, needle: &str) -> Result<Vec<i64>>;
    async fn port_details(&self, port_id: i64) -> Result<PortDetails>;
}

pub fn is_prestaged(description: &str) -> bool {
    description.contains(PRESTAGE_MARKER)
}

/// First PON, in service order, that appears in the description
pub fn matching_pon<'a>(description: &str, pons: &'a [String]) -> Option<&'a str> {
    pons.iter()
        .map(String::as_str)
        .find(|pon| !pon.is_empty() && description.contains(pon))
}

/// Resolve the single core port for a set of PONs.
///
/// `Ok(None)` when neither phase matches. More than one port in a phase is an error.
pub async fn resolve_core_port<D: PortDirectory + ?Sized>(
    directory: &D,
    pons: &[String],
) -> Result<Option<CorePort>, ProvisionError> {
    if let Some(port) = find_prestaged(directory, pons).await? {
        tracing::info!(
            "Found prestaged port {} on {} with description: {}",
            port.port_name, port.router.hostname, port.description
        );
        return Ok(Some(port));
    }

    let port = find_configured(directory, pons).await?;
    if let Some(ref port) = port {
        tracing::info!(
            "Found configured port {} on {} with description: {}",
            port.port_name, port.router.hostname, port.description
        );
    }
    Ok(port)
}

async fn find_prestaged<D: PortDirectory + ?Sized>(
    directory: &D,
    pons: &[String],
) -> Result<Option<CorePort>, ProvisionError> {
    let port_ids = directory
        .search_ports(PRESTAGE_MARKER)
        .await
        .map_err(ProvisionError::external("prestaged port search"))?;
    tracing::debug!("{} ports carry the prestage marker", port_ids.len());

    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for port_id in port_ids {
        if !seen.insert(port_id) {
            continue;
        }
        let details = directory
            .port_details(port_id)
            .await
            .map_err(ProvisionError::external("port details lookup"))?;
        if !is_prestaged(&details.description) {
            continue;
        }
        if let Some(pon) = matching_pon(&details.description, pons) {
            let pon = pon.to_string();
            matches.push(CorePort::from_details(details, pon, false));
        }
    }

    single(matches, "prestaged")
}

async fn find_configured<D: PortDirectory + ?Sized>(
    directory: &D,
    pons: &[String],
) -> Result<Option<CorePort>, ProvisionError> {
    let mut seen = HashSet::new();
    let mut matches = Vec::new();

    for pon in pons.iter().filter(|p| !p.is_empty()) {
        let port_ids = directory
            .search_ports(pon)
            .await
            .map_err(ProvisionError::external("configured port search"))?;

        for port_id in port_ids {
            if !seen.insert(port_id) {
                continue;
            }
            let details = directory
                .port_details(port_id)
                .await
                .map_err(ProvisionError::external("port details lookup"))?;
            if is_prestaged(&details.description) || !details.description.contains(pon.as_str()) {
                continue;
            }
            matches.push(CorePort::from_details(details, pon.clone(), true));
        }
    }

    single(matches, "configured")
}

fn single(mut matches: Vec<CorePort>, state: &'static str) -> Result<Option<CorePort>, ProvisionError> {
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => Err(ProvisionError::AmbiguousCorePort {
            state,
            ports: matches.iter().map(|p| p.to_string()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoreRouter, RouterOs};
    use std::collections::HashMap;

    /// Monitoring inventory keyed by port id
    struct FakeDirectory {
        ports: HashMap<i64, PortDetails>,
    }

    impl FakeDirectory {
        fn new(ports: &[(i64, &str, &str)]) -> Self {
            let ports = ports
                .iter()
                .map(|(id, router, description)| {
                    (
                        *id,
                        PortDetails {
                            port_id: *id,
                            port_name: format!("Gi0/0/0/{}.254", id),
                            description: description.to_string(),
                            router: CoreRouter {
                                hostname: router.to_string(),
                                mgmt_ip: "192.0.2.1".to_string(),
                                os: RouterOs::IosXr,
                                location: "POP-1, 1 Carrier Way".to_string(),
                            },
                        },
                    )
                })
                .collect();
            Self { ports }
        }
    }

    #[async_trait]
    impl PortDirectory for FakeDirectory {
        async fn search_ports(&self, needle: &str) -> Result<Vec<i64>> {
            let mut ids: Vec<i64> = self
                .ports
                .values()
                .filter(|p| p.description.contains(needle))
                .map(|p| p.port_id)
                .collect();
            ids.sort();
            Ok(ids)
        }

        async fn port_details(&self, port_id: i64) -> Result<PortDetails> {
            self.ports
                .get(&port_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Port {} not found", port_id))
        }
    }

    fn pons(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_prestaged_port() {
        let dir = FakeDirectory::new(&[
            (1, "core1", "PON-2000 (PRESTAGED)"),
            (2, "core1", "PON-1001 (PRESTAGED)"),
            (3, "core2", "PON-3000"),
        ]);
        let port = resolve_core_port(&dir, &pons(&["PON-1001", "PON-1002"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(port.port_id, 2);
        assert_eq!(port.pon, "PON-1001");
        assert!(!port.already_configured);
        assert_eq!(port.router.location, "POP-1, 1 Carrier Way");
    }

    #[tokio::test]
    async fn test_configured_port_fallback() {
        let dir = FakeDirectory::new(&[
            (1, "core1", "PON-2000 (PRESTAGED)"),
            (7, "core2", "PON-1002 - 10.254.3.9/30"),
        ]);
        let port = resolve_core_port(&dir, &pons(&["PON-1001", "PON-1002"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(port.port_id, 7);
        assert_eq!(port.pon, "PON-1002");
        assert!(port.already_configured);
    }

    #[tokio::test]
    async fn test_prestaged_wins_over_configured() {
        let dir = FakeDirectory::new(&[
            (4, "core1", "PON-1001"),
            (5, "core1", "PON-1001 (PRESTAGED)"),
        ]);
        let port = resolve_core_port(&dir, &pons(&["PON-1001"])).await.unwrap().unwrap();
        assert_eq!(port.port_id, 5);
        assert!(!port.already_configured);
    }

    #[tokio::test]
    async fn test_no_match() {
        let dir = FakeDirectory::new(&[
            (1, "core1", "PON-2000 (PRESTAGED)"),
            (2, "core1", "PON-3000"),
        ]);
        let port = resolve_core_port(&dir, &pons(&["PON-1001"])).await.unwrap();
        assert!(port.is_none());
    }

    #[tokio::test]
    async fn test_ambiguous_prestaged() {
        let dir = FakeDirectory::new(&[
            (1, "core1", "PON-1001 (PRESTAGED)"),
            (2, "core2", "PON-1002 (PRESTAGED)"),
        ]);
        let err = resolve_core_port(&dir, &pons(&["PON-1001", "PON-1002"]))
            .await
            .unwrap_err();
        match err {
            ProvisionError::AmbiguousCorePort { state, ports } => {
                assert_eq!(state, "prestaged");
                assert_eq!(ports.len(), 2);
            }
            other => panic!("expected AmbiguousCorePort, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ambiguous_configured() {
        let dir = FakeDirectory::new(&[(1, "core1", "PON-1001"), (2, "core2", "PON-1001 backup")]);
        let err = resolve_core_port(&dir, &pons(&["PON-1001"])).await.unwrap_err();
        assert!(matches!(err, ProvisionError::AmbiguousCorePort { state: "configured", .. }));
    }

    #[tokio::test]
    async fn test_port_with_two_pons_counts_once() {
        let dir = FakeDirectory::new(&[(9, "core1", "PON-1001 PON-1002")]);
        let port = resolve_core_port(&dir, &pons(&["PON-1001", "PON-1002"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(port.port_id, 9);
        assert_eq!(port.pon, "PON-1001");
        assert!(port.already_configured);
    }

    #[test]
    fn test_matching_pon() {
        let list = pons(&["", "PON-7"]);
        assert_eq!(matching_pon("PON-7 (PRESTAGED)", &list), Some("PON-7"));
        assert_eq!(matching_pon("PON-8", &list), None);
    }
}
