//! Terminating failures of a provisioning run.

use std::net::Ipv4Addr;
use thiserror::Error;

use crate::models::{ServiceType, TelcoPort};

/// Broad failure class, for tooling that reacts to a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// IPAM or monitoring data disagrees with what the run expects
    Inventory,
    /// The device could not be reached, logged into, or configured
    Connectivity,
    /// An external API or service returned an error
    External,
    /// The run's own inputs are unusable
    Input,
}

/// Every way a run can end early. Each variant maps to exit status 1.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid config parameters: {0:#}")]
    InvalidParameters(anyhow::Error),

    #[error("invalid mail settings: {0}")]
    MailSetup(String),

    #[error("the first available mgmt IP, {first_free}, is not the first IP of a /30 subnet")]
    MisalignedBlock { first_free: Ipv4Addr },

    #[error("the first available mgmt IP, {first_free}, does not have the next 3 consecutive IPs available ({occupied} is reserved)")]
    BlockNotFree { first_free: Ipv4Addr, occupied: Ipv4Addr },

    #[error("error reserving the mgmt IP: {0}")]
    ReservationFailed(String),

    #[error("no address found in IPAM for inventory number {inventory_number}")]
    NoMgmtAddress { inventory_number: String },

    #[error("could not find the core port from PONs {}", .pons.join(", "))]
    NoCorePort { pons: Vec<String> },

    #[error("{state} core port lookup matched {} ports: {}", .ports.len(), .ports.join("; "))]
    AmbiguousCorePort { state: &'static str, ports: Vec<String> },

    #[error("core router {router} runs unsupported OS '{os}'")]
    UnsupportedRouterOs { router: String, os: String },

    #[error("configuring {port} on {router} failed: {reason}")]
    CorePortConfig { router: String, port: String, reason: String },

    #[error("could not ping the Telco at {0}")]
    Unreachable(Ipv4Addr),

    #[error("could not SSH to the Telco at {host}: {reason}")]
    SshConnect { host: String, reason: String },

    #[error("login to {host} failed or the prompt did not show {expected}: {reason}")]
    LoginFailed { host: String, expected: String, reason: String },

    #[error("uplink is not currently on {}", candidates())]
    UnknownUplink,

    #[error("the {service} service has a LAN interface which is the current uplink ({interface})")]
    LanIsUplink { service: ServiceType, interface: TelcoPort },

    #[error("more than one service uses LAN interface {0}")]
    DuplicateLanInterface(TelcoPort),

    #[error("template rendering failed: {0}")]
    Render(String),

    #[error("config push did not return to the {expected} prompt: {reason}")]
    ApplyFailed { expected: String, reason: String },

    #[error("could not update IP description in IPAM: {0}")]
    InventoryUpdate(String),

    #[error("could not send the completion email: {0}")]
    Notify(String),

    #[error("{step} failed: {source:#}")]
    External {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

fn candidates() -> String {
    TelcoPort::UPLINK_CANDIDATES
        .iter()
        .map(TelcoPort::as_str)
        .collect::<Vec<_>>()
        .join(" or ")
}

impl ProvisionError {
    pub fn external(step: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::External { step, source }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            Self::InvalidParameters(_)
            | Self::MailSetup(_)
            | Self::LanIsUplink { .. }
            | Self::DuplicateLanInterface(_)
            | Self::Render(_) => FailureCategory::Input,
            Self::MisalignedBlock { .. }
            | Self::BlockNotFree { .. }
            | Self::NoMgmtAddress { .. }
            | Self::NoCorePort { .. }
            | Self::AmbiguousCorePort { .. }
            | Self::UnknownUplink => FailureCategory::Inventory,
            Self::UnsupportedRouterOs { .. }
            | Self::CorePortConfig { .. }
            | Self::Unreachable(_)
            | Self::SshConnect { .. }
            | Self::LoginFailed { .. }
            | Self::ApplyFailed { .. } => FailureCategory::Connectivity,
            Self::ReservationFailed(_)
            | Self::InventoryUpdate(_)
            | Self::Notify(_)
            | Self::External { .. } => FailureCategory::External,
        }
    }

    /// What the operator should do before running again
    pub fn hint(&self) -> &'static str {
        match self {
            Self::InvalidParameters(_) => "Fix CONFIG_PARAMETERS.json and try again.",
            Self::MailSetup(_) => "Fix MAIL_FROM, MAIL_TO and the SMTP settings, then try again.",
            Self::MisalignedBlock { .. } => {
                "Make sure the first available mgmt IP is the base of a /30 subnet and retry."
            }
            Self::BlockNotFree { .. } => {
                "Verify that the four addresses of the /30 are available in IPAM."
            }
            Self::ReservationFailed(_) => "Double check the first available mgmt IP in IPAM.",
            Self::NoMgmtAddress { .. } => "Check that this Telco was inventoried in IPAM.",
            Self::NoCorePort { .. } => {
                "Check that the core port description carries one of the PONs."
            }
            Self::AmbiguousCorePort { .. } => {
                "Only one core port may carry these PONs. Clean up the interface descriptions."
            }
            Self::UnsupportedRouterOs { .. } | Self::CorePortConfig { .. } => {
                "Configure the core port by hand, then run again."
            }
            Self::Unreachable(_) => "Please troubleshoot connectivity and then try again.",
            Self::SshConnect { .. } => "Check that SSH is reachable on the Telco.",
            Self::LoginFailed { .. } => {
                "The hostname does not match the inventory number, or SSH login failed. Please double check this is the correct Telco."
            }
            Self::UnknownUplink => "Please double check the current uplink of the Telco.",
            Self::LanIsUplink { .. } | Self::DuplicateLanInterface(_) => {
                "Please correct the LAN interfaces and try again."
            }
            Self::Render(_) => "Check the configuration template.",
            Self::ApplyFailed { .. } => "Review the Telco configuration by hand.",
            Self::InventoryUpdate(_) => "Update the mgmt IP descriptions in IPAM by hand.",
            Self::Notify(_) => "The Telco is configured. Email engineering about the core port by hand.",
            Self::External { .. } => "Check the external service and try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ProvisionError::MisalignedBlock { first_free: "10.254.3.9".parse().unwrap() };
        assert_eq!(
            err.to_string(),
            "the first available mgmt IP, 10.254.3.9, is not the first IP of a /30 subnet"
        );
        assert_eq!(err.category(), FailureCategory::Inventory);

        assert_eq!(
            ProvisionError::UnknownUplink.to_string(),
            "uplink is not currently on 1/1/1 or 1/3/1"
        );

        let err = ProvisionError::NoCorePort { pons: vec!["P1".into(), "P2".into()] };
        assert_eq!(err.to_string(), "could not find the core port from PONs P1, P2");
    }

    #[test]
    fn test_external_keeps_context_chain() {
        let source = anyhow::anyhow!("connection refused").context("LibreNMS port search");
        let err = ProvisionError::external("core port lookup")(source);
        assert_eq!(
            err.to_string(),
            "core port lookup failed: LibreNMS port search: connection refused"
        );
        assert_eq!(err.category(), FailureCategory::External);
    }
}
