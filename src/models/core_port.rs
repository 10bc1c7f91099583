use std::fmt;
use std::net::Ipv4Addr;

/// Core router operating system, selects the CLI dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterOs {
    IosXe,
    IosXr,
    Other(String),
}

impl From<String> for RouterOs {
    fn from(os: String) -> Self {
        match os.to_ascii_lowercase().as_str() {
            "iosxe" => Self::IosXe,
            "iosxr" => Self::IosXr,
            _ => Self::Other(os),
        }
    }
}

impl fmt::Display for RouterOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IosXe => f.write_str("iosxe"),
            Self::IosXr => f.write_str("iosxr"),
            Self::Other(os) => f.write_str(os),
        }
    }
}

/// Router that owns a core port, as known to the monitoring system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreRouter {
    pub hostname: String,
    pub mgmt_ip: String,
    pub os: RouterOs,
    pub location: String,
}

/// A monitored router port and its interface description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDetails {
    pub port_id: i64,
    pub port_name: String,
    pub description: String,
    pub router: CoreRouter,
}

/// The single core port facing a Telco circuit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorePort {
    pub port_id: i64,
    pub port_name: String,
    pub description: String,
    pub router: CoreRouter,
    /// PON found in the port description
    pub pon: String,
    /// False while the description still carries the prestage marker
    pub already_configured: bool,
}

impl CorePort {
    pub fn from_details(details: PortDetails, pon: String, already_configured: bool) -> Self {
        Self {
            port_id: details.port_id,
            port_name: details.port_name,
            description: details.description,
            router: details.router,
            pon,
            already_configured,
        }
    }
}

impl fmt::Display for CorePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.router.hostname, self.port_name)
    }
}

/// Telco management address and the core-side gateway of its /30
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MgmtAddress {
    pub telco: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl MgmtAddress {
    /// The gateway is the address just below the Telco's
    pub fn new(telco: Ipv4Addr) -> Self {
        Self {
            telco,
            gateway: Ipv4Addr::from(u32::from(telco).wrapping_sub(1)),
        }
    }

    /// Addresses of a /30 are base, gateway, Telco, broadcast
    pub fn from_block_base(base: Ipv4Addr) -> Self {
        Self::new(Ipv4Addr::from(u32::from(base).wrapping_add(2)))
    }

    /// True for the Telco host slot (`.2` of a /30)
    pub fn is_telco_slot(addr: Ipv4Addr) -> bool {
        addr.octets()[3] % 4 == 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_is_one_below() {
        let mgmt = MgmtAddress::new("10.254.3.10".parse().unwrap());
        assert_eq!(mgmt.gateway, "10.254.3.9".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_from_block_base() {
        let mgmt = MgmtAddress::from_block_base("10.254.3.8".parse().unwrap());
        assert_eq!(mgmt.telco, "10.254.3.10".parse::<Ipv4Addr>().unwrap());
        assert_eq!(mgmt.gateway, "10.254.3.9".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_telco_slot() {
        assert!(MgmtAddress::is_telco_slot("10.254.3.10".parse().unwrap()));
        assert!(!MgmtAddress::is_telco_slot("10.254.3.9".parse().unwrap()));
        assert!(!MgmtAddress::is_telco_slot("10.254.3.8".parse().unwrap()));
    }

    #[test]
    fn test_router_os_from_string() {
        assert_eq!(RouterOs::from("iosxe".to_string()), RouterOs::IosXe);
        assert_eq!(RouterOs::from("IOSXR".to_string()), RouterOs::IosXr);
        assert_eq!(RouterOs::from("junos".to_string()), RouterOs::Other("junos".to_string()));
    }
}
