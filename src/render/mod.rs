use anyhow::{Context as _, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tera::{Context, Tera};

use crate::error::ProvisionError;
use crate::models::{ConfigParameters, ServiceType, TelcoPort};
use crate::utils::strip_blank_lines;

/// A service as the template sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PlannedService {
    pub pon: String,
    #[serde(rename = "TYPE")]
    pub service_type: ServiceType,
    pub vlan: u16,
    pub lan_interface: TelcoPort,
    pub upload_bandwidth: u32,
    pub download_bandwidth: u32,
}

/// Everything the template needs, derived once from the parameters and what the run discovered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigPlan {
    pub hostname: String,
    pub uplink: TelcoPort,
    pub snmp_location: String,
    pub services: Vec<PlannedService>,
    /// Ports to shut down, in front-panel order
    pub unused_interfaces: Vec<TelcoPort>,
    /// Shape on the uplink instead of policing each customer port
    pub shaper_on_uplink: bool,
    pub max_upload_bandwidth: u32,
}

impl ConfigPlan {
    pub fn derive(
        params: &ConfigParameters,
        uplink: TelcoPort,
        snmp_location: &str,
    ) -> Result<Self, ProvisionError> {
        let mut used = HashSet::new();
        let mut services = Vec::with_capacity(params.services.len());

        for service in &params.services {
            if service.lan_interface == uplink {
                return Err(ProvisionError::LanIsUplink {
                    service: service.service_type,
                    interface: uplink,
                });
            }
            if !used.insert(service.lan_interface) {
                return Err(ProvisionError::DuplicateLanInterface(service.lan_interface));
            }

            services.push(PlannedService {
                pon: service.pon.clone(),
                service_type: service.service_type,
                vlan: service.service_type.vlan_id(),
                lan_interface: service.lan_interface,
                upload_bandwidth: service.bandwidth.upload,
                download_bandwidth: service.bandwidth.download,
            });
        }

        let unused_interfaces = TelcoPort::ALL
            .into_iter()
            .filter(|port| *port != uplink && !used.contains(port))
            .collect();

        Ok(Self {
            hostname: params.hostname.clone(),
            uplink,
            snmp_location: snmp_location.to_string(),
            shaper_on_uplink: shaper_on_uplink(&services),
            max_upload_bandwidth: services.iter().map(|s| s.upload_bandwidth).max().unwrap_or(0),
            services,
            unused_interfaces,
        })
    }
}

/// One service, or two where one is voice: shape the whole circuit on the uplink.
/// Anything else is policed per customer port.
fn shaper_on_uplink(services: &[PlannedService]) -> bool {
    match services {
        [_] => true,
        [a, b] => a.service_type.is_latency_sensitive() || b.service_type.is_latency_sensitive(),
        _ => false,
    }
}

pub fn load_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))
}

/// Render the Telco config and drop blank lines
pub fn render_config(template: &str, plan: &ConfigPlan) -> Result<String, ProvisionError> {
    let render_err = |e: tera::Error| ProvisionError::Render(format!("{:#}", anyhow::Error::new(e)));

    let mut tera = Tera::default();
    tera.add_raw_template("telco280", template).map_err(render_err)?;

    let mut context = Context::new();
    context.insert("HOSTNAME", &plan.hostname);
    context.insert("UPLINK", &plan.uplink);
    context.insert("SNMP_LOCATION", &plan.snmp_location);
    context.insert("SERVICES", &plan.services);
    context.insert("UNUSED_INTERFACES", &plan.unused_interfaces);
    context.insert("SHAPER_ON_UPLINK", &plan.shaper_on_uplink);
    context.insert("MAX_UPLOAD_BANDWIDTH", &plan.max_upload_bandwidth);

    let rendered = tera.render("telco280", &context).map_err(render_err)?;
    Ok(strip_blank_lines(&rendered))
}
