//! The provisioning run: one linear pass, aborted by the first failing step.

use async_trait::async_trait;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use tokio::time::Duration;

use crate::config::Config;
use crate::core_router::configure_core_port_ssh;
use crate::error::ProvisionError;
use crate::ipam::{lookup_mgmt_address, relabel_mgmt_block, reserve_mgmt_block, AddressBook, IpamClient, MgmtBlock};
use crate::models::{ConfigParameters, CorePort, MgmtAddress, TelcoPort};
use crate::nms::{resolve_core_port, NmsClient, PortDirectory};
use crate::notify::{CompletionNotice, Mailer};
use crate::render::{load_template, render_config, ConfigPlan};
use crate::telco::{provision_telco_ssh, TelcoOutcome};

/// Steps of a provisioning run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadParams,
    ResolveMgmtIp,
    ResolveCorePort,
    ConfigureCorePort,
    PingCheck,
    SshLogin,
    EnableMode,
    DiscoverUplink,
    RenderConfig,
    ApplyConfig,
    UpdateInventory,
    Notify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadParams => "LOAD_PARAMS",
            Self::ResolveMgmtIp => "RESOLVE_MGMT_IP",
            Self::ResolveCorePort => "RESOLVE_CORE_PORT",
            Self::ConfigureCorePort => "CONFIGURE_CORE_PORT",
            Self::PingCheck => "PING_CHECK",
            Self::SshLogin => "SSH_LOGIN",
            Self::EnableMode => "ENABLE_MODE",
            Self::DiscoverUplink => "DISCOVER_UPLINK",
            Self::RenderConfig => "RENDER_CONFIG",
            Self::ApplyConfig => "APPLY_CONFIG",
            Self::UpdateInventory => "UPDATE_INVENTORY",
            Self::Notify => "NOTIFY",
        };
        f.write_str(name)
    }
}

pub(crate) fn enter(stage: Stage) {
    tracing::info!(stage = %stage, "Entering {}", stage);
}

/// What a finished run did
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub mgmt: MgmtAddress,
    pub core_port: CorePort,
    pub telco: TelcoOutcome,
    pub relabelled: usize,
}

/// Inputs fixed at LOAD_PARAMS
#[derive(Debug, Clone)]
pub struct Run {
    pub params: ConfigParameters,
    pub template: String,
    /// IPAM hostname of the mgmt block
    pub label: String,
    /// Hostname the Telco answers with before it is configured
    pub telco_hostname: String,
}

/// Steps of a run that act on devices or send mail
#[async_trait]
pub trait Actions: Send + Sync {
    /// Returns the interface read-back
    async fn configure_core_port(&self, port: &CorePort, gateway: Ipv4Addr) -> Result<String, ProvisionError>;
    async fn ping(&self, ip: Ipv4Addr) -> Result<(), ProvisionError>;
    async fn configure_telco(
        &self,
        ip: Ipv4Addr,
        hostname: &str,
        params: &ConfigParameters,
        snmp_location: &str,
        template: &str,
    ) -> Result<TelcoOutcome, ProvisionError>;
    async fn notify(&self, notice: &CompletionNotice) -> Result<(), ProvisionError>;
}

pub fn load_params(path: &Path) -> Result<ConfigParameters, ProvisionError> {
    let params = ConfigParameters::load(path).map_err(ProvisionError::InvalidParameters)?;
    tracing::info!("Running for config parameters: {:?}", params);
    Ok(params)
}

fn read_template(path: &Path) -> Result<String, ProvisionError> {
    load_template(path).map_err(|e| ProvisionError::Render(format!("{:#}", e)))
}

fn load_mailer(cfg: &Config) -> Result<Mailer, ProvisionError> {
    Mailer::from_config(cfg).map_err(|e| ProvisionError::MailSetup(format!("{:#}", e)))
}

/// Run blocking SSH work off the async runtime
async fn blocking<T, F>(step: &'static str, work: F) -> Result<T, ProvisionError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProvisionError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ProvisionError::external(step)(anyhow::anyhow!("task panicked: {}", e)))?
}

/// Routers and the Telco over SSH, ICMP, and the SMTP relay
struct LiveActions {
    cfg: Config,
    mailer: Mailer,
}

#[async_trait]
impl Actions for LiveActions {
    async fn configure_core_port(&self, port: &CorePort, gateway: Ipv4Addr) -> Result<String, ProvisionError> {
        let port = port.clone();
        let (user, pass) = (self.cfg.router_username.clone(), self.cfg.router_password.clone());
        blocking("core port configuration", move || {
            configure_core_port_ssh(&port, gateway, &user, &pass)
        })
        .await
    }

    async fn ping(&self, ip: Ipv4Addr) -> Result<(), ProvisionError> {
        crate::ping::wait_until_reachable(ip, Duration::from_secs(self.cfg.ping_pause_secs)).await
    }

    async fn configure_telco(
        &self,
        ip: Ipv4Addr,
        hostname: &str,
        params: &ConfigParameters,
        snmp_location: &str,
        template: &str,
    ) -> Result<TelcoOutcome, ProvisionError> {
        let (user, pass) = (self.cfg.telco_username.clone(), self.cfg.telco_password.clone());
        let hostname = hostname.to_string();
        let params = params.clone();
        let snmp_location = snmp_location.to_string();
        let template = template.to_string();
        blocking("Telco configuration", move || {
            provision_telco_ssh(ip, &user, &pass, &hostname, &params, &snmp_location, &template)
        })
        .await
    }

    async fn notify(&self, notice: &CompletionNotice) -> Result<(), ProvisionError> {
        self.mailer
            .send(notice)
            .await
            .map_err(|e| ProvisionError::Notify(format!("{:#}", e)))
    }
}

/// Provision the Telco described by the parameters file.
/// Parameters, template and mail settings are all checked before any external system is contacted.
pub async fn run_provision(
    cfg: &Config,
    params_path: &Path,
    template_path: &Path,
) -> Result<ProvisionReport, ProvisionError> {
    enter(Stage::LoadParams);
    let params = load_params(params_path)?;
    let template = read_template(template_path)?;
    let mailer = load_mailer(cfg)?;
    let run = Run {
        label: cfg.inventory_label(&params.inventory_number),
        telco_hostname: cfg.telco_hostname(&params.inventory_number),
        params,
        template,
    };

    enter(Stage::ResolveMgmtIp);
    let ipam = IpamClient::login(cfg)
        .await
        .map_err(ProvisionError::external("IPAM login"))?;
    let nms = NmsClient::new(cfg.nms_base_url.clone(), cfg.nms_token.clone())
        .map_err(ProvisionError::external("LibreNMS client setup"))?;
    let actions = LiveActions {
        cfg: cfg.clone(),
        mailer,
    };

    execute(&run, &ipam, &nms, &actions).await
}

/// The run from RESOLVE_MGMT_IP on, against connected inventory systems
pub async fn execute<B, D, A>(
    run: &Run,
    book: &B,
    directory: &D,
    actions: &A,
) -> Result<ProvisionReport, ProvisionError>
where
    B: AddressBook + ?Sized,
    D: PortDirectory + ?Sized,
    A: Actions + ?Sized,
{
    let params = &run.params;
    tracing::info!("Looking up mgmt IP for inventory number {}", params.inventory_number);
    let mgmt = lookup_mgmt_address(book, &run.label, &params.inventory_number).await?;
    tracing::info!("Found mgmt IP {} with default gateway {}", mgmt.telco, mgmt.gateway);

    enter(Stage::ResolveCorePort);
    let pons = params.pons();
    let core_port = resolve_core_port(directory, &pons)
        .await?
        .ok_or(ProvisionError::NoCorePort { pons })?;
    println!(
        "Found port {} on {} with description: {}\n",
        core_port.port_name, core_port.router.hostname, core_port.description
    );
    tracing::info!("SNMP location from core router: {}", core_port.router.location);

    if core_port.already_configured {
        println!(
            "Core interface {} on {} is already configured\n",
            core_port.port_name, core_port.router.hostname
        );
        tracing::info!("Core interface {} is already configured", core_port);
    } else {
        enter(Stage::ConfigureCorePort);
        let show = actions.configure_core_port(&core_port, mgmt.gateway).await?;
        println!("Configured interface {} on {}", core_port.port_name, core_port.router.hostname);
        println!("{}\n", show);
        tracing::info!("Configured core interface {}:\n{}", core_port, show);
    }

    enter(Stage::PingCheck);
    actions.ping(mgmt.telco).await?;
    println!("Ping to {} successful. Configuring Telco via SSH...\n", mgmt.telco);

    tracing::info!("Expecting the Telco hostname to be {}", run.telco_hostname);
    let telco = actions
        .configure_telco(
            mgmt.telco,
            &run.telco_hostname,
            params,
            &core_port.router.location,
            &run.template,
        )
        .await?;
    println!("Applied config, the Telco is now {}\n", params.hostname);

    enter(Stage::UpdateInventory);
    let description = params.inventory_description();
    tracing::info!("New IPAM description: {}", description);
    let relabelled = relabel_mgmt_block(book, &run.label, &description).await?;

    enter(Stage::Notify);
    let notice = CompletionNotice::new(&core_port.router.hostname, &core_port.port_name, &params.hostname);
    actions.notify(&notice).await?;

    tracing::info!("Provisioning of {} complete", params.hostname);
    Ok(ProvisionReport {
        mgmt,
        core_port,
        telco,
        relabelled,
    })
}

/// Reserve a fresh mgmt /30 for a Telco being inventoried
pub async fn run_reserve(cfg: &Config, inventory_number: &str) -> Result<MgmtBlock, ProvisionError> {
    if !crate::utils::is_valid_hostname(inventory_number) {
        return Err(ProvisionError::InvalidParameters(anyhow::anyhow!(
            "inventory number '{}' contains invalid characters",
            inventory_number
        )));
    }

    let ipam = IpamClient::login(cfg)
        .await
        .map_err(ProvisionError::external("IPAM login"))?;
    let subnet_id = ipam
        .find_subnet_id(&cfg.ipam_section_id, &cfg.mgmt_subnet)
        .await
        .map_err(ProvisionError::external("mgmt subnet lookup"))?;

    let label = cfg.inventory_label(inventory_number);
    let block = reserve_mgmt_block(&ipam, &subnet_id, &label).await?;
    tracing::info!(
        "Reserved mgmt block {}/30 for inventory number {}, Telco mgmt IP {}",
        block.base, inventory_number, block.mgmt.telco
    );
    Ok(block)
}

/// Render the config offline for a given uplink, without touching any device
pub fn run_render(
    params_path: &Path,
    template_path: &Path,
    uplink: TelcoPort,
    snmp_location: &str,
) -> Result<String, ProvisionError> {
    if !uplink.is_uplink_candidate() {
        return Err(ProvisionError::UnknownUplink);
    }
    let params = load_params(params_path)?;
    let template = read_template(template_path)?;
    let plan = ConfigPlan::derive(&params, uplink, snmp_location)?;
    render_config(&template, &plan)
}
