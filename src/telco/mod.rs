//! Telco 280 CLI session: hostname-guarded login, uplink discovery and config push.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::ProvisionError;
use crate::models::{ConfigParameters, TelcoPort};
use crate::provision::{enter, Stage};
use crate::render::{render_config, ConfigPlan};
use crate::session::{Expect, Prompt, SessionError, ShellSession, SshOptions};

/// Timeout for login, enable and show commands
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for the full config push to come back to the new hostname
pub const APPLY_TIMEOUT: Duration = Duration::from_secs(20);

/// VLAN the mgmt /30 rides on between the core and the Telco
pub const MGMT_VLAN: u16 = 254;

/// Pick the uplink out of a MAC table. `1/1/1` wins when both candidates appear.
pub fn parse_uplink(mac_table: &str) -> Option<TelcoPort> {
    let tokens: Vec<&str> = mac_table.split_whitespace().collect();
    TelcoPort::UPLINK_CANDIDATES
        .into_iter()
        .find(|port| tokens.contains(&port.as_str()))
}

/// A logged-in Telco shell. Every step is guarded by the hostname in the prompt.
pub struct TelcoSession<'a, S: Expect + ?Sized> {
    shell: &'a mut S,
    host: String,
    hostname: String,
}

impl<'a, S: Expect + ?Sized> TelcoSession<'a, S> {
    /// Wait for the user-mode prompt of the expected hostname
    pub fn login(shell: &'a mut S, host: &str, hostname: &str) -> Result<Self, ProvisionError> {
        let expected = format!("{}>", hostname);
        shell
            .expect(&Prompt::literal(expected.as_str()), PROMPT_TIMEOUT)
            .map_err(|e| ProvisionError::LoginFailed {
                host: host.to_string(),
                expected,
                reason: e.to_string(),
            })?;
        tracing::info!("Login to {} succeeded, prompt shows {}", host, hostname);

        Ok(Self {
            shell,
            host: host.to_string(),
            hostname: hostname.to_string(),
        })
    }

    fn exec_prompt(&self) -> Prompt {
        Prompt::literal(format!("{}#", self.hostname))
    }

    pub fn enable(&mut self) -> Result<(), ProvisionError> {
        let prompt = self.exec_prompt();
        self.shell
            .command("en", &prompt, PROMPT_TIMEOUT)
            .map_err(|e| self.login_failed(&prompt, e))?;
        tracing::info!("Entered enable mode on {}", self.hostname);
        Ok(())
    }

    /// Read the dynamic MAC table of the mgmt VLAN and find the port the core is learned on
    pub fn discover_uplink(&mut self) -> Result<TelcoPort, ProvisionError> {
        let prompt = self.exec_prompt();
        let output = self
            .shell
            .command(
                &format!("show mac-address-table vlan {} dynamic", MGMT_VLAN),
                &prompt,
                PROMPT_TIMEOUT,
            )
            .map_err(|e| self.login_failed(&prompt, e))?;
        tracing::debug!("MAC table output: {}", output.trim());

        parse_uplink(&output).ok_or(ProvisionError::UnknownUplink)
    }

    /// Push the rendered config. The device must come back with the new hostname.
    pub fn apply_config(&mut self, config: &str, new_hostname: &str) -> Result<String, ProvisionError> {
        let expected = format!("{}#", new_hostname);
        self.shell
            .command(config, &Prompt::literal(expected.as_str()), APPLY_TIMEOUT)
            .map_err(|e| ProvisionError::ApplyFailed {
                expected,
                reason: e.to_string(),
            })
    }

    fn login_failed(&self, prompt: &Prompt, reason: SessionError) -> ProvisionError {
        ProvisionError::LoginFailed {
            host: self.host.clone(),
            expected: prompt.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// What a successful Telco run produced
#[derive(Debug, Clone)]
pub struct TelcoOutcome {
    pub uplink: TelcoPort,
    pub plan: ConfigPlan,
    pub config: String,
}

/// Log in, discover the uplink, then render and push the config over `shell`.
/// Nothing is rendered or sent unless the uplink is one of the known candidates.
pub fn configure_telco<S: Expect + ?Sized>(
    shell: &mut S,
    host: &str,
    hostname: &str,
    params: &ConfigParameters,
    snmp_location: &str,
    template: &str,
) -> Result<TelcoOutcome, ProvisionError> {
    let mut session = TelcoSession::login(shell, host, hostname)?;

    enter(Stage::EnableMode);
    session.enable()?;

    enter(Stage::DiscoverUplink);
    let uplink = session.discover_uplink()?;
    println!("Found uplink: {}", uplink);
    tracing::info!("Found uplink: {}", uplink);

    enter(Stage::RenderConfig);
    let plan = ConfigPlan::derive(params, uplink, snmp_location)?;
    tracing::info!(
        "Unused interfaces which will be shutdown: {}",
        plan.unused_interfaces
            .iter()
            .map(TelcoPort::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    let config = render_config(template, &plan)?;
    tracing::info!("Generated config:\n{}", config);

    enter(Stage::ApplyConfig);
    session.apply_config(&config, &params.hostname)?;
    tracing::info!("Successfully applied config to {}", params.hostname);

    Ok(TelcoOutcome { uplink, plan, config })
}

/// Open the legacy-algorithm SSH session to the Telco and run [`configure_telco`]. Blocking.
pub fn provision_telco_ssh(
    mgmt_ip: Ipv4Addr,
    username: &str,
    password: &str,
    hostname: &str,
    params: &ConfigParameters,
    snmp_location: &str,
    template: &str,
) -> Result<TelcoOutcome, ProvisionError> {
    let host = mgmt_ip.to_string();
    enter(Stage::SshLogin);
    tracing::info!("SSHing to Telco at {} as {}", host, username);

    let mut shell = ShellSession::open(
        &host,
        username,
        password,
        PROMPT_TIMEOUT.as_secs(),
        &SshOptions::legacy(),
    )
    .map_err(|e| ProvisionError::SshConnect {
        host: host.clone(),
        reason: e.to_string(),
    })?;

    let outcome = configure_telco(&mut shell, &host, hostname, params, snmp_location, template);
    shell.close();
    outcome
}
