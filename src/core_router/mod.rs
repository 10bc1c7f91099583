use regex_lite::Regex;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::ProvisionError;
use crate::models::{CorePort, RouterOs};
use crate::nms::PRESTAGE_MARKER;
use crate::session::{Expect, Prompt, SessionError, ShellSession, SshOptions};

/// Per-command prompt timeout on core routers
pub const ROUTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Exec or config-mode prompt of an IOS-XE / IOS-XR router,
/// e.g. `core1#`, `core1(config-if)#`, `RP/0/RSP0/CPU0:core1#`
const ROUTER_PROMPT: &str = r"(?m)^[\w.\-@/:]{1,80}(\([\w.\-@/:+]{0,40}\))?[>#]\s*$";

pub fn router_prompt() -> Result<Prompt, regex_lite::Error> {
    Regex::new(ROUTER_PROMPT).map(Prompt::Pattern)
}

/// Interface description once the port is in service
pub fn configured_description(current: &str, pon: &str) -> String {
    let cleaned = current
        .replace(&format!("({}D)", PRESTAGE_MARKER), "")
        .replace(&format!("({})", PRESTAGE_MARKER), "")
        .replace(PRESTAGE_MARKER, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = cleaned.trim_matches(|c: char| c == '-' || c.is_whitespace());

    if cleaned.is_empty() {
        pon.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Command sequence that brings a core port up as the Telco's mgmt gateway
pub fn core_port_commands(
    os: &RouterOs,
    port_name: &str,
    gateway: Ipv4Addr,
    description: &str,
) -> Option<Vec<String>> {
    let save: &[&str] = match os {
        RouterOs::IosXe => &["end", "write memory"],
        RouterOs::IosXr => &["commit", "end"],
        RouterOs::Other(_) => return None,
    };

    let mut commands = vec![
        "configure terminal".to_string(),
        format!("interface {}", port_name),
        format!("ip address {} 255.255.255.252", gateway),
        format!("description {}", description),
        "no shutdown".to_string(),
    ];
    commands.extend(save.iter().map(|c| c.to_string()));
    Some(commands)
}

/// Apply the mgmt gateway config to a core port over an open shell.
/// Returns the `show running-config` read-back of the interface.
pub fn configure_core_port<S: Expect + ?Sized>(
    shell: &mut S,
    port: &CorePort,
    gateway: Ipv4Addr,
) -> Result<String, ProvisionError> {
    let fail = |reason: SessionError| ProvisionError::CorePortConfig {
        router: port.router.hostname.clone(),
        port: port.port_name.clone(),
        reason: reason.to_string(),
    };

    let description = configured_description(&port.description, &port.pon);
    let commands = core_port_commands(&port.router.os, &port.port_name, gateway, &description)
        .ok_or_else(|| ProvisionError::UnsupportedRouterOs {
            router: port.router.hostname.clone(),
            os: port.router.os.to_string(),
        })?;

    let prompt = router_prompt().map_err(|e| ProvisionError::CorePortConfig {
        router: port.router.hostname.clone(),
        port: port.port_name.clone(),
        reason: e.to_string(),
    })?;
    shell.expect(&prompt, ROUTER_TIMEOUT).map_err(fail)?;
    // Long show output must not stop at a --More-- pager
    shell
        .command("terminal length 0", &prompt, ROUTER_TIMEOUT)
        .map_err(fail)?;

    for command in &commands {
        tracing::debug!("{}: {}", port.router.hostname, command);
        let output = shell.command(command, &prompt, ROUTER_TIMEOUT).map_err(fail)?;
        if let Some(line) = rejected_line(&output) {
            return Err(ProvisionError::CorePortConfig {
                router: port.router.hostname.clone(),
                port: port.port_name.clone(),
                reason: format!("'{}' was rejected: {}", command, line),
            });
        }
    }

    let show = shell
        .command(
            &format!("show running-config interface {}", port.port_name),
            &prompt,
            ROUTER_TIMEOUT,
        )
        .map_err(fail)?;

    Ok(show.lines().skip(1).collect::<Vec<_>>().join("\n").trim().to_string())
}

/// IOS marks a refused command with a `%` error line
fn rejected_line(output: &str) -> Option<&str> {
    const MARKERS: [&str; 4] = ["% Invalid", "% Incomplete", "% Ambiguous", "% Failed"];
    output
        .lines()
        .map(str::trim)
        .find(|line| MARKERS.iter().any(|m| line.starts_with(m)))
}

/// Connect to the router owning `port` and configure it. Blocking.
pub fn configure_core_port_ssh(
    port: &CorePort,
    gateway: Ipv4Addr,
    username: &str,
    password: &str,
) -> Result<String, ProvisionError> {
    let mut shell = ShellSession::open(
        &port.router.mgmt_ip,
        username,
        password,
        ROUTER_TIMEOUT.as_secs(),
        &SshOptions::default(),
    )
    .map_err(|e| ProvisionError::CorePortConfig {
        router: port.router.hostname.clone(),
        port: port.port_name.clone(),
        reason: e.to_string(),
    })?;

    let result = configure_core_port(&mut shell, port, gateway);
    shell.close();
    result
}
