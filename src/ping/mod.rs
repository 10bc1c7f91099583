use std::future::Future;
use std::net::Ipv4Addr;
use tokio::process::Command;
use tokio::time::{sleep, Duration};

use crate::error::ProvisionError;

/// Send `count` ICMP echoes. True when the ping binary reports success.
pub async fn probe(ip: Ipv4Addr, count: u32) -> bool {
    let output = Command::new("ping")
        .args(["-c", &count.to_string(), "-W", "2", &ip.to_string()])
        .output()
        .await;

    match output {
        Ok(output) => output.status.success(),
        Err(e) => {
            tracing::warn!("Failed to run ping: {}", e);
            false
        }
    }
}

/// Two pings then one more after `pause`. The first pair only warms up ARP on
/// the new /30; the last probe decides.
pub async fn wait_until_reachable(ip: Ipv4Addr, pause: Duration) -> Result<(), ProvisionError> {
    wait_until_reachable_with(ip, pause, probe).await
}

async fn wait_until_reachable_with<P, F>(
    ip: Ipv4Addr,
    pause: Duration,
    mut probe: P,
) -> Result<(), ProvisionError>
where
    P: FnMut(Ipv4Addr, u32) -> F,
    F: Future<Output = bool>,
{
    tracing::info!("Pinging {}", ip);
    let warmup = probe(ip, 2).await;
    tracing::debug!("Warm-up ping to {}: {}", ip, if warmup { "ok" } else { "no reply" });

    sleep(pause).await;

    if probe(ip, 1).await {
        tracing::info!("Ping to {} successful", ip);
        Ok(())
    } else {
        tracing::error!("Ping to {} failed", ip);
        Err(ProvisionError::Unreachable(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(results: Vec<bool>) -> (Arc<Mutex<Vec<u32>>>, impl FnMut(Ipv4Addr, u32) -> std::future::Ready<bool>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let mut results = results.into_iter();
        let probe = move |_ip: Ipv4Addr, count: u32| {
            seen.lock().unwrap().push(count);
            std::future::ready(results.next().unwrap_or(false))
        };
        (calls, probe)
    }

    #[tokio::test]
    async fn test_only_second_probe_gates() {
        let ip: Ipv4Addr = "10.254.3.10".parse().unwrap();

        let (calls, probe) = recorder(vec![false, true]);
        wait_until_reachable_with(ip, Duration::ZERO, probe).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![2, 1]);

        let (_, probe) = recorder(vec![true, false]);
        let err = wait_until_reachable_with(ip, Duration::ZERO, probe).await.unwrap_err();
        assert_eq!(err.to_string(), "could not ping the Telco at 10.254.3.10");
    }
}
