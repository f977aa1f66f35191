// src/tweaks/network/guard.rs

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tracing::{debug, error, info};

use crate::{
    logging::{log_status, LogArea, OpStatus},
    models::TweakResult,
    utils::command::CommandRunner,
};

/// Outcome of a single reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub success: bool,
    pub latency: Option<Duration>,
}

impl ProbeResult {
    pub fn unreachable() -> Self {
        Self {
            success: false,
            latency: None,
        }
    }
}

/// Checks whether a host answers. One attempt, no retries.
pub trait ConnectivityProbe: Send + Sync {
    fn probe(&self, host: &str, timeout: Duration) -> ProbeResult;
}

/// Probe backed by the system `ping` tool.
pub struct PingProbe {
    runner: Arc<dyn CommandRunner>,
}

impl PingProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn args(host: &str, timeout: Duration) -> Vec<String> {
        if cfg!(windows) {
            vec![
                "-n".to_string(),
                "1".to_string(),
                "-w".to_string(),
                timeout.as_millis().to_string(),
                host.to_string(),
            ]
        } else {
            vec![
                "-c".to_string(),
                "1".to_string(),
                "-W".to_string(),
                timeout.as_secs().max(1).to_string(),
                host.to_string(),
            ]
        }
    }
}

impl ConnectivityProbe for PingProbe {
    fn probe(&self, host: &str, timeout: Duration) -> ProbeResult {
        let args = Self::args(host, timeout);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        // ping enforces its own timeout; the hard limit only covers a wedged process.
        let output = match self
            .runner
            .run("ping", &args, Some(timeout + Duration::from_secs(2)))
        {
            Ok(output) => output,
            Err(e) => {
                debug!("ping {} -> {}", host, e);
                return ProbeResult::unreachable();
            }
        };

        // Windows ping exits 0 for "Destination host unreachable" replies, so require a TTL.
        if !output.success() || !output.stdout.to_lowercase().contains("ttl=") {
            return ProbeResult::unreachable();
        }
        ProbeResult {
            success: true,
            latency: parse_latency(&output.stdout),
        }
    }
}

/// Extracts the round-trip time from ping output (`time=12ms`, `time<1ms`, `time=12.3 ms`).
pub fn parse_latency(output: &str) -> Option<Duration> {
    let lower = output.to_lowercase();
    let start = lower.find("time=").or_else(|| lower.find("time<"))? + "time=".len();
    let digits: String = lower[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let millis: f64 = digits.parse().ok()?;
    Some(Duration::from_secs_f64(millis / 1000.0))
}

/// Verifies that the machine can still reach the network after a change and undoes the
/// change when it cannot.
pub struct ConnectivityGuard {
    probe: Arc<dyn ConnectivityProbe>,
    default_host: String,
    timeout: Duration,
}

impl ConnectivityGuard {
    pub fn new(probe: Arc<dyn ConnectivityProbe>, default_host: String, timeout: Duration) -> Self {
        Self {
            probe,
            default_host,
            timeout,
        }
    }

    pub fn default_host(&self) -> &str {
        &self.default_host
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn probe(&self, host: &str) -> ProbeResult {
        let result = self.probe.probe(host, self.timeout);
        debug!(
            "Probe {} -> success: {}, latency: {:?}",
            host, result.success, result.latency
        );
        result
    }

    /// Probes the default host.
    pub fn check(&self) -> ProbeResult {
        self.probe(&self.default_host)
    }

    /// Probes `host` (the default host when `None`) after a change has been applied.
    ///
    /// Returns `applied` untouched when the host answers. Otherwise runs `rollback`
    /// before returning, and reports the change as failed.
    pub fn verify_or_rollback(
        &self,
        id: &str,
        host: Option<&str>,
        applied: TweakResult,
        rollback: impl FnOnce() -> Result<()>,
    ) -> Result<TweakResult> {
        let host = host.unwrap_or(&self.default_host);
        if self.probe(host).success {
            info!("{} -> Connectivity to {} confirmed.", id, host);
            return Ok(applied);
        }

        log_status(
            LogArea::Network,
            id,
            OpStatus::Warning,
            &format!("{} unreachable after change, rolling back", host),
        );
        rollback().map_err(|e| {
            error!("{} -> Rollback after connectivity loss failed: {:#}", id, e);
            e.context(format!("{}: rollback after connectivity loss failed", id))
        })?;
        log_status(LogArea::Network, id, OpStatus::Reverted, "Safety rollback complete");
        Ok(TweakResult::failure(
            "Connectivity lost after applying tweak - changes reverted",
        ))
    }
}
