// src/tweaks/network/dns.rs

use std::sync::Arc;

use anyhow::Result;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{debug, error, warn};

use super::{guard::ConnectivityGuard, InterfaceSnapshot};
use crate::{
    backup::BackupManager,
    logging::LogArea,
    models::{RiskLevel, TweakResult},
    tweaks::{SystemContext, Tweak, TweakMethod},
    utils::{
        command::CommandRunner,
        network::{active_interface_guids, flush_dns, interface_path},
        registry::{ConfigurationStore, RegistryHive, RegistryKeyValue},
    },
};

const NAME_SERVER: &str = "NameServer";

/// Public resolvers the DNS tweak can switch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum DnsProvider {
    Cloudflare,
    Google,
    Quad9,
}

impl DnsProvider {
    pub fn primary(self) -> &'static str {
        match self {
            DnsProvider::Cloudflare => "1.1.1.1",
            DnsProvider::Google => "8.8.8.8",
            DnsProvider::Quad9 => "9.9.9.9",
        }
    }

    pub fn secondary(self) -> &'static str {
        match self {
            DnsProvider::Cloudflare => "1.0.0.1",
            DnsProvider::Google => "8.8.4.4",
            DnsProvider::Quad9 => "149.112.112.112",
        }
    }

    /// Value written to an interface's `NameServer` entry.
    pub fn name_server_value(self) -> String {
        format!("{},{}", self.primary(), self.secondary())
    }
}

pub struct DnsTweak {
    provider: DnsProvider,
    store: Arc<dyn ConfigurationStore>,
    runner: Arc<dyn CommandRunner>,
    backup: Arc<BackupManager>,
    guard: Arc<ConnectivityGuard>,
}

impl DnsTweak {
    pub fn new(ctx: &SystemContext, provider: DnsProvider) -> Self {
        Self {
            provider,
            store: ctx.store.clone(),
            runner: ctx.runner.clone(),
            backup: ctx.backup.clone(),
            guard: ctx.guard.clone(),
        }
    }

    fn name_server(&self, guid: &str) -> Option<String> {
        match self
            .store
            .read_value(RegistryHive::LocalMachine, &interface_path(guid), NAME_SERVER)
        {
            Ok(Some(RegistryKeyValue::String(value))) => Some(value),
            _ => None,
        }
    }

    fn flush(&self, id: &str) {
        if let Err(e) = flush_dns(self.runner.as_ref()) {
            warn!("{} -> {:#}", id, e);
        }
    }
}

impl TweakMethod for DnsTweak {
    fn is_applied(&self, id: &str) -> Result<bool> {
        let expected = self.provider.name_server_value();
        let guids = active_interface_guids(self.store.as_ref())?;
        let applied = guids
            .iter()
            .any(|guid| self.name_server(guid).as_deref() == Some(expected.as_str()));
        debug!("{} -> {} DNS configured: {}", id, self.provider, applied);
        Ok(applied)
    }

    fn apply(&self, id: &str) -> Result<TweakResult> {
        let guids = active_interface_guids(self.store.as_ref())?;
        if guids.is_empty() {
            return Ok(TweakResult::failure("No active network interfaces found"));
        }
        let value = self.provider.name_server_value();
        if guids
            .iter()
            .all(|guid| self.name_server(guid).as_deref() == Some(value.as_str()))
        {
            return Ok(TweakResult::success("Already applied"));
        }

        let snapshot = InterfaceSnapshot::capture(
            id,
            self.store.as_ref(),
            &self.backup,
            &guids,
            &[NAME_SERVER],
        )?;

        let mut succeeded = Vec::new();
        let mut failed = 0;
        for guid in &guids {
            match self.store.write_value(
                RegistryHive::LocalMachine,
                &interface_path(guid),
                NAME_SERVER,
                &RegistryKeyValue::String(value.clone()),
            ) {
                Ok(()) => succeeded.push(guid.clone()),
                Err(e) => {
                    error!("{} -> Failed to set DNS on {}: {}", id, guid, e);
                    failed += 1;
                }
            }
        }
        if succeeded.is_empty() {
            return Ok(TweakResult::failure(format!(
                "Failed to set DNS on {} interface(s)",
                failed
            )));
        }
        self.flush(id);

        let applied = TweakResult::success(if failed == 0 {
            format!(
                "DNS set to {} ({}) on {} interface(s)",
                self.provider,
                value,
                succeeded.len()
            )
        } else {
            format!(
                "DNS set to {} ({}) on {} of {} interface(s), {} failed",
                self.provider,
                value,
                succeeded.len(),
                guids.len(),
                failed
            )
        });
        let result = self.guard.verify_or_rollback(
            id,
            Some(self.provider.primary()),
            applied,
            || {
                snapshot.restore_interfaces(self.store.as_ref(), &succeeded)?;
                self.flush(id);
                Ok(())
            },
        )?;
        Ok(if result.success {
            result
        } else {
            TweakResult::failure("Could not reach DNS server - changes reverted")
        })
    }

    /// Clears the static name servers so the interfaces go back to DHCP-provided DNS.
    fn revert(&self, id: &str) -> Result<TweakResult> {
        let guids = active_interface_guids(self.store.as_ref())?;
        let mut failed = 0;
        for guid in &guids {
            if let Err(e) = self.store.write_value(
                RegistryHive::LocalMachine,
                &interface_path(guid),
                NAME_SERVER,
                &RegistryKeyValue::String(String::new()),
            ) {
                error!("{} -> Failed to reset DNS on {}: {}", id, guid, e);
                failed += 1;
            }
        }
        self.flush(id);
        Ok(if failed == 0 {
            TweakResult::success("DNS reset to automatic")
        } else {
            TweakResult::failure(format!("Failed to reset DNS on {} interface(s)", failed))
        })
    }
}

pub fn set_dns(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "set-dns",
        "Use Fast DNS Servers",
        "Points every active network adapter at a fast public DNS resolver.",
        RiskLevel::Moderate,
        LogArea::Network,
        DnsTweak::new(ctx, ctx.settings.dns_provider),
    )
}
