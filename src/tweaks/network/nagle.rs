// src/tweaks/network/nagle.rs

use std::{slice, sync::Arc};

use anyhow::Result;
use tracing::{debug, error, warn};

use super::{guard::ConnectivityGuard, InterfaceSnapshot};
use crate::{
    backup::BackupManager,
    errors::StoreError,
    logging::LogArea,
    models::{RiskLevel, TweakResult},
    tweaks::{SystemContext, Tweak, TweakMethod},
    utils::{
        network::{active_interface_guids, interface_path},
        registry::{ConfigurationStore, RegistryHive, RegistryKeyValue},
    },
};

const NAGLE_VALUES: [&str; 2] = ["TcpNoDelay", "TcpAckFrequency"];

/// Disables Nagle's algorithm and delayed ACKs on every active interface.
pub struct NagleTweak {
    store: Arc<dyn ConfigurationStore>,
    backup: Arc<BackupManager>,
    guard: Arc<ConnectivityGuard>,
}

impl NagleTweak {
    pub fn new(ctx: &SystemContext) -> Self {
        Self {
            store: ctx.store.clone(),
            backup: ctx.backup.clone(),
            guard: ctx.guard.clone(),
        }
    }

    fn apply_interface(&self, guid: &str) -> Result<(), StoreError> {
        let path = interface_path(guid);
        NAGLE_VALUES.iter().try_for_each(|name| {
            self.store.write_value(
                RegistryHive::LocalMachine,
                &path,
                name,
                &RegistryKeyValue::Dword(1),
            )
        })
    }

    fn interface_applied(&self, guid: &str) -> bool {
        let path = interface_path(guid);
        NAGLE_VALUES.iter().all(|name| {
            matches!(
                self.store.read_value(RegistryHive::LocalMachine, &path, name),
                Ok(Some(RegistryKeyValue::Dword(1)))
            )
        })
    }
}

impl TweakMethod for NagleTweak {
    fn is_applied(&self, id: &str) -> Result<bool> {
        let guids = active_interface_guids(self.store.as_ref())?;
        let applied = guids.iter().any(|guid| self.interface_applied(guid));
        debug!("{} -> Nagle disabled on an active interface: {}", id, applied);
        Ok(applied)
    }

    fn apply(&self, id: &str) -> Result<TweakResult> {
        let guids = active_interface_guids(self.store.as_ref())?;
        if guids.is_empty() {
            return Ok(TweakResult::failure("No active network interfaces found"));
        }
        if guids.iter().all(|guid| self.interface_applied(guid)) {
            return Ok(TweakResult::success("Already applied"));
        }

        let snapshot = InterfaceSnapshot::capture(
            id,
            self.store.as_ref(),
            &self.backup,
            &guids,
            &NAGLE_VALUES,
        )?;

        let mut succeeded = Vec::new();
        let mut failed = 0;
        for guid in &guids {
            match self.apply_interface(guid) {
                Ok(()) => succeeded.push(guid.clone()),
                Err(e) => {
                    error!("{} -> {}", id, e);
                    failed += 1;
                    if let Err(e) =
                        snapshot.restore_interfaces(self.store.as_ref(), slice::from_ref(guid))
                    {
                        warn!("{} -> Interface {} left partially changed: {:#}", id, guid, e);
                    }
                }
            }
        }
        if succeeded.is_empty() {
            return Ok(TweakResult::failure(format!(
                "Failed to disable Nagle's Algorithm on {} interface(s)",
                failed
            )));
        }

        let message = if failed == 0 {
            format!("Nagle's Algorithm disabled on {} interface(s)", succeeded.len())
        } else {
            format!(
                "Nagle's Algorithm disabled on {} of {} interface(s), {} failed",
                succeeded.len(),
                guids.len(),
                failed
            )
        };
        self.guard
            .verify_or_rollback(id, None, TweakResult::success(message), || {
                snapshot.restore_interfaces(self.store.as_ref(), &succeeded)
            })
    }

    fn revert(&self, id: &str) -> Result<TweakResult> {
        let guids = active_interface_guids(self.store.as_ref())?;
        let mut failed = 0;
        for guid in &guids {
            let path = interface_path(guid);
            for name in NAGLE_VALUES {
                if let Err(e) = self
                    .store
                    .delete_value(RegistryHive::LocalMachine, &path, name)
                {
                    error!("{} -> Failed to remove {} on {}: {}", id, name, guid, e);
                    failed += 1;
                }
            }
        }
        Ok(if failed == 0 {
            TweakResult::success(format!(
                "Nagle's Algorithm restored on {} interface(s)",
                guids.len()
            ))
        } else {
            TweakResult::failure(format!("Failed to remove {} value(s)", failed))
        })
    }
}

pub fn disable_nagle(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "disable-nagle",
        "Disable Nagle's Algorithm",
        "Sends small TCP packets immediately instead of batching them. Lowers latency in games and remote sessions.",
        RiskLevel::Moderate,
        LogArea::Network,
        NagleTweak::new(ctx),
    )
}
