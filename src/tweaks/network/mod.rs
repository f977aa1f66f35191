// src/tweaks/network/mod.rs

pub mod dns;
pub mod guard;
pub mod nagle;

use anyhow::{Context, Result};

use crate::{
    backup::BackupManager,
    tweaks::{SystemContext, Tweak},
    utils::{
        network::interface_path,
        registry::{ConfigurationStore, RegistryHive, RegistryKeyValue},
    },
};

/// Values of a set of per-interface registry entries as they were before a change.
pub(crate) struct InterfaceSnapshot {
    entries: Vec<(String, &'static str, Option<RegistryKeyValue>)>,
}

impl InterfaceSnapshot {
    /// Reads `names` under every interface in `guids` and records them with the backup
    /// manager as well.
    pub fn capture(
        id: &str,
        store: &dyn ConfigurationStore,
        backup: &BackupManager,
        guids: &[String],
        names: &[&'static str],
    ) -> Result<Self> {
        let mut entries = Vec::new();
        for guid in guids {
            let path = interface_path(guid);
            for name in names {
                let current = store
                    .read_value(RegistryHive::LocalMachine, &path, name)
                    .with_context(|| format!("Failed to read {}\\{}", path, name))?;
                if let Err(e) = backup.backup_value(RegistryHive::LocalMachine, &path, name) {
                    tracing::warn!(
                        "{} -> Continuing without backup of {}\\{}: {}",
                        id,
                        path,
                        name,
                        e
                    );
                }
                entries.push((path.clone(), *name, current));
            }
        }
        Ok(Self { entries })
    }

    /// Puts the captured values of `guids` back, deleting the ones that did not exist.
    pub fn restore_interfaces(
        &self,
        store: &dyn ConfigurationStore,
        guids: &[String],
    ) -> Result<()> {
        let paths: Vec<String> = guids.iter().map(|guid| interface_path(guid)).collect();
        let mut first_error = None;
        for (path, name, value) in self.entries.iter().rev() {
            if !paths.contains(path) {
                continue;
            }
            let restored = match value {
                Some(value) => store.write_value(RegistryHive::LocalMachine, path, name, value),
                None => store.delete_value(RegistryHive::LocalMachine, path, name),
            };
            if let Err(e) = restored {
                tracing::error!("Failed to restore {}\\{}: {}", path, name, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e).context("Failed to restore network settings"),
            None => Ok(()),
        }
    }
}

pub fn all(ctx: &SystemContext) -> Vec<Tweak> {
    vec![nagle::disable_nagle(ctx), dns::set_dns(ctx)]
}
