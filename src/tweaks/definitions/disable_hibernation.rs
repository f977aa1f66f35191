// src/tweaks/definitions/disable_hibernation.rs

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    backup::BackupManager,
    constants::POWER_KEY_PATH,
    models::TweakResult,
    power::set_hibernation,
    tweaks::{SystemContext, TweakMethod},
    utils::{
        command::CommandRunner,
        registry::{ConfigurationStore, RegistryHive, RegistryKeyValue},
    },
};

const HIBERNATE_ENABLED: &str = "HibernateEnabled";

/// Turns hibernation off through `powercfg`, which also deletes `hiberfil.sys`.
/// The result is read back from the power key.
pub struct DisableHibernation {
    store: Arc<dyn ConfigurationStore>,
    runner: Arc<dyn CommandRunner>,
    backup: Arc<BackupManager>,
}

impl DisableHibernation {
    pub fn new(ctx: &SystemContext) -> Self {
        Self {
            store: ctx.store.clone(),
            runner: ctx.runner.clone(),
            backup: ctx.backup.clone(),
        }
    }

    fn hibernate_enabled(&self) -> Result<Option<RegistryKeyValue>> {
        self.store
            .read_value(RegistryHive::LocalMachine, POWER_KEY_PATH, HIBERNATE_ENABLED)
            .context("Failed to read hibernation state")
    }
}

impl TweakMethod for DisableHibernation {
    fn is_applied(&self, _id: &str) -> Result<bool> {
        Ok(self.hibernate_enabled()? == Some(RegistryKeyValue::Dword(0)))
    }

    fn apply(&self, id: &str) -> Result<TweakResult> {
        if self.is_applied(id)? {
            return Ok(TweakResult::success("Already applied"));
        }
        if let Err(e) =
            self.backup
                .backup_value(RegistryHive::LocalMachine, POWER_KEY_PATH, HIBERNATE_ENABLED)
        {
            tracing::warn!("{} -> Continuing without backup: {}", id, e);
        }

        if let Err(e) = set_hibernation(self.runner.as_ref(), false) {
            return Ok(TweakResult::failure(format!("{:#}", e)));
        }
        Ok(if self.is_applied(id)? {
            TweakResult::success("Hibernation disabled")
        } else {
            TweakResult::failure("Hibernation is still enabled after powercfg -h off")
        })
    }

    fn revert(&self, id: &str) -> Result<TweakResult> {
        if let Err(e) = set_hibernation(self.runner.as_ref(), true) {
            return Ok(TweakResult::failure(format!("{:#}", e)));
        }
        Ok(if self.is_applied(id)? {
            TweakResult::failure("Hibernation is still disabled after powercfg -h on")
        } else {
            TweakResult::success("Hibernation enabled")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{failed, ok, MemoryStore, ScriptedRunner, TestHarness};

    /// Runner whose `powercfg -h` updates the power key the way Windows does.
    fn harness(powercfg_works: bool) -> TestHarness {
        let store = Arc::new(MemoryStore::new());
        store.set(
            RegistryHive::LocalMachine,
            POWER_KEY_PATH,
            HIBERNATE_ENABLED,
            RegistryKeyValue::Dword(1),
        );
        let power = store.clone();
        let runner = ScriptedRunner::new(move |_, args| {
            if !powercfg_works {
                return failed("An unexpected error condition has occurred.");
            }
            let enabled = u32::from(args.last() == Some(&"on"));
            power.set(
                RegistryHive::LocalMachine,
                POWER_KEY_PATH,
                HIBERNATE_ENABLED,
                RegistryKeyValue::Dword(enabled),
            );
            ok("")
        });
        TestHarness::with_shared(store, Default::default(), runner)
    }

    #[test]
    fn test_apply_and_revert() {
        let h = harness(true);
        let tweak = DisableHibernation::new(&h.ctx);
        assert!(!tweak.is_applied("t").unwrap());

        let result = tweak.apply("t").unwrap();
        assert!(result.success, "{}", result.message);
        assert!(tweak.is_applied("t").unwrap());
        assert!(h.runner.ran("powercfg.exe", "off"));
        assert!(h
            .ctx
            .backup
            .has_backup(RegistryHive::LocalMachine, POWER_KEY_PATH, HIBERNATE_ENABLED));

        assert!(tweak.revert("t").unwrap().success);
        assert!(!tweak.is_applied("t").unwrap());
    }

    #[test]
    fn test_powercfg_failure_is_reported() {
        let h = harness(false);
        let tweak = DisableHibernation::new(&h.ctx);
        let result = tweak.apply("t").unwrap();
        assert!(!result.success);
        assert!(result.message.contains("powercfg -h off"), "{}", result.message);
    }
}
