// src/tweaks/registry/method.rs

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, warn};

use crate::{
    backup::BackupManager,
    models::TweakResult,
    tweaks::{SystemContext, TweakMethod},
    utils::registry::{full_path, ConfigurationStore, RegistryHive, RegistryKeyValue},
};

/// Represents a single registry modification, including the registry key, value name,
/// desired value, and default value.
#[derive(Debug, Clone)]
pub struct RegistryModification {
    pub hive: RegistryHive,
    /// Path of the registry key below the hive.
    pub path: &'static str,
    /// Name of the registry value to modify.
    pub key: &'static str,
    /// The value to set when applying the tweak.
    pub target_value: RegistryKeyValue,
    /// The default value to revert to when undoing the tweak.
    /// If `None`, reverting deletes the registry value.
    pub default_value: Option<RegistryKeyValue>,
}

impl RegistryModification {
    fn describe(&self) -> String {
        format!("{}\\{}", full_path(self.hive, self.path), self.key)
    }
}

/// Defines a set of modifications to the Windows registry, which in combination
/// make up a single tweak.
pub struct RegistryTweak {
    store: Arc<dyn ConfigurationStore>,
    backup: Arc<BackupManager>,
    modifications: Vec<RegistryModification>,
}

impl RegistryTweak {
    pub fn new(ctx: &SystemContext, modifications: Vec<RegistryModification>) -> Self {
        Self {
            store: ctx.store.clone(),
            backup: ctx.backup.clone(),
            modifications,
        }
    }

    pub fn modifications(&self) -> &[RegistryModification] {
        &self.modifications
    }

    fn read(&self, modification: &RegistryModification) -> Result<Option<RegistryKeyValue>> {
        self.store
            .read_value(modification.hive, modification.path, modification.key)
            .with_context(|| format!("Failed to read '{}'", modification.describe()))
    }

    /// Writes `value` (deleting when `None`) and reads it back.
    fn write_verified(
        &self,
        modification: &RegistryModification,
        value: Option<&RegistryKeyValue>,
    ) -> Result<()> {
        match value {
            Some(value) => self
                .store
                .write_value(modification.hive, modification.path, modification.key, value),
            None => self
                .store
                .delete_value(modification.hive, modification.path, modification.key),
        }
        .with_context(|| format!("Failed to write '{}'", modification.describe()))?;

        let found = self.read(modification)?;
        if found.as_ref() != value {
            anyhow::bail!(
                "Verification failed for '{}': expected {:?}, found {:?}",
                modification.describe(),
                value,
                found
            );
        }
        Ok(())
    }

    /// Rolls back previously changed modifications, newest first.
    ///
    /// Keeps going past individual failures and reports the first one.
    fn rollback(
        &self,
        id: &str,
        modifications: &[(&RegistryModification, Option<RegistryKeyValue>)],
        operation: &str,
    ) -> Result<()> {
        debug!("{} -> Initiating rollback for {} operation.", id, operation);
        let mut first_error = None;
        for (modification, original_value) in modifications.iter().rev() {
            let restored = match original_value {
                Some(val) => self
                    .store
                    .write_value(modification.hive, modification.path, modification.key, val)
                    .with_context(|| {
                        format!("Failed to restore value '{}'", modification.describe())
                    }),
                None => self
                    .store
                    .delete_value(modification.hive, modification.path, modification.key)
                    .with_context(|| {
                        format!("Failed to delete value '{}'", modification.describe())
                    }),
            };
            if let Err(e) = restored {
                error!("{} -> {:#}", id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("{} -> Successfully rolled back {} operation.", id, operation);
                Ok(())
            }
        }
    }

    /// Moves every modification to the value picked by `desired`, atomically.
    fn transition(
        &self,
        id: &str,
        operation: &str,
        backup_first: bool,
        desired: impl Fn(&RegistryModification) -> Option<&RegistryKeyValue>,
    ) -> TweakResult {
        let mut changed = Vec::new();

        for modification in &self.modifications {
            let mut step = || -> Result<()> {
                let original = self.read(modification)?;
                if backup_first {
                    if let Err(e) = self.backup.backup_value(
                        modification.hive,
                        modification.path,
                        modification.key,
                    ) {
                        warn!(
                            "{} -> Continuing without backup of '{}': {}",
                            id,
                            modification.describe(),
                            e
                        );
                    }
                }
                changed.push((modification, original));
                self.write_verified(modification, desired(modification))
            };

            if let Err(e) = step() {
                error!(
                    "{} -> Error occurred during {}: {:#}. Attempting rollback.",
                    id, operation, e
                );
                let note = match self.rollback(id, &changed, operation) {
                    Ok(()) => "changes rolled back".to_string(),
                    Err(rollback_err) => {
                        error!(
                            "{} -> Failed to rollback after {} error: {:#}",
                            id, operation, rollback_err
                        );
                        format!("rollback failed: {:#}", rollback_err)
                    }
                };
                return TweakResult::failure(format!("{:#} ({})", e, note));
            }

            debug!(
                "{} -> Set '{}' to {:?}.",
                id,
                modification.describe(),
                desired(modification)
            );
        }

        TweakResult::success(format!(
            "{} registry value(s) {}",
            self.modifications.len(),
            if backup_first { "set" } else { "restored" }
        ))
    }
}

impl TweakMethod for RegistryTweak {
    /// Checks if every modification currently holds its target value.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if the tweak is applied.
    /// - `Ok(false)` if any value differs or is missing.
    /// - `Err(anyhow::Error)` if an error occurs while reading the registry.
    fn is_applied(&self, id: &str) -> Result<bool> {
        for modification in &self.modifications {
            match self.read(modification)? {
                Some(current) if current == modification.target_value => {}
                current => {
                    debug!(
                        "{} -> '{}' is not applied. Expected {:?}, found {:?}.",
                        id,
                        modification.describe(),
                        modification.target_value,
                        current
                    );
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Applies the registry tweak by setting the specified registry values atomically.
    fn apply(&self, id: &str) -> Result<TweakResult> {
        if self.is_applied(id).unwrap_or(false) {
            return Ok(TweakResult::success("Already applied"));
        }
        Ok(self.transition(id, "apply", true, |m| Some(&m.target_value)))
    }

    /// Restores the default registry values, or deletes them if no defaults are provided.
    fn revert(&self, id: &str) -> Result<TweakResult> {
        Ok(self.transition(id, "revert", false, |m| m.default_value.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backup::backup_id, test_support::TestHarness};

    const PATH: &str = r"SOFTWARE\Policies\Microsoft\Windows\DataCollection";

    fn telemetry(h: &TestHarness) -> RegistryTweak {
        RegistryTweak::new(
            &h.ctx,
            vec![
                RegistryModification {
                    hive: RegistryHive::LocalMachine,
                    path: PATH,
                    key: "AllowTelemetry",
                    target_value: RegistryKeyValue::Dword(0),
                    default_value: Some(RegistryKeyValue::Dword(1)),
                },
                RegistryModification {
                    hive: RegistryHive::LocalMachine,
                    path: PATH,
                    key: "MaxTelemetryAllowed",
                    target_value: RegistryKeyValue::Dword(0),
                    default_value: None,
                },
            ],
        )
    }

    #[test]
    fn test_apply_then_revert() {
        let h = TestHarness::new();
        let tweak = telemetry(&h);
        assert!(!tweak.is_applied("t").unwrap());

        let result = tweak.apply("t").unwrap();
        assert!(result.success, "{}", result.message);
        assert!(tweak.is_applied("t").unwrap());
        assert!(h
            .ctx
            .backup
            .has_backup(RegistryHive::LocalMachine, PATH, "AllowTelemetry"));

        let result = tweak.revert("t").unwrap();
        assert!(result.success, "{}", result.message);
        assert!(!tweak.is_applied("t").unwrap());
        assert_eq!(
            h.store.get(RegistryHive::LocalMachine, PATH, "AllowTelemetry"),
            Some(RegistryKeyValue::Dword(1))
        );
        assert_eq!(
            h.store.get(RegistryHive::LocalMachine, PATH, "MaxTelemetryAllowed"),
            None
        );
    }

    #[test]
    fn test_apply_is_idempotent() {
        let h = TestHarness::new();
        let tweak = telemetry(&h);
        tweak.apply("t").unwrap();
        let writes = h.store.write_count();

        let again = tweak.apply("t").unwrap();
        assert!(again.success);
        assert_eq!(again.message, "Already applied");
        assert_eq!(h.store.write_count(), writes);
    }

    #[test]
    fn test_write_failure_rolls_back_earlier_values() {
        let h = TestHarness::new();
        h.store.set(
            RegistryHive::LocalMachine,
            PATH,
            "AllowTelemetry",
            RegistryKeyValue::Dword(3),
        );
        h.store.fail_writes_to("MaxTelemetryAllowed");
        let tweak = telemetry(&h);

        let result = tweak.apply("t").unwrap();
        assert!(!result.success);
        assert!(result.message.contains("MaxTelemetryAllowed"), "{}", result.message);
        assert_eq!(
            h.store.get(RegistryHive::LocalMachine, PATH, "AllowTelemetry"),
            Some(RegistryKeyValue::Dword(3))
        );
    }

    #[test]
    fn test_unverified_write_is_a_failure() {
        let h = TestHarness::new();
        h.store.ignore_writes_to("AllowTelemetry");
        let tweak = telemetry(&h);

        let result = tweak.apply("t").unwrap();
        assert!(!result.success);
        assert!(result.message.contains("Verification failed"), "{}", result.message);
        assert!(!tweak.is_applied("t").unwrap());
    }

    #[test]
    fn test_revert_when_never_applied() {
        let h = TestHarness::new();
        let tweak = telemetry(&h);
        assert!(tweak.revert("t").unwrap().success);
        // Revert doesn't capture backups of its own.
        let id = backup_id(RegistryHive::LocalMachine, PATH, "AllowTelemetry");
        assert!(h.ctx.backup.restore_value(&id).is_err());
    }
}
