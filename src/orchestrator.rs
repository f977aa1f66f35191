// src/orchestrator.rs

use std::panic::{self, AssertUnwindSafe};

use anyhow::Error;
use chrono::Local;
use tracing::{error, info, warn};

use crate::{
    categories::CategoryRegistry,
    constants::{FULL_BACKUP_DESCRIPTION, FULL_BACKUP_KEYS, SERVICES_KEY_PATH, SERVICE_DEFAULTS},
    errors::RestoreError,
    logging::{log_status, LogArea, OpStatus},
    models::{RestoreResult, TweakResult, TweakSummary},
    power::{set_active_power_scheme, set_hibernation, BALANCED_SCHEME_GUID},
    restore_point::RestorePointManager,
    tweaks::{SystemContext, Tweak},
    utils::{registry::RegistryHive, services::StartupType},
};

/// Lifecycle of one restore run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Idle,
    Running,
    Complete,
}

enum RevertOutcome {
    Reverted,
    Skipped,
    Failed,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs `f`, turning both errors and panics into an error message.
fn guarded<T>(f: impl FnOnce() -> Result<T, Error>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload))),
    }
}

/// Puts the machine back to its pre-tweak state: reverts every applied tweak, restores
/// system defaults, then replays every captured backup.
pub struct EmergencyRestoreManager<'a> {
    registry: &'a CategoryRegistry,
    ctx: &'a SystemContext,
    restore_points: RestorePointManager,
    state: RestoreState,
}

impl<'a> EmergencyRestoreManager<'a> {
    pub fn new(registry: &'a CategoryRegistry, ctx: &'a SystemContext) -> Self {
        Self {
            registry,
            ctx,
            restore_points: RestorePointManager::new(ctx.runner.clone()),
            state: RestoreState::Idle,
        }
    }

    pub fn state(&self) -> RestoreState {
        self.state
    }

    /// Creates a System Restore point and exports the key subtrees tweaks touch.
    ///
    /// Failures are logged and never stop the restore. Returns whether everything
    /// was backed up.
    pub fn create_full_backup(&self) -> bool {
        info!("Creating full backup before restore.");
        let description = format!(
            "{} {}",
            FULL_BACKUP_DESCRIPTION,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let mut complete = self.restore_points.create_restore_point(&description);
        if !complete {
            warn!("Could not create a restore point, continuing with registry exports.");
        }

        for (hive, path) in FULL_BACKUP_KEYS {
            match self.ctx.backup.export_key(*hive, path) {
                Ok(file) => info!("Exported {}\\{} to {}", hive, path, file.display()),
                Err(e) => {
                    warn!("Failed to export {}\\{}: {}", hive, path, e);
                    complete = false;
                }
            }
        }
        complete
    }

    fn revert_tweak(&self, tweak: &Tweak) -> RevertOutcome {
        match guarded(|| tweak.is_applied()) {
            Ok(false) => {
                log_status(tweak.area, tweak.id, OpStatus::Skipped, "Not applied");
                return RevertOutcome::Skipped;
            }
            Ok(true) => {}
            Err(e) => {
                error!("{} -> Failed to check state: {}", tweak.id, e);
                return RevertOutcome::Failed;
            }
        }

        match guarded(|| tweak.revert()) {
            Ok(TweakResult { success: true, .. }) => RevertOutcome::Reverted,
            Ok(TweakResult { message, .. }) => {
                error!("{} -> Revert failed: {}", tweak.id, message);
                RevertOutcome::Failed
            }
            Err(e) => {
                error!("{} -> Revert failed: {}", tweak.id, e);
                RevertOutcome::Failed
            }
        }
    }

    /// Hibernation on, the Balanced plan, and stock startup types for the known services.
    ///
    /// A service whose `Start` value has a captured backup is left to the backup replay.
    /// Returns the number of steps that failed.
    fn restore_system_defaults(&self) -> usize {
        let runner = self.ctx.runner.as_ref();
        let mut failed = 0;

        if let Err(e) = set_hibernation(runner, true) {
            log_status(LogArea::Restore, "hibernation", OpStatus::Failed, &format!("{:#}", e));
            failed += 1;
        }
        if let Err(e) = set_active_power_scheme(runner, BALANCED_SCHEME_GUID) {
            log_status(LogArea::Restore, "power-plan", OpStatus::Failed, &format!("{:#}", e));
            failed += 1;
        }

        for (service, startup) in SERVICE_DEFAULTS {
            if let Err(reason) = self.restore_service_default(service, *startup) {
                log_status(LogArea::Restore, service, OpStatus::Failed, &reason);
                failed += 1;
            }
        }
        failed
    }

    fn restore_service_default(&self, service: &str, startup: StartupType) -> Result<(), String> {
        let key = format!("{}\\{}", SERVICES_KEY_PATH, service);
        if self
            .ctx
            .backup
            .has_backup(RegistryHive::LocalMachine, &key, "Start")
        {
            log_status(
                LogArea::Restore,
                service,
                OpStatus::Skipped,
                "Startup type restored from backup instead",
            );
            return Ok(());
        }

        let services = self.ctx.services.as_ref();
        match services.exists(service) {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => return Err(e.to_string()),
        }
        services
            .set_startup_type(service, startup)
            .map_err(|e| e.to_string())?;
        if startup.is_automatic() {
            services.start(service).map_err(|e| e.to_string())?;
        }
        log_status(
            LogArea::Restore,
            service,
            OpStatus::Success,
            &format!("Startup type set to {}", startup),
        );
        Ok(())
    }

    /// Reverts every applied tweak, restores system defaults and replays all backups.
    ///
    /// A single tweak failing (or panicking) is counted and never stops the pass.
    /// The manager runs once; a second call is refused.
    pub fn revert_all_tweaks(&mut self) -> Result<RestoreResult, RestoreError> {
        if self.state != RestoreState::Idle {
            return Err(RestoreError::AlreadyRun(
                format!("{:?}", self.state).to_lowercase(),
            ));
        }
        self.state = RestoreState::Running;
        log_status(LogArea::Restore, "restore", OpStatus::InProgress, "Reverting all tweaks");

        let mut result = RestoreResult::default();
        for category in self.registry.categories() {
            for tweak in category.tweaks() {
                result.total_tweaks += 1;
                match self.revert_tweak(tweak) {
                    RevertOutcome::Reverted => result.reverted_tweaks += 1,
                    RevertOutcome::Skipped => result.skipped_tweaks += 1,
                    RevertOutcome::Failed => {
                        result.failed_tweaks += 1;
                        result.failed_tweak_names.push(tweak.name.to_string());
                    }
                }
            }
        }

        result.failed_default_steps = self.restore_system_defaults();
        result.registry_values_restored = self.ctx.backup.restore_all();

        self.state = RestoreState::Complete;
        let status = if result.full_success() {
            OpStatus::Success
        } else {
            OpStatus::Warning
        };
        log_status(
            LogArea::Restore,
            "restore",
            status,
            &format!(
                "{} reverted, {} failed, {} value(s) restored",
                result.reverted_tweaks, result.failed_tweaks, result.registry_values_restored
            ),
        );
        Ok(result)
    }

    /// Optional full backup followed by the full revert pass.
    pub fn run(&mut self, with_backup: bool) -> Result<RestoreResult, RestoreError> {
        if with_backup && self.state == RestoreState::Idle {
            self.create_full_backup();
        }
        self.revert_all_tweaks()
    }

    /// Lists which tweaks are currently applied. Tweaks whose state can't be read count
    /// as not applied.
    pub fn applied_tweaks_summary(&self) -> TweakSummary {
        let mut summary = TweakSummary::default();
        for category in self.registry.categories() {
            for tweak in category.tweaks() {
                summary.total_tweaks += 1;
                if let Ok(true) = guarded(|| tweak.is_applied()) {
                    summary.applied_tweaks += 1;
                    summary
                        .applied
                        .push((category.name.to_string(), tweak.name.to_string()));
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use super::*;
    use crate::{
        categories::{Accent, TweakCategory},
        models::RiskLevel,
        test_support::{FakeService, FakeServices, MemoryStore, ScriptedRunner, TestHarness},
        tweaks::TweakMethod,
        utils::registry::RegistryKeyValue,
    };

    #[derive(Clone, Copy)]
    enum Behaviour {
        Reverts,
        ReportsFailure,
        Errors,
        Panics,
    }

    struct Stub {
        applied: Arc<AtomicBool>,
        behaviour: Behaviour,
    }

    impl TweakMethod for Stub {
        fn is_applied(&self, _id: &str) -> anyhow::Result<bool> {
            Ok(self.applied.load(Ordering::SeqCst))
        }

        fn apply(&self, _id: &str) -> anyhow::Result<TweakResult> {
            self.applied.store(true, Ordering::SeqCst);
            Ok(TweakResult::success("applied"))
        }

        fn revert(&self, _id: &str) -> anyhow::Result<TweakResult> {
            match self.behaviour {
                Behaviour::Reverts => {
                    self.applied.store(false, Ordering::SeqCst);
                    Ok(TweakResult::success("reverted"))
                }
                Behaviour::ReportsFailure => Ok(TweakResult::failure("access denied")),
                Behaviour::Errors => anyhow::bail!("registry unavailable"),
                Behaviour::Panics => panic!("stub revert panicked"),
            }
        }
    }

    fn stub(name: &'static str, applied: bool, behaviour: Behaviour) -> Tweak {
        Tweak::new(
            name,
            name,
            "",
            RiskLevel::Safe,
            LogArea::Performance,
            Stub {
                applied: Arc::new(AtomicBool::new(applied)),
                behaviour,
            },
        )
    }

    fn stub_registry() -> CategoryRegistry {
        let mut registry = CategoryRegistry::new();
        registry.register(
            TweakCategory::new("performance", "Performance", "", Accent::Green).with_tweaks([
                stub("good", true, Behaviour::Reverts),
                stub("refused", true, Behaviour::ReportsFailure),
                stub("untouched", false, Behaviour::Reverts),
            ]),
        );
        registry.register(
            TweakCategory::new("privacy", "Privacy", "", Accent::Magenta).with_tweaks([
                stub("broken", true, Behaviour::Errors),
                stub("exploding", true, Behaviour::Panics),
                stub("also-good", true, Behaviour::Reverts),
            ]),
        );
        registry
    }

    #[test]
    fn test_partial_failures_are_counted() {
        let h = TestHarness::new();
        let registry = stub_registry();
        let mut manager = EmergencyRestoreManager::new(&registry, &h.ctx);

        let result = manager.revert_all_tweaks().unwrap();
        assert_eq!(result.total_tweaks, 6);
        assert_eq!(result.reverted_tweaks, 2);
        assert_eq!(result.skipped_tweaks, 1);
        assert_eq!(result.failed_tweaks, 3);
        assert_eq!(
            result.failed_tweak_names,
            vec!["refused", "broken", "exploding"]
        );
        assert!(!result.full_success());
        assert_eq!(manager.state(), RestoreState::Complete);
    }

    #[test]
    fn test_second_run_is_refused() {
        let h = TestHarness::new();
        let registry = CategoryRegistry::new();
        let mut manager = EmergencyRestoreManager::new(&registry, &h.ctx);
        let result = manager.revert_all_tweaks().unwrap();
        assert!(result.full_success());
        assert!(matches!(
            manager.revert_all_tweaks(),
            Err(RestoreError::AlreadyRun(_))
        ));
    }

    #[test]
    fn test_backup_replay_takes_precedence_over_service_defaults() {
        let store = MemoryStore::new();
        let spooler_key = format!("{}\\Spooler", SERVICES_KEY_PATH);
        store.set(
            RegistryHive::LocalMachine,
            &spooler_key,
            "Start",
            RegistryKeyValue::Dword(3),
        );
        let services = FakeServices::new()
            .with_service("Spooler", FakeService::stopped(StartupType::Disabled))
            .with_service("SysMain", FakeService::stopped(StartupType::Disabled));
        let h = TestHarness::with(store, services, ScriptedRunner::succeeding());
        h.ctx
            .backup
            .backup_value(RegistryHive::LocalMachine, &spooler_key, "Start")
            .unwrap();
        h.store.set(
            RegistryHive::LocalMachine,
            &spooler_key,
            "Start",
            RegistryKeyValue::Dword(4),
        );

        let registry = CategoryRegistry::new();
        let mut manager = EmergencyRestoreManager::new(&registry, &h.ctx);
        let result = manager.revert_all_tweaks().unwrap();

        assert_eq!(result.registry_values_restored, 1);
        assert_eq!(result.failed_default_steps, 0);
        assert_eq!(
            h.store.get(RegistryHive::LocalMachine, &spooler_key, "Start"),
            Some(RegistryKeyValue::Dword(3))
        );
        let calls = h.services.calls();
        assert!(!calls.contains(&"config Spooler".to_string()));
        assert!(calls.contains(&"config SysMain".to_string()));
        assert!(calls.contains(&"start SysMain".to_string()));
        assert!(h.runner.ran("powercfg.exe", BALANCED_SCHEME_GUID));
        assert!(h.runner.ran("powercfg.exe", "on"));
    }

    #[test]
    fn test_failing_default_steps_are_counted() {
        let mut locked = FakeService::stopped(StartupType::Disabled);
        locked.config_fails = true;
        let h = TestHarness::with(
            MemoryStore::new(),
            FakeServices::new().with_service("WerSvc", locked),
            ScriptedRunner::new(|_, _| crate::test_support::failed("")),
        );
        let registry = CategoryRegistry::new();
        let mut manager = EmergencyRestoreManager::new(&registry, &h.ctx);
        let result = manager.revert_all_tweaks().unwrap();
        // hibernation, power plan, WerSvc
        assert_eq!(result.failed_default_steps, 3);
        assert!(result.full_success());
    }

    #[test]
    fn test_full_backup_exports_keys() {
        let h = TestHarness::new();
        let registry = CategoryRegistry::new();
        let manager = EmergencyRestoreManager::new(&registry, &h.ctx);
        // reg.exe succeeds without writing a file, so every export is reported missing.
        assert!(!manager.create_full_backup());
        let exports = h
            .runner
            .calls()
            .iter()
            .filter(|(program, args)| program == "reg.exe" && args[0] == "export")
            .count();
        assert_eq!(exports, FULL_BACKUP_KEYS.len());
    }

    #[test]
    fn test_applied_summary() {
        let h = TestHarness::new();
        let registry = stub_registry();
        let manager = EmergencyRestoreManager::new(&registry, &h.ctx);
        let summary = manager.applied_tweaks_summary();
        assert_eq!(summary.total_tweaks, 6);
        assert_eq!(summary.applied_tweaks, 5);
        assert_eq!(
            summary.applied[0],
            ("Performance".to_string(), "good".to_string())
        );
    }
}
