// src/tweaks/mod.rs

pub mod definitions;
pub mod method;
pub mod network;
pub mod registry;
pub mod services;

use std::{fmt, sync::Arc};

use anyhow::Error;
pub use method::TweakMethod;

use crate::{
    backup::BackupManager,
    config::Settings,
    errors::BackupError,
    logging::{log_status, LogArea, OpStatus},
    models::{RiskLevel, TweakResult},
    tweaks::network::guard::{ConnectivityGuard, ConnectivityProbe},
    utils::{command::CommandRunner, registry::ConfigurationStore, services::ServiceControl},
};

/// OS capabilities and shared services handed to every tweak.
#[derive(Clone)]
pub struct SystemContext {
    pub settings: Settings,
    pub store: Arc<dyn ConfigurationStore>,
    pub services: Arc<dyn ServiceControl>,
    pub runner: Arc<dyn CommandRunner>,
    pub backup: Arc<BackupManager>,
    pub guard: Arc<ConnectivityGuard>,
}

impl SystemContext {
    pub fn new(
        settings: Settings,
        store: Arc<dyn ConfigurationStore>,
        services: Arc<dyn ServiceControl>,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Result<Self, BackupError> {
        let backup = Arc::new(BackupManager::new(
            store.clone(),
            runner.clone(),
            settings.backup_dir.clone(),
        )?);
        let guard = Arc::new(ConnectivityGuard::new(
            probe,
            settings.probe_host.clone(),
            settings.probe_timeout,
        ));
        Ok(Self {
            settings,
            store,
            services,
            runner,
            backup,
            guard,
        })
    }

    /// Context backed by the live registry, the Service Control Manager and real processes.
    #[cfg(windows)]
    pub fn system(settings: Settings) -> Result<Self, BackupError> {
        use crate::{
            tweaks::network::guard::PingProbe,
            utils::{
                command::SystemCommandRunner, registry::WindowsRegistry, services::WindowsServices,
            },
        };

        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        Self::new(
            settings,
            Arc::new(WindowsRegistry),
            Arc::new(WindowsServices::new(runner.clone())),
            runner.clone(),
            Arc::new(PingProbe::new(runner)),
        )
    }
}

/// Represents a single tweak that can be applied to the system.
pub struct Tweak {
    /// Stable identifier, unique within its category.
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub risk_level: RiskLevel,
    pub area: LogArea,
    /// Whether the tweak requires restarting the system to take effect.
    pub requires_reboot: bool,
    method: Box<dyn TweakMethod>,
}

impl fmt::Debug for Tweak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tweak")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("risk_level", &self.risk_level)
            .field("requires_reboot", &self.requires_reboot)
            .finish_non_exhaustive()
    }
}

impl Tweak {
    pub fn new(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        risk_level: RiskLevel,
        area: LogArea,
        method: impl TweakMethod + 'static,
    ) -> Self {
        Self {
            id,
            name,
            description,
            risk_level,
            area,
            requires_reboot: false,
            method: Box::new(method),
        }
    }

    pub fn requiring_reboot(mut self) -> Self {
        self.requires_reboot = true;
        self
    }

    pub fn is_applied(&self) -> Result<bool, Error> {
        self.method.is_applied(self.id)
    }

    pub fn apply(&self) -> Result<TweakResult, Error> {
        log_status(self.area, self.id, OpStatus::InProgress, "Applying");
        let result = self.method.apply(self.id)?;
        self.log_result(&result, OpStatus::Success);
        if result.success && self.requires_reboot {
            log_status(
                self.area,
                self.id,
                OpStatus::RequiresReboot,
                "Restart Windows for this change to take effect",
            );
        }
        Ok(result)
    }

    pub fn revert(&self) -> Result<TweakResult, Error> {
        log_status(self.area, self.id, OpStatus::InProgress, "Reverting");
        let result = self.method.revert(self.id)?;
        self.log_result(&result, OpStatus::Reverted);
        Ok(result)
    }

    fn log_result(&self, result: &TweakResult, on_success: OpStatus) {
        let status = if result.success {
            on_success
        } else {
            OpStatus::Failed
        };
        log_status(self.area, self.id, status, &result.message);
    }
}
