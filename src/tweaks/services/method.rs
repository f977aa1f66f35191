// src/tweaks/services/method.rs

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use strum_macros::Display;

use crate::{
    backup::BackupManager,
    constants::SERVICES_KEY_PATH,
    errors::ServiceError,
    logging::{log_status, LogArea, OpStatus},
    models::TweakResult,
    tweaks::{SystemContext, TweakMethod},
    utils::{
        registry::RegistryHive,
        services::{ServiceControl, ServiceState, StartupType},
    },
};

/// Combined run state and startup type of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ServicePhase {
    Unknown,
    Running,
    Stopped,
    /// Stopped with startup type Disabled.
    Disabled,
}

enum DisableOutcome {
    Disabled,
    NotFound,
    Failed,
}

/// Stops and disables a fixed set of services. Reverting restores a startup type but
/// never starts anything.
pub struct ServiceTweak {
    services: Arc<dyn ServiceControl>,
    backup: Arc<BackupManager>,
    service_names: Vec<&'static str>,
    default_start_type: StartupType,
    stop_timeout: Duration,
}

impl ServiceTweak {
    pub fn new(ctx: &SystemContext, service_names: &[&'static str]) -> Self {
        Self {
            services: ctx.services.clone(),
            backup: ctx.backup.clone(),
            service_names: service_names.to_vec(),
            default_start_type: StartupType::Manual,
            stop_timeout: ctx.settings.service_stop_timeout,
        }
    }

    /// Startup type written back on revert.
    pub fn with_default_start_type(mut self, start_type: StartupType) -> Self {
        self.default_start_type = start_type;
        self
    }

    pub fn service_names(&self) -> &[&'static str] {
        &self.service_names
    }

    pub fn phase(&self, name: &str) -> ServicePhase {
        let state = match self.services.status(name) {
            Ok(state) => state,
            Err(_) => return ServicePhase::Unknown,
        };
        match state {
            ServiceState::Stopped => match self.services.startup_type(name) {
                Ok(StartupType::Disabled) => ServicePhase::Disabled,
                _ => ServicePhase::Stopped,
            },
            ServiceState::Running
            | ServiceState::StartPending
            | ServiceState::StopPending
            | ServiceState::Paused => ServicePhase::Running,
            ServiceState::Unknown => ServicePhase::Unknown,
        }
    }

    fn present_services(&self) -> Vec<&'static str> {
        self.service_names
            .iter()
            .copied()
            .filter(|name| matches!(self.services.exists(name), Ok(true)))
            .collect()
    }

    /// Captures the registry values that hold the service's startup configuration.
    fn backup_start_values(&self, id: &str, name: &str) {
        let path = format!("{}\\{}", SERVICES_KEY_PATH, name);
        for value in ["Start", "DelayedAutostart"] {
            if let Err(e) = self
                .backup
                .backup_value(RegistryHive::LocalMachine, &path, value)
            {
                tracing::warn!("{} -> Could not back up {}\\{}: {}", id, path, value, e);
            }
        }
    }

    /// Stops `name`, falling back to a forceful stop after the timeout.
    fn stop(&self, name: &str) -> Result<(), ServiceError> {
        match self.services.stop(name, self.stop_timeout) {
            Ok(true) => return Ok(()),
            Ok(false) => log_status(
                LogArea::Services,
                name,
                OpStatus::Warning,
                &format!(
                    "Still running after {}s, forcing stop",
                    self.stop_timeout.as_secs()
                ),
            ),
            Err(e) => log_status(
                LogArea::Services,
                name,
                OpStatus::Warning,
                &format!("Stop request failed ({}), forcing stop", e),
            ),
        }
        self.services.force_stop(name)
    }

    fn disable_one(&self, id: &str, name: &str) -> DisableOutcome {
        match self.services.exists(name) {
            Ok(true) => {}
            Ok(false) => {
                log_status(LogArea::Services, name, OpStatus::NotFound, "Service not present");
                return DisableOutcome::NotFound;
            }
            Err(e) => {
                log_status(LogArea::Services, name, OpStatus::Failed, &e.to_string());
                return DisableOutcome::Failed;
            }
        }

        let phase = self.phase(name);
        if phase == ServicePhase::Disabled {
            log_status(LogArea::Services, name, OpStatus::AlreadyApplied, "Already disabled");
            return DisableOutcome::Disabled;
        }

        self.backup_start_values(id, name);

        if phase != ServicePhase::Stopped {
            if let Err(e) = self.stop(name) {
                log_status(LogArea::Services, name, OpStatus::Failed, &e.to_string());
                return DisableOutcome::Failed;
            }
        }

        match self.services.set_startup_type(name, StartupType::Disabled) {
            Ok(()) => {
                log_status(LogArea::Services, name, OpStatus::Success, "Stopped and disabled");
                DisableOutcome::Disabled
            }
            Err(e) => {
                log_status(LogArea::Services, name, OpStatus::Failed, &e.to_string());
                DisableOutcome::Failed
            }
        }
    }
}

impl TweakMethod for ServiceTweak {
    /// Applied when at least one of the services is present and every present service
    /// is stopped and disabled.
    fn is_applied(&self, id: &str) -> Result<bool> {
        let present = self.present_services();
        let applied = !present.is_empty()
            && present
                .iter()
                .all(|name| self.phase(name) == ServicePhase::Disabled);
        tracing::debug!(
            "{} -> {} of {} service(s) present, applied: {}",
            id,
            present.len(),
            self.service_names.len(),
            applied
        );
        Ok(applied)
    }

    fn apply(&self, id: &str) -> Result<TweakResult> {
        if self.is_applied(id)? {
            return Ok(TweakResult::success("Already applied"));
        }

        let (mut disabled, mut not_found, mut failed) = (0, 0, 0);
        for name in &self.service_names {
            match self.disable_one(id, name) {
                DisableOutcome::Disabled => disabled += 1,
                DisableOutcome::NotFound => not_found += 1,
                DisableOutcome::Failed => failed += 1,
            }
        }

        Ok(if disabled > 0 {
            let mut message = format!("{} service(s) disabled", disabled);
            if not_found > 0 {
                message.push_str(&format!(", {} not found", not_found));
            }
            if failed > 0 {
                message.push_str(&format!(", {} failed", failed));
            }
            TweakResult::success(message)
        } else if not_found == self.service_names.len() {
            TweakResult::failure("No applicable services found on this system")
        } else {
            TweakResult::failure(format!("Failed to disable {} service(s)", failed))
        })
    }

    fn revert(&self, _id: &str) -> Result<TweakResult> {
        let present = self.present_services();
        if present.is_empty() {
            return Ok(TweakResult::success("No services present, nothing to revert"));
        }

        let mut enabled = 0;
        for name in &present {
            match self
                .services
                .set_startup_type(name, self.default_start_type)
            {
                Ok(()) => {
                    enabled += 1;
                    log_status(
                        LogArea::Services,
                        name,
                        OpStatus::Reverted,
                        &format!("Startup type set to {}", self.default_start_type),
                    );
                }
                Err(e) => log_status(LogArea::Services, name, OpStatus::Failed, &e.to_string()),
            }
        }

        Ok(if enabled > 0 {
            TweakResult::success(format!("{} service(s) re-enabled", enabled))
        } else {
            TweakResult::failure("Could not re-enable services")
        })
    }
}
