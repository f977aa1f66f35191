// src/tweaks/definitions/ultimate_performance_plan.rs

use std::sync::Arc;

use anyhow::Result;

use crate::{
    models::TweakResult,
    power::{
        duplicate_power_scheme, get_active_power_scheme, get_all_power_schemes,
        set_active_power_scheme, PowerScheme, BALANCED_SCHEME_GUID,
        ULTIMATE_PERFORMANCE_SCHEME_GUID, ULTIMATE_PERFORMANCE_SCHEME_NAME,
    },
    tweaks::{SystemContext, TweakMethod},
    utils::command::CommandRunner,
};

fn is_ultimate(scheme: &PowerScheme) -> bool {
    scheme.guid == ULTIMATE_PERFORMANCE_SCHEME_GUID
        || scheme.name.contains(ULTIMATE_PERFORMANCE_SCHEME_NAME)
}

pub struct UltimatePerformancePlan {
    runner: Arc<dyn CommandRunner>,
}

impl UltimatePerformancePlan {
    pub fn new(ctx: &SystemContext) -> Self {
        Self {
            runner: ctx.runner.clone(),
        }
    }

    /// Finds an installed Ultimate Performance scheme, unhiding it from the built-in
    /// template when none exists yet.
    fn find_or_create(&self, id: &str) -> Result<Option<PowerScheme>> {
        let schemes = get_all_power_schemes(self.runner.as_ref())?;
        if let Some(scheme) = schemes.into_iter().find(is_ultimate) {
            return Ok(Some(scheme));
        }

        tracing::debug!("{} -> Ultimate Performance plan not installed, duplicating.", id);
        duplicate_power_scheme(self.runner.as_ref(), ULTIMATE_PERFORMANCE_SCHEME_GUID)?;
        Ok(get_all_power_schemes(self.runner.as_ref())?
            .into_iter()
            .find(|scheme| scheme.name.contains(ULTIMATE_PERFORMANCE_SCHEME_NAME)))
    }
}

impl TweakMethod for UltimatePerformancePlan {
    fn is_applied(&self, id: &str) -> Result<bool> {
        tracing::debug!("{} -> Checking active power scheme", id);
        Ok(is_ultimate(&get_active_power_scheme(self.runner.as_ref())?))
    }

    fn apply(&self, id: &str) -> Result<TweakResult> {
        if self.is_applied(id)? {
            return Ok(TweakResult::success("Already applied"));
        }

        let scheme = match self.find_or_create(id)? {
            Some(scheme) => scheme,
            None => {
                return Ok(TweakResult::failure(
                    "Failed to create the Ultimate Performance power plan",
                ))
            }
        };
        set_active_power_scheme(self.runner.as_ref(), &scheme.guid)?;

        if !self.is_applied(id)? {
            return Ok(TweakResult::failure(
                "Ultimate Performance plan did not become active",
            ));
        }
        tracing::debug!("{} -> Applied Ultimate Performance power plan", id);
        Ok(TweakResult::success(format!(
            "Ultimate Performance plan active ({})",
            scheme.guid
        )))
    }

    fn revert(&self, id: &str) -> Result<TweakResult> {
        set_active_power_scheme(self.runner.as_ref(), BALANCED_SCHEME_GUID)?;
        let active = get_active_power_scheme(self.runner.as_ref())?;
        tracing::debug!("{} -> Active scheme after revert: {}", id, active.name);
        Ok(if active.guid == BALANCED_SCHEME_GUID {
            TweakResult::success("Balanced power plan restored")
        } else {
            TweakResult::failure(format!(
                "Balanced plan did not become active, {} still is",
                active.name
            ))
        })
    }
}
