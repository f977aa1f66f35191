// src/tweaks/definitions/mod.rs

//! Tweaks driven by external tools rather than direct registry writes.

pub mod disable_hibernation;
pub mod ultimate_performance_plan;

use disable_hibernation::DisableHibernation;
use ultimate_performance_plan::UltimatePerformancePlan;

use super::{SystemContext, Tweak};
use crate::{logging::LogArea, models::RiskLevel};

pub fn ultimate_performance_plan(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "ultimate-performance-plan",
        "Enable Ultimate Performance Plan",
        "Activates the Ultimate Performance power plan, which disables core parking, disk \
        sleep and processor throttling. Increases power draw.",
        RiskLevel::Moderate,
        LogArea::Performance,
        UltimatePerformancePlan::new(ctx),
    )
}

pub fn disable_hibernation(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "disable-hibernation",
        "Disable Hibernation",
        "Turns off hibernation and Fast Startup, freeing the disk space used by hiberfil.sys.",
        RiskLevel::Safe,
        LogArea::Performance,
        DisableHibernation::new(ctx),
    )
    .requiring_reboot()
}
