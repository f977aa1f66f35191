// src/models.rs

use std::fmt;

use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// How much a tweak can disturb the system if something goes wrong.
///
/// Ordered from least to most dangerous, so `RiskLevel::Safe < RiskLevel::Experimental`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum RiskLevel {
    Safe,
    Moderate,
    Advanced,
    Experimental,
}

impl RiskLevel {
    /// Short badge shown next to a tweak in listings.
    pub fn badge(self) -> &'static str {
        match self {
            RiskLevel::Safe => "[SAFE]",
            RiskLevel::Moderate => "[MODERATE]",
            RiskLevel::Advanced => "[ADVANCED]",
            RiskLevel::Experimental => "[EXPERIMENTAL]",
        }
    }
}

/// Outcome of an `apply` or `revert` call.
///
/// Expected failures (a service that is missing, a value that could not be written)
/// are reported here with `success == false`. Unexpected faults surface as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweakResult {
    pub success: bool,
    pub message: String,
}

impl TweakResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for TweakResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.success { "OK" } else { "FAILED" };
        write!(f, "[{}] {}", label, self.message)
    }
}

/// Aggregated outcome of an emergency restore pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreResult {
    pub total_tweaks: usize,
    pub reverted_tweaks: usize,
    pub failed_tweaks: usize,
    /// Tweaks that were not applied and therefore left untouched.
    pub skipped_tweaks: usize,
    pub failed_tweak_names: Vec<String>,
    pub registry_values_restored: usize,
    /// System default steps (services, power plan, hibernation) that could not be applied.
    pub failed_default_steps: usize,
}

impl RestoreResult {
    pub fn full_success(&self) -> bool {
        self.failed_tweaks == 0
    }
}

impl fmt::Display for RestoreResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tweaks checked:           {}", self.total_tweaks)?;
        writeln!(f, "Tweaks reverted:          {}", self.reverted_tweaks)?;
        writeln!(f, "Tweaks not applied:       {}", self.skipped_tweaks)?;
        writeln!(f, "Tweaks failed:            {}", self.failed_tweaks)?;
        writeln!(f, "Registry values restored: {}", self.registry_values_restored)?;
        if self.failed_default_steps > 0 {
            writeln!(f, "Default steps failed:     {}", self.failed_default_steps)?;
        }
        for name in &self.failed_tweak_names {
            writeln!(f, "  - {}", name)?;
        }
        Ok(())
    }
}

/// Which tweaks are currently applied across all categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TweakSummary {
    pub total_tweaks: usize,
    pub applied_tweaks: usize,
    /// `(category name, tweak name)` for every applied tweak, in registration order.
    pub applied: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_levels_are_ordered() {
        assert!(RiskLevel::Safe < RiskLevel::Moderate);
        assert!(RiskLevel::Moderate < RiskLevel::Advanced);
        assert!(RiskLevel::Advanced < RiskLevel::Experimental);
        assert_eq!("moderate".parse::<RiskLevel>().ok(), Some(RiskLevel::Moderate));
    }

    #[test]
    fn test_full_success_only_counts_failed_tweaks() {
        let mut result = RestoreResult {
            total_tweaks: 4,
            reverted_tweaks: 2,
            skipped_tweaks: 2,
            failed_default_steps: 1,
            ..Default::default()
        };
        assert!(result.full_success());

        result.failed_tweaks = 1;
        result.failed_tweak_names.push("Disable Telemetry".to_string());
        assert!(!result.full_success());
    }
}
