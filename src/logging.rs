// src/logging.rs

//! Structured status events shared by every tweak and by the restore pipeline.
//!
//! Components only emit `tracing` events; the binary decides where they go.

use strum_macros::{AsRefStr, Display, EnumIter};
use tracing::Level;

/// Part of the system an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogArea {
    Network,
    Performance,
    Privacy,
    Security,
    Services,
    Ui,
    Backup,
    Restore,
}

/// Status attached to an operation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OpStatus {
    Success,
    Failed,
    InProgress,
    Reverted,
    Skipped,
    Warning,
    AlreadyApplied,
    RequiresReboot,
    NotFound,
}

impl OpStatus {
    pub fn level(self) -> Level {
        match self {
            OpStatus::Failed => Level::ERROR,
            OpStatus::Warning | OpStatus::NotFound => Level::WARN,
            OpStatus::InProgress | OpStatus::Skipped => Level::DEBUG,
            OpStatus::Success
            | OpStatus::Reverted
            | OpStatus::AlreadyApplied
            | OpStatus::RequiresReboot => Level::INFO,
        }
    }
}

/// Emits one status event for `target` (a tweak id, service name or registry path).
pub fn log_status(area: LogArea, target: &str, status: OpStatus, detail: &str) {
    let area = area.as_ref();
    let status_label = status.as_ref();
    let level = status.level();
    if level == Level::ERROR {
        tracing::error!(area, status = status_label, "{} -> {}", target, detail);
    } else if level == Level::WARN {
        tracing::warn!(area, status = status_label, "{} -> {}", target, detail);
    } else if level == Level::INFO {
        tracing::info!(area, status = status_label, "{} -> {}", target, detail);
    } else {
        tracing::debug!(area, status = status_label, "{} -> {}", target, detail);
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_status_labels() {
        let labels: Vec<String> = OpStatus::iter().map(|s| s.to_string()).collect();
        assert!(labels.contains(&"ALREADY_APPLIED".to_string()));
        assert!(labels.contains(&"NOT_FOUND".to_string()));
        assert_eq!(LogArea::Ui.as_ref(), "UI");
    }

    #[test]
    fn test_failures_are_errors() {
        assert_eq!(OpStatus::Failed.level(), Level::ERROR);
        assert_eq!(OpStatus::NotFound.level(), Level::WARN);
        assert_eq!(OpStatus::Success.level(), Level::INFO);
    }
}
