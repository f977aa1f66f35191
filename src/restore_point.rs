// src/restore_point.rs

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::{
    logging::{log_status, LogArea, OpStatus},
    utils::{command::CommandRunner, powershell::execute_powershell_script},
};

/// A System Restore point as reported by `Get-ComputerRestorePoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePoint {
    pub sequence_number: u32,
    pub description: String,
    pub creation_time: NaiveDateTime,
}

// One point per line; the description goes last because it may contain the separator.
const LIST_SCRIPT: &str = "Get-ComputerRestorePoint | ForEach-Object { \
    '{0}|{1}|{2}' -f $_.SequenceNumber, $_.CreationTime, $_.Description }";

/// Parses one `sequence|creation time|description` line. The creation time is a WMI
/// datetime such as `20240131154500.000000-000`, read as local time.
fn parse_restore_point(line: &str) -> Result<RestorePoint> {
    let mut fields = line.splitn(3, '|');
    let (Some(sequence), Some(created), Some(description)) =
        (fields.next(), fields.next(), fields.next())
    else {
        anyhow::bail!("Malformed restore point line '{}'", line);
    };
    let stamp = created.get(..14).unwrap_or(created);
    Ok(RestorePoint {
        sequence_number: sequence
            .trim()
            .parse()
            .with_context(|| format!("Invalid sequence number '{}'", sequence))?,
        description: description.trim().to_string(),
        creation_time: NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S")
            .with_context(|| format!("Invalid creation time '{}'", created))?,
    })
}

/// Creates System Restore points through PowerShell.
pub struct RestorePointManager {
    runner: Arc<dyn CommandRunner>,
}

fn quote(description: &str) -> String {
    description.replace('\'', "''")
}

impl RestorePointManager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Creates a restore point, falling back to the WMI provider when
    /// `Checkpoint-Computer` is unavailable or refuses.
    ///
    /// Returns whether either attempt succeeded.
    pub fn create_restore_point(&self, description: &str) -> bool {
        let description = quote(description);
        let checkpoint = format!(
            "Enable-ComputerRestore -Drive 'C:\\'; \
            Checkpoint-Computer -Description '{}' -RestorePointType 'MODIFY_SETTINGS'",
            description
        );
        match execute_powershell_script(self.runner.as_ref(), &checkpoint) {
            Ok(_) => {
                log_status(LogArea::Backup, "restore-point", OpStatus::Success, &description);
                return true;
            }
            Err(e) => warn!("Checkpoint-Computer failed, trying WMI: {:#}", e),
        }

        // Event type 100 begins a system change, restore point type 12 is MODIFY_SETTINGS.
        let wmi = format!(
            "([wmiclass]'\\\\.\\root\\default:SystemRestore').CreateRestorePoint('{}', 12, 100) \
            | Select-Object -ExpandProperty ReturnValue",
            description
        );
        match execute_powershell_script(self.runner.as_ref(), &wmi) {
            Ok(output) if output == "0" || output.eq_ignore_ascii_case("true") => {
                log_status(
                    LogArea::Backup,
                    "restore-point",
                    OpStatus::Success,
                    &format!("{} (WMI)", description),
                );
                true
            }
            Ok(output) => {
                debug!("CreateRestorePoint returned {}", output);
                log_status(
                    LogArea::Backup,
                    "restore-point",
                    OpStatus::Failed,
                    &format!("WMI returned {}", output),
                );
                false
            }
            Err(e) => {
                log_status(LogArea::Backup, "restore-point", OpStatus::Failed, &format!("{:#}", e));
                false
            }
        }
    }

    /// Lists existing restore points, oldest first. Lines that cannot be parsed are
    /// logged and skipped.
    pub fn list_restore_points(&self) -> Result<Vec<RestorePoint>> {
        let output = execute_powershell_script(self.runner.as_ref(), LIST_SCRIPT)
            .context("Failed to list restore points")?;
        let mut points: Vec<RestorePoint> = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match parse_restore_point(line) {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!("Skipping restore point: {:#}", e);
                    None
                }
            })
            .collect();
        points.sort_by_key(|point| point.sequence_number);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_support::{ok, ScriptedRunner},
        utils::command::CommandOutput,
    };

    fn script(args: &[&str]) -> String {
        args.last().map(|s| s.to_string()).unwrap_or_default()
    }

    fn denied() -> CommandOutput {
        CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "Checkpoint-Computer : access denied".to_string(),
        }
    }

    #[test]
    fn test_checkpoint_succeeds() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let manager = RestorePointManager::new(runner.clone());
        assert!(manager.create_restore_point("Pre-Tweak Backup"));
        assert_eq!(runner.calls().len(), 1);
        assert!(script(
            &runner.calls()[0].1.iter().map(String::as_str).collect::<Vec<_>>()
        )
        .contains("Checkpoint-Computer -Description 'Pre-Tweak Backup'"));
    }

    #[test]
    fn test_wmi_fallback() {
        let runner = Arc::new(ScriptedRunner::new(|_, args| {
            if script(args).contains("Checkpoint-Computer") {
                denied()
            } else {
                ok("0\r\n")
            }
        }));
        let manager = RestorePointManager::new(runner.clone());
        assert!(manager.create_restore_point("it's a test"));
        assert_eq!(runner.calls().len(), 2);
        assert!(runner.calls()[1].1.iter().any(|a| a.contains("'it''s a test'")));
    }

    #[test]
    fn test_both_attempts_fail() {
        let runner = Arc::new(ScriptedRunner::new(|_, args| {
            if script(args).contains("Checkpoint-Computer") {
                denied()
            } else {
                ok("1")
            }
        }));
        let manager = RestorePointManager::new(runner);
        assert!(!manager.create_restore_point("x"));
    }

    #[test]
    fn test_list_restore_points() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| {
            ok("12|20240131154500.000000-000|Pre-Tweak Backup\r\n\
                garbage\r\n\
                7|20231105090102.000000-000|Installed Tool | v2\r\n")
        }));
        let manager = RestorePointManager::new(runner.clone());

        let points = manager.list_restore_points().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].sequence_number, 7);
        assert_eq!(points[0].description, "Installed Tool | v2");
        assert_eq!(
            points[1].creation_time,
            NaiveDateTime::parse_from_str("2024-01-31 15:45:00", "%Y-%m-%d %H:%M:%S").unwrap()
        );
        assert!(runner.calls()[0].1.iter().any(|a| a.contains("Get-ComputerRestorePoint")));
    }

    #[test]
    fn test_list_restore_points_empty_and_failing() {
        let manager = RestorePointManager::new(Arc::new(ScriptedRunner::succeeding()));
        assert!(manager.list_restore_points().unwrap().is_empty());

        let manager = RestorePointManager::new(Arc::new(ScriptedRunner::new(|_, _| denied())));
        assert!(manager.list_restore_points().is_err());
    }
}
