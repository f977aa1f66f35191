// src/utils/powershell.rs

use std::time::Duration;

use anyhow::Context;

use super::command::CommandRunner;
use crate::constants::POWERSHELL_TIMEOUT_SECS;

/// Executes a PowerShell script in a hidden, profile-less session.
///
/// # Returns
///
/// * `Ok(stdout)` with surrounding whitespace trimmed.
/// * `Err(anyhow::Error)` if PowerShell could not run, wrote to stderr, or exited non-zero.
pub fn execute_powershell_script(
    runner: &dyn CommandRunner,
    script: &str,
) -> anyhow::Result<String> {
    let output = runner
        .run(
            "powershell",
            &[
                "-NoProfile",
                "-ExecutionPolicy",
                "Bypass",
                "-WindowStyle",
                "Hidden",
                "-Command",
                script,
            ],
            Some(Duration::from_secs(POWERSHELL_TIMEOUT_SECS)),
        )
        .context("Failed to run PowerShell")?;

    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        tracing::error!("PowerShell script error: {}", stderr);
        anyhow::bail!("PowerShell script error: {}", stderr);
    }
    if !output.success() {
        anyhow::bail!("PowerShell exited with {:?}", output.exit_code);
    }

    Ok(output.stdout.trim().to_string())
}
