// src/power.rs

use std::time::Duration;

use anyhow::{Context, Result};

use crate::{constants::POWERCFG_TIMEOUT_SECS, utils::command::CommandRunner};

pub const BALANCED_SCHEME_GUID: &str = "381b4222-f694-41f0-9685-ff5bb260df2e";
pub const ULTIMATE_PERFORMANCE_SCHEME_GUID: &str = "e9a42b02-d5df-448d-aa00-03f14749eb61";
pub const ULTIMATE_PERFORMANCE_SCHEME_NAME: &str = "Ultimate Performance";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerScheme {
    pub guid: String,
    pub name: String,
    pub active: bool,
}

fn is_guid(token: &str) -> bool {
    let groups: Vec<&str> = token.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Parses one scheme line of `powercfg /list` or `/getactivescheme` output, e.g.
/// `Power Scheme GUID: 381b4222-...-ff5bb260df2e  (Balanced) *`.
///
/// Only the GUID, the parenthesised name and the trailing `*` are used, so the
/// localized label in front doesn't matter.
pub fn parse_scheme_line(line: &str) -> Option<PowerScheme> {
    let guid = line
        .split_whitespace()
        .find(|token| is_guid(token))?
        .to_lowercase();
    let name = match (line.find('('), line.rfind(')')) {
        (Some(start), Some(end)) if start < end => line[start + 1..end].trim().to_string(),
        _ => String::new(),
    };
    Some(PowerScheme {
        guid,
        name,
        active: line.trim_end().ends_with('*'),
    })
}

fn powercfg(runner: &dyn CommandRunner, args: &[&str]) -> Result<String> {
    let output = runner
        .run(
            "powercfg.exe",
            args,
            Some(Duration::from_secs(POWERCFG_TIMEOUT_SECS)),
        )
        .with_context(|| format!("Failed to run powercfg {}", args.join(" ")))?;
    if !output.success() {
        anyhow::bail!(
            "powercfg {} exited with {:?}: {}",
            args.join(" "),
            output.exit_code,
            output.stdout.trim()
        );
    }
    Ok(output.stdout)
}

/// Enumerates all power schemes on the system.
pub fn get_all_power_schemes(runner: &dyn CommandRunner) -> Result<Vec<PowerScheme>> {
    let stdout = powercfg(runner, &["/list"])?;
    let schemes: Vec<PowerScheme> = stdout.lines().filter_map(parse_scheme_line).collect();
    if schemes.is_empty() {
        anyhow::bail!("No power schemes found");
    }
    Ok(schemes)
}

pub fn get_active_power_scheme(runner: &dyn CommandRunner) -> Result<PowerScheme> {
    let stdout = powercfg(runner, &["/getactivescheme"])?;
    stdout
        .lines()
        .find_map(parse_scheme_line)
        .map(|scheme| PowerScheme {
            active: true,
            ..scheme
        })
        .context("powercfg did not report an active scheme")
}

pub fn set_active_power_scheme(runner: &dyn CommandRunner, guid: &str) -> Result<()> {
    powercfg(runner, &["/setactive", guid]).map(|_| ())
}

/// Creates a copy of a (possibly hidden) scheme; the copy gets a fresh GUID.
pub fn duplicate_power_scheme(runner: &dyn CommandRunner, guid: &str) -> Result<()> {
    powercfg(runner, &["-duplicatescheme", guid]).map(|_| ())
}

pub fn set_hibernation(runner: &dyn CommandRunner, enabled: bool) -> Result<()> {
    let flag = if enabled { "on" } else { "off" };
    powercfg(runner, &["-h", flag]).map(|_| ())
}
