// src/main.rs

use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use win_tweaker::{config::Settings, tweaks::network::dns::DnsProvider};

/// Applies, inspects and reverts Windows system tweaks.
#[derive(Parser, Debug)]
#[command(name = "win_tweaker", version, about)]
struct Cli {
    /// Directory holding value backups and .reg exports.
    #[arg(long, global = true, env = "WIN_TWEAKER_BACKUP_DIR")]
    backup_dir: Option<PathBuf>,

    /// Host pinged after network changes.
    #[arg(long, global = true, env = "WIN_TWEAKER_PROBE_HOST")]
    probe_host: Option<String>,

    #[arg(long, global = true)]
    probe_timeout_ms: Option<u64>,

    /// How long to wait for a service to stop before killing it.
    #[arg(long, global = true)]
    stop_timeout_secs: Option<u64>,

    /// Resolver used by the DNS tweak (cloudflare, google, quad9).
    #[arg(long, global = true)]
    dns_provider: Option<DnsProvider>,

    /// Increase log output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every category and tweak.
    List,
    /// Show which tweaks are currently applied.
    Status,
    Apply {
        category: String,
        tweak: String,
    },
    Revert {
        category: String,
        tweak: String,
    },
    /// Revert every applied tweak, restore system defaults and replay all backups.
    Restore {
        /// Skip the restore point and registry exports taken first.
        #[arg(long)]
        no_backup: bool,
    },
    /// Create a restore point and export the registry subtrees tweaks touch.
    Backup,
    /// Manage captured value backups.
    Backups {
        #[command(subcommand)]
        action: BackupsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum BackupsCommand {
    List,
    /// Restore a single captured value by id.
    Restore { id: String },
    /// Delete every captured value.
    Clear,
    /// Capture one value, e.g. `HKLM\SOFTWARE\Foo Bar`.
    Value { path: String, name: String },
    /// List System Restore points.
    Points,
}

impl Cli {
    fn settings(&self) -> Settings {
        let defaults = Settings::default();
        Settings {
            backup_dir: self.backup_dir.clone().unwrap_or(defaults.backup_dir),
            probe_host: self.probe_host.clone().unwrap_or(defaults.probe_host),
            probe_timeout: self
                .probe_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.probe_timeout),
            service_stop_timeout: self
                .stop_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.service_stop_timeout),
            dns_provider: self.dns_provider.unwrap_or(defaults.dns_provider),
            full_backup_before_restore: !matches!(
                self.command,
                Command::Restore { no_backup: true }
            ),
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 if cfg!(debug_assertions) => "debug",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(windows)]
fn run(cli: Cli) -> Result<ExitCode> {
    use anyhow::Context;
    use win_tweaker::{
        categories::{default_registry, CategoryRegistry},
        orchestrator::EmergencyRestoreManager,
        restore_point::RestorePointManager,
        tweaks::{SystemContext, Tweak},
        utils::{registry::parse_registry_path, windows::is_elevated},
    };

    fn find<'a>(registry: &'a CategoryRegistry, category: &str, tweak: &str) -> Result<&'a Tweak> {
        registry
            .get_by_id(category)
            .with_context(|| format!("Unknown category '{}'", category))?
            .find(tweak)
            .with_context(|| format!("Unknown tweak '{}' in category '{}'", tweak, category))
    }

    fn exit_code(success: bool) -> ExitCode {
        if success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    if !is_elevated() {
        tracing::warn!("Not running as administrator. Most tweaks will fail to apply.");
    }

    let settings = cli.settings();
    let with_backup = settings.full_backup_before_restore;
    let ctx = SystemContext::system(settings).context("Failed to prepare the backup directory")?;
    let registry = default_registry(&ctx);

    match cli.command {
        Command::List => {
            for category in registry.categories() {
                println!("{} [{}] - {}", category.name, category.id, category.description);
                for tweak in category.tweaks() {
                    println!(
                        "  {:<28} {:<14} {}{}",
                        tweak.id,
                        tweak.risk_level.badge(),
                        tweak.name,
                        if tweak.requires_reboot { " (reboot)" } else { "" }
                    );
                }
            }
        }
        Command::Status => {
            let summary = EmergencyRestoreManager::new(&registry, &ctx).applied_tweaks_summary();
            println!(
                "{} of {} tweaks applied",
                summary.applied_tweaks, summary.total_tweaks
            );
            for (category, tweak) in &summary.applied {
                println!("  {}: {}", category, tweak);
            }
        }
        Command::Apply { category, tweak } => {
            let result = find(&registry, &category, &tweak)?.apply()?;
            println!("{}", result);
            return Ok(exit_code(result.success));
        }
        Command::Revert { category, tweak } => {
            let result = find(&registry, &category, &tweak)?.revert()?;
            println!("{}", result);
            return Ok(exit_code(result.success));
        }
        Command::Restore { .. } => {
            let mut manager = EmergencyRestoreManager::new(&registry, &ctx);
            let result = manager.run(with_backup)?;
            print!("{}", result);
            return Ok(exit_code(result.full_success()));
        }
        Command::Backup => {
            let complete = EmergencyRestoreManager::new(&registry, &ctx).create_full_backup();
            println!(
                "Backup {} in {}",
                if complete { "complete" } else { "incomplete" },
                ctx.backup.backup_dir().display()
            );
            return Ok(exit_code(complete));
        }
        Command::Backups { action } => match action {
            BackupsCommand::List => {
                let entries = ctx.backup.entries();
                println!("{} captured value(s)", entries.len());
                for entry in entries {
                    let original = entry
                        .original_value
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "<absent>".to_string());
                    println!(
                        "  {}\n    {}\\{} = {} ({})",
                        entry.id(),
                        entry.full_path(),
                        entry.value_name,
                        original,
                        entry.backup_time.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
            BackupsCommand::Restore { id } => {
                ctx.backup.restore_value(&id)?;
                println!("Restored {}", id);
            }
            BackupsCommand::Clear => {
                let removed = ctx.backup.clear()?;
                println!("Removed {} backup record(s)", removed);
            }
            BackupsCommand::Value { path, name } => {
                let (hive, key) = parse_registry_path(&path)?;
                let outcome = ctx.backup.backup_value(hive, &key, &name)?;
                println!("{:?}: {}\\{}", outcome, path, name);
            }
            BackupsCommand::Points => {
                let points = RestorePointManager::new(ctx.runner.clone()).list_restore_points()?;
                println!("{} restore point(s)", points.len());
                for point in points {
                    println!(
                        "  #{:<5} {}  {}",
                        point.sequence_number,
                        point.creation_time.format("%Y-%m-%d %H:%M:%S"),
                        point.description
                    );
                }
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(windows))]
fn run(cli: Cli) -> Result<ExitCode> {
    tracing::debug!("Settings: {:?}", cli.settings());
    anyhow::bail!("win_tweaker manages Windows settings; this host is unsupported")
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}
