// src/constants.rs

use crate::utils::{registry::RegistryHive, services::StartupType};

// Backups live next to the executable unless overridden.
pub const BACKUP_DIR_NAME: &str = "Backups";
pub const REGISTRY_BACKUP_DIR_NAME: &str = "Registry";
pub const BACKUP_FILE_EXTENSION: &str = "bak";

pub const DEFAULT_PROBE_HOST: &str = "8.8.8.8";
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_SERVICE_STOP_TIMEOUT_SECS: u64 = 30;

pub const REG_EXPORT_TIMEOUT_SECS: u64 = 60;
pub const POWERSHELL_TIMEOUT_SECS: u64 = 120;
pub const POWERCFG_TIMEOUT_SECS: u64 = 30;

pub const FULL_BACKUP_DESCRIPTION: &str = "Pre-Tweak Backup";

pub const SERVICES_KEY_PATH: &str = r"SYSTEM\CurrentControlSet\Services";
pub const POWER_KEY_PATH: &str = r"SYSTEM\CurrentControlSet\Control\Power";

/// Subtrees exported to `.reg` files as part of a full backup.
pub const FULL_BACKUP_KEYS: &[(RegistryHive, &str)] = &[
    (RegistryHive::LocalMachine, r"SOFTWARE\Policies\Microsoft\Windows"),
    (RegistryHive::LocalMachine, POWER_KEY_PATH),
    (RegistryHive::LocalMachine, SERVICES_KEY_PATH),
    (
        RegistryHive::CurrentUser,
        r"SOFTWARE\Microsoft\Windows\CurrentVersion",
    ),
];

/// Stock startup types for services that tweaks in this tool may disable.
pub const SERVICE_DEFAULTS: &[(&str, StartupType)] = &[
    ("DiagTrack", StartupType::Automatic),
    ("dmwappushservice", StartupType::Automatic),
    ("WSearch", StartupType::AutomaticDelayed),
    ("lfsvc", StartupType::Manual),
    ("Spooler", StartupType::Automatic),
    ("bthserv", StartupType::Manual),
    ("BTAGService", StartupType::Manual),
    ("RemoteRegistry", StartupType::Manual),
    ("SysMain", StartupType::Automatic),
    ("wisvc", StartupType::Manual),
    ("TabletInputService", StartupType::Manual),
    ("Fax", StartupType::Manual),
    ("WerSvc", StartupType::Manual),
];
