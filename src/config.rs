// src/config.rs

use std::{env, path::PathBuf, time::Duration};

use crate::{
    constants::{
        BACKUP_DIR_NAME, DEFAULT_PROBE_HOST, DEFAULT_PROBE_TIMEOUT_MS,
        DEFAULT_SERVICE_STOP_TIMEOUT_SECS, REGISTRY_BACKUP_DIR_NAME,
    },
    tweaks::network::dns::DnsProvider,
};

/// Runtime settings shared by the tweak catalogue and the restore pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding one `.bak` record per captured value, plus `.reg` exports.
    pub backup_dir: PathBuf,
    pub probe_host: String,
    pub probe_timeout: Duration,
    pub service_stop_timeout: Duration,
    pub dns_provider: DnsProvider,
    /// Create a restore point and subtree exports before an emergency restore.
    pub full_backup_before_restore: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            probe_host: DEFAULT_PROBE_HOST.to_string(),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            service_stop_timeout: Duration::from_secs(DEFAULT_SERVICE_STOP_TIMEOUT_SECS),
            dns_provider: DnsProvider::Cloudflare,
            full_backup_before_restore: true,
        }
    }
}

/// `<exe dir>\Backups\Registry`, falling back to the working directory.
pub fn default_backup_dir() -> PathBuf {
    let base = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(BACKUP_DIR_NAME).join(REGISTRY_BACKUP_DIR_NAME)
}
