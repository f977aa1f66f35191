// src/backup.rs

//! Captures registry values before they are changed and restores them exactly.
//!
//! Each captured value is written to its own `<id>.bak` file of `Key=Value` lines, so
//! backups survive a restart of the tool. Ids are derived from `(hive, path, name)` and
//! are stable across runs.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::{
    constants::{BACKUP_FILE_EXTENSION, REG_EXPORT_TIMEOUT_SECS},
    errors::BackupError,
    logging::{log_status, LogArea, OpStatus},
    utils::{
        command::CommandRunner,
        registry::{full_path, ConfigurationStore, RegistryHive, RegistryKeyValue, ValueKind},
    },
};

const NULL_MARKER: &str = "NULL";
const MAX_READABLE_ID_LEN: usize = 96;

/// The state of one registry value at the moment it was first captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub hive: RegistryHive,
    pub path: String,
    pub value_name: String,
    /// `None` if the value did not exist.
    pub original_value: Option<RegistryKeyValue>,
    pub value_kind: ValueKind,
    pub backup_time: DateTime<Local>,
    /// Whether the value existed. Restoring an entry with `false` deletes the value.
    pub key_existed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Captured,
    /// An earlier capture for the same value was kept.
    AlreadyCaptured,
}

/// Deterministic id for `(hive, path, name)`.
///
/// Registry names are case-insensitive, so the id is built from the lowercased triple:
/// a readable, filesystem-safe prefix plus 8 hex digits of its SHA-256.
pub fn backup_id(hive: RegistryHive, path: &str, value_name: &str) -> String {
    let canonical = format!("{}\\{}\\{}", hive, path.trim_matches('\\'), value_name).to_lowercase();
    let mut readable: String = canonical
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    readable.truncate(MAX_READABLE_ID_LEN);
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{}-{}", readable, hex::encode(&digest[..4]))
}

fn escape(text: &str, separator: Option<char>) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if Some(c) == separator => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Unescapes `text`, splitting on unescaped `separator` if one is given.
fn unescape_split(text: &str, separator: Option<char>) -> Result<Vec<String>, String> {
    let mut parts = vec![String::new()];
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        let current = parts.last_mut().ok_or("empty part list")?;
        match c {
            '\\' => match chars.next() {
                Some('\\') => current.push('\\'),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) if Some(other) == separator => current.push(other),
                Some(other) => return Err(format!("unknown escape '\\{}'", other)),
                None => return Err("dangling escape".to_string()),
            },
            c if Some(c) == separator => parts.push(String::new()),
            c => current.push(c),
        }
    }
    Ok(parts)
}

fn unescape(text: &str) -> Result<String, String> {
    unescape_split(text, None).map(|mut parts| parts.remove(0))
}

fn encode_value(value: &RegistryKeyValue) -> String {
    match value {
        RegistryKeyValue::Dword(v) => v.to_string(),
        RegistryKeyValue::Qword(v) => v.to_string(),
        RegistryKeyValue::String(s) | RegistryKeyValue::ExpandString(s) => escape(s, None),
        // Item count first, so an empty list and a single empty item stay distinct.
        RegistryKeyValue::MultiString(items) => std::iter::once(items.len().to_string())
            .chain(items.iter().map(|item| escape(item, Some('|'))))
            .collect::<Vec<_>>()
            .join("|"),
        RegistryKeyValue::Binary(bytes) => hex::encode(bytes),
    }
}

fn decode_value(kind: ValueKind, text: &str) -> Result<RegistryKeyValue, String> {
    match kind {
        ValueKind::DWord => text
            .parse()
            .map(RegistryKeyValue::Dword)
            .map_err(|e| format!("invalid DWORD '{}': {}", text, e)),
        ValueKind::QWord => text
            .parse()
            .map(RegistryKeyValue::Qword)
            .map_err(|e| format!("invalid QWORD '{}': {}", text, e)),
        ValueKind::String => unescape(text).map(RegistryKeyValue::String),
        ValueKind::ExpandString => unescape(text).map(RegistryKeyValue::ExpandString),
        ValueKind::MultiString => {
            let mut parts = unescape_split(text, Some('|'))?;
            let count: usize = parts
                .remove(0)
                .parse()
                .map_err(|e| format!("invalid item count: {}", e))?;
            if parts.len() != count {
                return Err(format!("expected {} items, found {}", count, parts.len()));
            }
            Ok(RegistryKeyValue::MultiString(parts))
        }
        ValueKind::Binary => hex::decode(text)
            .map(RegistryKeyValue::Binary)
            .map_err(|e| format!("invalid hex: {}", e)),
        ValueKind::Unknown => Err("value present but kind is Unknown".to_string()),
    }
}

impl BackupEntry {
    pub fn id(&self) -> String {
        backup_id(self.hive, &self.path, &self.value_name)
    }

    pub fn full_path(&self) -> String {
        full_path(self.hive, &self.path)
    }

    /// Serializes the entry as `Key=Value` lines.
    pub fn to_record(&self) -> String {
        let original = match &self.original_value {
            Some(value) if self.key_existed => encode_value(value),
            _ => NULL_MARKER.to_string(),
        };
        [
            format!("Hive={}", self.hive),
            format!("Path={}", escape(&self.path, None)),
            format!("ValueName={}", escape(&self.value_name, None)),
            format!("OriginalValue={}", original),
            format!("ValueKind={}", self.value_kind),
            format!("BackupTime={}", self.backup_time.to_rfc3339()),
            format!("KeyExisted={}", self.key_existed),
        ]
        .join("\n")
            + "\n"
    }

    /// Parses a record written by [`BackupEntry::to_record`].
    ///
    /// `KeyExisted` decides whether `OriginalValue` is data, so a string value that
    /// happens to read `NULL` survives the round trip.
    pub fn from_record(id: &str, record: &str) -> Result<Self, BackupError> {
        let malformed = |reason: String| BackupError::Malformed {
            id: id.to_string(),
            reason,
        };

        let fields: IndexMap<&str, &str> = record
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| line.split_once('='))
            .collect();
        let field = |name: &str| {
            fields
                .get(name)
                .copied()
                .ok_or_else(|| malformed(format!("missing field '{}'", name)))
        };

        let hive = field("Hive")?
            .parse::<RegistryHive>()
            .map_err(|e| malformed(format!("invalid hive: {}", e)))?;
        let path = unescape(field("Path")?).map_err(&malformed)?;
        let value_name = unescape(field("ValueName")?).map_err(&malformed)?;
        let value_kind = field("ValueKind")?
            .parse::<ValueKind>()
            .map_err(|e| malformed(format!("invalid value kind: {}", e)))?;
        let backup_time = DateTime::parse_from_rfc3339(field("BackupTime")?)
            .map_err(|e| malformed(format!("invalid timestamp: {}", e)))?
            .with_timezone(&Local);
        let key_existed = match field("KeyExisted")?.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            other => return Err(malformed(format!("invalid KeyExisted '{}'", other))),
        };

        let original_value = if key_existed {
            Some(decode_value(value_kind, field("OriginalValue")?).map_err(&malformed)?)
        } else {
            None
        };

        Ok(Self {
            hive,
            path,
            value_name,
            original_value,
            value_kind,
            backup_time,
            key_existed,
        })
    }
}

/// Captures and restores registry values, keeping the oldest capture for each value.
pub struct BackupManager {
    store: Arc<dyn ConfigurationStore>,
    runner: Arc<dyn CommandRunner>,
    backup_dir: PathBuf,
    entries: Mutex<IndexMap<String, BackupEntry>>,
}

impl BackupManager {
    /// Creates the manager, creating `backup_dir` if needed.
    pub fn new(
        store: Arc<dyn ConfigurationStore>,
        runner: Arc<dyn CommandRunner>,
        backup_dir: impl Into<PathBuf>,
    ) -> Result<Self, BackupError> {
        let backup_dir = backup_dir.into();
        fs::create_dir_all(&backup_dir)?;
        Ok(Self {
            store,
            runner,
            backup_dir,
            entries: Mutex::new(IndexMap::new()),
        })
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    fn cache(&self) -> MutexGuard<'_, IndexMap<String, BackupEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.backup_dir
            .join(format!("{}.{}", id, BACKUP_FILE_EXTENSION))
    }

    fn load_record(&self, id: &str) -> Result<Option<BackupEntry>, BackupError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let record = fs::read_to_string(&path)?;
        BackupEntry::from_record(id, &record).map(Some)
    }

    /// Looks `id` up in memory, then on disk, caching what it finds.
    fn lookup(&self, id: &str) -> Result<Option<BackupEntry>, BackupError> {
        if let Some(entry) = self.cache().get(id) {
            return Ok(Some(entry.clone()));
        }
        let loaded = self.load_record(id)?;
        if let Some(entry) = &loaded {
            self.cache().insert(id.to_string(), entry.clone());
        }
        Ok(loaded)
    }

    /// Captures the current state of a value before it is modified.
    ///
    /// # Returns
    ///
    /// - `Ok(BackupOutcome::Captured)` if a new entry was recorded and persisted.
    /// - `Ok(BackupOutcome::AlreadyCaptured)` if an older capture exists; it is kept.
    /// - `Err(BackupError)` if the value could not be read or the record not written.
    pub fn backup_value(
        &self,
        hive: RegistryHive,
        path: &str,
        value_name: &str,
    ) -> Result<BackupOutcome, BackupError> {
        let id = backup_id(hive, path, value_name);
        let target = format!("{}\\{}", full_path(hive, path), value_name);

        match self.lookup(&id) {
            Ok(Some(_)) => {
                log_status(
                    LogArea::Backup,
                    &target,
                    OpStatus::Skipped,
                    "Keeping earlier backup",
                );
                return Ok(BackupOutcome::AlreadyCaptured);
            }
            Ok(None) => {}
            Err(e) => {
                log_status(
                    LogArea::Backup,
                    &target,
                    OpStatus::Warning,
                    &format!("Replacing unreadable backup record: {}", e),
                );
            }
        }

        let original_value = match self.store.read_value(hive, path, value_name) {
            Ok(value) => value,
            Err(e) => {
                log_status(LogArea::Backup, &target, OpStatus::Failed, &e.to_string());
                return Err(e.into());
            }
        };

        let entry = BackupEntry {
            hive,
            path: path.to_string(),
            value_name: value_name.to_string(),
            value_kind: original_value
                .as_ref()
                .map_or(ValueKind::Unknown, RegistryKeyValue::kind),
            key_existed: original_value.is_some(),
            original_value,
            backup_time: Local::now(),
        };

        self.cache().insert(id.clone(), entry.clone());
        if let Err(e) = fs::write(self.record_path(&id), entry.to_record()) {
            log_status(
                LogArea::Backup,
                &target,
                OpStatus::Failed,
                &format!("Could not persist backup: {}", e),
            );
            return Err(e.into());
        }

        let detail = match &entry.original_value {
            Some(value) => format!("Captured {}", value),
            None => "Captured (value absent)".to_string(),
        };
        log_status(LogArea::Backup, &target, OpStatus::Success, &detail);
        Ok(BackupOutcome::Captured)
    }

    pub fn has_backup(&self, hive: RegistryHive, path: &str, value_name: &str) -> bool {
        matches!(
            self.lookup(&backup_id(hive, path, value_name)),
            Ok(Some(_))
        )
    }

    /// Exports a whole subtree with `reg.exe export` to a timestamped `.reg` file.
    pub fn export_key(&self, hive: RegistryHive, path: &str) -> Result<PathBuf, BackupError> {
        let key = full_path(hive, path);
        let stem: String = path
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let file = self.backup_dir.join(format!(
            "{}_{}.reg",
            stem,
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        let file_arg = file.to_string_lossy().into_owned();

        let export_error = |reason: String| {
            log_status(LogArea::Backup, &key, OpStatus::Failed, &reason);
            BackupError::Export {
                key: key.clone(),
                reason,
            }
        };

        let output = self
            .runner
            .run(
                "reg.exe",
                &["export", &key, &file_arg, "/y"],
                Some(Duration::from_secs(REG_EXPORT_TIMEOUT_SECS)),
            )
            .map_err(|e| export_error(e.to_string()))?;
        if !output.success() {
            return Err(export_error(format!(
                "reg.exe exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        if !file.exists() {
            return Err(export_error("reg.exe reported success but wrote no file".to_string()));
        }

        log_status(
            LogArea::Backup,
            &key,
            OpStatus::Success,
            &format!("Exported to {}", file.display()),
        );
        Ok(file)
    }

    /// Puts one captured value back: deletes it if it was absent, otherwise writes the
    /// original data and kind.
    pub fn restore_value(&self, id: &str) -> Result<(), BackupError> {
        let entry = self
            .lookup(id)?
            .ok_or_else(|| BackupError::NotFound(id.to_string()))?;
        let target = format!("{}\\{}", entry.full_path(), entry.value_name);

        let result = match (&entry.original_value, entry.key_existed) {
            (Some(value), true) => {
                self.store
                    .write_value(entry.hive, &entry.path, &entry.value_name, value)
            }
            _ => self
                .store
                .delete_value(entry.hive, &entry.path, &entry.value_name),
        };

        match result {
            Ok(()) => {
                log_status(LogArea::Restore, &target, OpStatus::Reverted, "Restored from backup");
                Ok(())
            }
            Err(e) => {
                log_status(LogArea::Restore, &target, OpStatus::Failed, &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Loads every record on disk into memory. Malformed records are logged and skipped.
    fn load_all(&self) -> Result<(), BackupError> {
        for dir_entry in fs::read_dir(&self.backup_dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BACKUP_FILE_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if self.cache().contains_key(id) {
                continue;
            }
            match self.load_record(id) {
                Ok(Some(entry)) => {
                    self.cache().insert(id.to_string(), entry);
                }
                Ok(None) => {}
                Err(e) => log_status(LogArea::Backup, id, OpStatus::Warning, &e.to_string()),
            }
        }
        Ok(())
    }

    /// Restores every known backup.
    ///
    /// # Returns
    ///
    /// The number of values restored successfully.
    pub fn restore_all(&self) -> usize {
        if let Err(e) = self.load_all() {
            log_status(
                LogArea::Restore,
                &self.backup_dir.display().to_string(),
                OpStatus::Warning,
                &format!("Could not scan backup directory: {}", e),
            );
        }
        let ids: Vec<String> = self.cache().keys().cloned().collect();
        ids.iter()
            .filter(|id| self.restore_value(id).is_ok())
            .count()
    }

    /// Forgets all backups, in memory and on disk.
    pub fn clear(&self) -> Result<usize, BackupError> {
        self.cache().clear();
        let mut removed = 0;
        for dir_entry in fs::read_dir(&self.backup_dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(BACKUP_FILE_EXTENSION) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        log_status(
            LogArea::Backup,
            &self.backup_dir.display().to_string(),
            OpStatus::Success,
            &format!("Cleared {} backup(s)", removed),
        );
        Ok(removed)
    }

    /// All backups currently known, including records only present on disk.
    pub fn entries(&self) -> Vec<BackupEntry> {
        if let Err(e) = self.load_all() {
            tracing::warn!("Could not scan backup directory: {}", e);
        }
        self.cache().values().cloned().collect()
    }

    pub fn backup_count(&self) -> usize {
        self.entries().len()
    }
}
