// src/errors.rs

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid registry path: {0}")]
    InvalidPath(String),

    #[error("Unsupported registry hive: {0}")]
    UnsupportedHive(String),

    #[error("Failed to open registry key '{path}': {reason}")]
    KeyOpenError { path: String, reason: String },

    #[error("Failed to read registry value '{name}' in '{path}': {reason}")]
    ReadValueError {
        path: String,
        name: String,
        reason: String,
    },

    #[error("Failed to set registry value '{name}' in '{path}': {reason}")]
    SetValueError {
        path: String,
        name: String,
        reason: String,
    },

    #[error("Failed to delete registry value '{name}' in '{path}': {reason}")]
    DeleteValueError {
        path: String,
        name: String,
        reason: String,
    },

    #[error("Unsupported registry value type {kind} for '{name}'")]
    UnsupportedType { name: String, kind: String },
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service '{0}' does not exist")]
    NotFound(String),

    #[error("Failed to open Service Control Manager: {0}")]
    ManagerOpenError(String),

    #[error("Failed to query service '{name}': {reason}")]
    QueryError { name: String, reason: String },

    #[error("Failed to control service '{name}': {reason}")]
    ControlError { name: String, reason: String },

    #[error("Failed to configure service '{name}': {reason}")]
    ConfigError { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("No backup found for '{0}'")]
    NotFound(String),

    #[error("Malformed backup record '{id}': {reason}")]
    Malformed { id: String, reason: String },

    #[error("Failed to export '{key}': {reason}")]
    Export { key: String, reason: String },

    #[error("Backup storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Restore already {0}; create a new manager to run it again")]
    AlreadyRun(String),
}
