// src/utils.rs

pub mod command;
pub mod network;
pub mod powershell;
pub mod registry;
pub mod services;
#[cfg(windows)]
pub mod windows;
