// src/lib.rs

pub mod backup;
pub mod categories;
pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod power;
pub mod restore_point;
pub mod tweaks;
pub mod utils;

#[cfg(test)]
mod test_support;
