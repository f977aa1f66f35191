// src/tweaks/method.rs

use anyhow::Error;

use crate::models::TweakResult;

/// Trait defining the behavior for all tweak methods.
///
/// Expected failures come back as an unsuccessful `TweakResult`; `Err` is reserved for
/// faults the method could not account for.
pub trait TweakMethod: Send + Sync {
    /// Checks if the tweak is currently applied. Must not change system state.
    fn is_applied(&self, id: &str) -> Result<bool, Error>;

    /// Applies the tweak, backing up every value it touches first.
    fn apply(&self, id: &str) -> Result<TweakResult, Error>;

    /// Reverts the tweak to the OS defaults. Safe to call when it was never applied.
    fn revert(&self, id: &str) -> Result<TweakResult, Error>;
}
