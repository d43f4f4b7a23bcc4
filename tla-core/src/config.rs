//! Tracker Configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What to do when a declaration arrives for a key that already has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeclarationPolicy {
    /// Return [`TrackerError::Redeclared`](crate::TrackerError::Redeclared)
    /// and leave the node untouched.
    #[default]
    Reject,

    /// Keep the first declaration and ignore the new one.
    FirstWriteWins,
}

/// How the quiescence barrier defers its opening after quiescence is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierDeferral {
    /// Spawn onto the ambient Tokio runtime, yield once, then open. Without a
    /// runtime the opening is committed as soon as the declaration that
    /// observed quiescence has finished propagating.
    #[default]
    Yield,

    /// Only seal. The host opens sealed epochs with
    /// [`AsyncTlaTracker::open_sealed`](crate::AsyncTlaTracker::open_sealed).
    Manual,
}

/// Configuration for an [`AsyncTlaTracker`](crate::AsyncTlaTracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub redeclaration: RedeclarationPolicy,
    pub deferral: BarrierDeferral,
}

impl TrackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redeclaration(mut self, policy: RedeclarationPolicy) -> Self {
        self.redeclaration = policy;
        self
    }

    pub fn with_deferral(mut self, deferral: BarrierDeferral) -> Self {
        self.deferral = deferral;
        self
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
