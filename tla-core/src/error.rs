//! Tracker errors

use thiserror::Error;

/// Tracker result type
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Which of the two per-node declarations an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declaration {
    /// `declare_self`
    Entry,
    /// `declare_dependencies`
    Dependencies,
}

impl std::fmt::Display for Declaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entry => f.write_str("entry"),
            Self::Dependencies => f.write_str("dependency"),
        }
    }
}

/// Tracker errors
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{declaration} declaration for {key} was already made")]
    Redeclared {
        key: String,
        declaration: Declaration,
    },

    #[error("tracker dropped before the verdict settled")]
    Abandoned,

    #[error("invalid tracker config: {0}")]
    Config(#[from] serde_json::Error),
}
