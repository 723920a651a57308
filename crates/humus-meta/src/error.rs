//! Error types for humus-meta

use thiserror::Error;

/// Host-level errors from the Humus runtime
///
/// Program faults (mismatches, conflicts, `THROW`) never show up here; they
/// revert the transaction they happen in and are reported to the logger.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] humus_core::Error),

    #[error("Evaluation suspended on an unbound identifier")]
    Suspended,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
