//! Error types for humus-core

use crate::ActorId;
use thiserror::Error;

/// Core error type
///
/// These are usage errors made by the host driving a configuration.
/// Faults inside a Humus program never surface here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Not an actor: {0}")]
    NotAnActor(ActorId),

    #[error("Actor already registered: {0}")]
    AlreadyRegistered(ActorId),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("RON write error: {0}")]
    RonWrite(#[from] ron::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
