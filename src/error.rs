//! Battle engine errors
//!
//! Every operation on the orchestration service returns one of these. The
//! variants map onto how a caller should react: show the message, never retry.

use thiserror::Error;

use crate::persistence::StoreError;

/// Broad classification of a [`BattleError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    StateViolation,
    Permission,
    Validation,
    Conflict,
    Store,
    Config,
}

/// Errors raised by the battle engine
#[derive(Debug, Error)]
pub enum BattleError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid battle state: {0}")]
    StateViolation(String),

    #[error("not permitted: {0}")]
    Permission(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("already in a battle: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BattleError {
    pub fn not_found(what: impl Into<String>) -> Self {
        BattleError::NotFound(what.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        BattleError::StateViolation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        BattleError::Permission(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        BattleError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        BattleError::Conflict(msg.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BattleError::NotFound(_) => ErrorKind::NotFound,
            BattleError::StateViolation(_) => ErrorKind::StateViolation,
            BattleError::Permission(_) => ErrorKind::Permission,
            BattleError::Validation(_) => ErrorKind::Validation,
            BattleError::Conflict(_) => ErrorKind::Conflict,
            BattleError::Store(_) => ErrorKind::Store,
            BattleError::Config(_) => ErrorKind::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, BattleError>;
