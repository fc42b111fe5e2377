use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: Uuid,
    },

    #[error("invalid state: current {current}, expected {expected}")]
    InvalidState {
        current: String,
        expected: String,
    },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
    },

    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Money,
        requested: Money,
    },

    #[error("conflict: {message}")]
    Conflict {
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub fn invalid_state(current: impl Into<String>, expected: impl Into<String>) -> Self {
        EngineError::InvalidState {
            current: current.into(),
            expected: expected.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
