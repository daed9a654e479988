//! Error types for the depot engine.

use std::io;
use thiserror::Error;

/// Result type for depot operations.
pub type DepotResult<T> = Result<T, DepotError>;

/// Errors that can occur in depot operations.
#[derive(Debug, Error)]
pub enum DepotError {
    /// I/O error from the storage layer, propagated unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input was rejected before any I/O was attempted.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the rejected input.
        message: String,
    },

    /// On-disk data can no longer be trusted. A streamer that reports this
    /// is permanently poisoned and will reproduce the error on every call.
    #[error("corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// The section has reached its capacity and accepts no more appends.
    #[error("section is full")]
    SectionFull,

    /// Every component in the queue's address space has been used.
    /// This is a terminal condition requiring operator intervention.
    #[error("queue address space exhausted")]
    AddressSpaceExhausted,
}

impl DepotError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}
