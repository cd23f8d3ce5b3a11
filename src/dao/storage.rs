use std::error::Error;
use thiserror::Error;

use crate::state::randomizer::RandomizerStatus;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Outcome of a write guarded by the randomizer status.
///
/// Backends apply the write and its guard atomically; when the guard fails they
/// report the first reason found, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardedWrite {
    /// The write went through.
    Applied,
    /// No randomizer with that id.
    Missing,
    /// The randomizer is not in the expected status.
    StatusMismatch(RandomizerStatus),
    /// The randomizer has no preview yet.
    NoPreview,
    /// The preview has no row for the targeted user.
    NoAssignment,
}

/// Outcome of a participation insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantInsert {
    /// A new participant row was created.
    Inserted,
    /// The user already joined this randomizer; nothing was written.
    Duplicate,
    /// The randomizer does not exist. Only reported by backends that keep
    /// participants inside the randomizer record.
    UnknownRandomizer,
}
