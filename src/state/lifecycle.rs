use thiserror::Error;

use crate::state::randomizer::RandomizerStatus;

/// Events that move a randomizer through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomizerEvent {
    /// Stop accepting participants.
    Close,
    /// Accept participants again after a close.
    Reopen,
    /// Freeze the preview into the published distribution.
    Publish,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from}")]
pub struct InvalidTransition {
    /// The status the randomizer was in when the event was received.
    pub from: RandomizerStatus,
    /// The event that cannot be applied from this status.
    pub event: RandomizerEvent,
}

impl RandomizerStatus {
    /// Compute the status reached by applying `event`, without side effects.
    ///
    /// The persisted change is a compare-and-swap performed by the store, which
    /// guards against the status moving between this check and the write.
    pub fn apply(self, event: RandomizerEvent) -> Result<RandomizerStatus, InvalidTransition> {
        use RandomizerEvent::*;
        use RandomizerStatus::*;

        match (self, event) {
            (Open, Close) => Ok(Closed),
            (Closed, Reopen) => Ok(Open),
            (Open, Publish) => Ok(Distributed),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// Participants may only opt in while open.
    pub fn accepts_participants(self) -> bool {
        matches!(self, RandomizerStatus::Open)
    }

    /// Previews may only be generated or edited while open.
    pub fn allows_preview(self) -> bool {
        matches!(self, RandomizerStatus::Open)
    }
}
