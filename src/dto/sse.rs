use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::randomizer::{RandomizerStatus, UserId};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`public` or `admin`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a randomizer is created, closed or reopened.
pub struct RandomizerStatusEvent {
    pub randomizer_id: Uuid,
    pub status: RandomizerStatus,
}

#[derive(Debug, Serialize, ToSchema)]
/// Admin-only event emitted when a user opts in.
pub struct ParticipantJoinedEvent {
    pub randomizer_id: Uuid,
    pub user_id: UserId,
    pub participants_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Admin-only event emitted when a preview is generated or edited.
pub struct PreviewUpdatedEvent {
    pub randomizer_id: Uuid,
    pub assignments: usize,
    pub overflow: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once a distribution has been published.
pub struct DistributionPublishedEvent {
    pub randomizer_id: Uuid,
    pub title: String,
    /// RFC3339 timestamp of the publication.
    pub distributed_at: String,
}
