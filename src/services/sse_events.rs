use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::RandomizerEntity,
    dto::{
        format_system_time,
        sse::{
            DistributionPublishedEvent, ParticipantJoinedEvent, PreviewUpdatedEvent,
            RandomizerStatusEvent, ServerEvent, SystemStatus,
        },
    },
    state::{AppState, randomizer::UserId},
};

const EVENT_SYSTEM_STATUS: &str = "system.status";
const EVENT_RANDOMIZER_STATUS: &str = "randomizer.status";
const EVENT_PARTICIPANT_JOINED: &str = "randomizer.participant_joined";
const EVENT_PREVIEW_UPDATED: &str = "randomizer.preview_updated";
const EVENT_DISTRIBUTION_PUBLISHED: &str = "randomizer.published";

/// Broadcast the degraded flag on both streams.
pub fn broadcast_system_status(state: &AppState, degraded: bool) {
    let payload = SystemStatus { degraded };
    send_public_event(state, EVENT_SYSTEM_STATUS, &payload);
    send_admin_event(state, EVENT_SYSTEM_STATUS, &payload);
}

/// Broadcast the new status of a randomizer.
pub fn broadcast_randomizer_status(state: &AppState, randomizer: &RandomizerEntity) {
    let payload = RandomizerStatusEvent {
        randomizer_id: randomizer.id,
        status: randomizer.status,
    };
    send_public_event(state, EVENT_RANDOMIZER_STATUS, &payload);
    send_admin_event(state, EVENT_RANDOMIZER_STATUS, &payload);
}

/// Tell admins that a participant joined.
pub fn broadcast_participant_joined(
    state: &AppState,
    randomizer_id: Uuid,
    user_id: UserId,
    participants_count: u64,
) {
    let payload = ParticipantJoinedEvent {
        randomizer_id,
        user_id,
        participants_count,
    };
    send_admin_event(state, EVENT_PARTICIPANT_JOINED, &payload);
}

/// Tell admins that the preview changed.
pub fn broadcast_preview_updated(
    state: &AppState,
    randomizer_id: Uuid,
    assignments: usize,
    overflow: u32,
) {
    let payload = PreviewUpdatedEvent {
        randomizer_id,
        assignments,
        overflow,
    };
    send_admin_event(state, EVENT_PREVIEW_UPDATED, &payload);
}

/// Announce a publication to everyone.
pub fn broadcast_distribution_published(state: &AppState, randomizer: &RandomizerEntity) {
    let payload = DistributionPublishedEvent {
        randomizer_id: randomizer.id,
        title: randomizer.title.clone(),
        distributed_at: randomizer
            .distributed_at
            .map(format_system_time)
            .unwrap_or_default(),
    };
    send_public_event(state, EVENT_DISTRIBUTION_PUBLISHED, &payload);
    send_admin_event(state, EVENT_DISTRIBUTION_PUBLISHED, &payload);
}

fn send_public_event(state: &AppState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}

fn send_admin_event(state: &AppState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.admin_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize admin SSE payload"),
    }
}
