//! Operations available to Mini App users: opting in and reading results.

use std::time::SystemTime;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{models::ParticipantEntity, storage::ParticipantInsert},
    dto::randomizer::{MyResultResponse, ParticipationResponse, PublicRandomizerView},
    error::ServiceError,
    services::{admin_service::load_randomizer, sse_events},
    state::{SharedState, randomizer::UserId},
};

/// Register `user_id` as a participant of an open randomizer.
pub async fn participate(
    state: &SharedState,
    id: Uuid,
    user_id: UserId,
) -> Result<ParticipationResponse, ServiceError> {
    let store = state.require_store().await?;
    let randomizer = load_randomizer(&store, id).await?;
    if !randomizer.status.accepts_participants() {
        return Err(ServiceError::Conflict(format!(
            "randomizer `{id}` is {} and does not accept participants",
            randomizer.status
        )));
    }

    let outcome = store
        .add_participant(ParticipantEntity {
            randomizer_id: id,
            user_id,
            participated_at: SystemTime::now(),
        })
        .await?;

    match outcome {
        ParticipantInsert::Inserted => {}
        ParticipantInsert::Duplicate => {
            debug!(randomizer_id = %id, user_id, "duplicate participation rejected");
            return Err(ServiceError::Conflict(format!(
                "user {user_id} already participates in randomizer `{id}`"
            )));
        }
        ParticipantInsert::UnknownRandomizer => {
            return Err(ServiceError::NotFound(format!(
                "randomizer `{id}` not found"
            )));
        }
    }

    let participants_count = store.count_participants(id).await?;
    info!(randomizer_id = %id, user_id, participants_count, "participant joined");
    sse_events::broadcast_participant_joined(state, id, user_id, participants_count);

    Ok(ParticipationResponse {
        randomizer_id: id,
        user_id,
        participants_count,
    })
}

/// The caller's published bucket.
pub async fn my_result(
    state: &SharedState,
    id: Uuid,
    user_id: UserId,
) -> Result<MyResultResponse, ServiceError> {
    let store = state.require_store().await?;
    let randomizer = load_randomizer(&store, id).await?;
    let published = randomizer.published.as_ref().ok_or_else(|| {
        ServiceError::NotFound(format!("randomizer `{id}` has not been published yet"))
    })?;
    let assignment = published.assignment_of(user_id).ok_or_else(|| {
        ServiceError::NotFound(format!(
            "user {user_id} has no assignment in randomizer `{id}`"
        ))
    })?;

    Ok(MyResultResponse {
        randomizer_id: id,
        user_id,
        bucket: assignment.bucket,
    })
}

/// Randomizer details as seen by `user_id`.
pub async fn public_view(
    state: &SharedState,
    id: Uuid,
    user_id: UserId,
) -> Result<PublicRandomizerView, ServiceError> {
    let store = state.require_store().await?;
    let randomizer = load_randomizer(&store, id).await?;
    let participants = store.list_participants(id).await?;
    let participating = participants
        .iter()
        .any(|participant| participant.user_id == user_id);
    let result = randomizer
        .published
        .as_ref()
        .and_then(|published| published.assignment_of(user_id))
        .map(|assignment| assignment.bucket);

    Ok(PublicRandomizerView {
        id: randomizer.id,
        title: randomizer.title,
        config: randomizer.config,
        status: randomizer.status,
        participants_count: participants.len() as u64,
        participating,
        result,
    })
}
