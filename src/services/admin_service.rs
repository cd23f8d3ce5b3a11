//! Business logic powering the admin REST routes: randomizer lifecycle,
//! preview generation and hand edits, and publication.
//!
//! Every status-dependent write is a conditional write in the store. The
//! status read beforehand only produces the error message; the store decides.

use std::{sync::Arc, time::SystemTime};

use tokio::sync::oneshot;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    dao::{
        models::{DistributionEntity, RandomizerEntity},
        randomizer_store::RandomizerStore,
        storage::GuardedWrite,
    },
    dto::{
        format_system_time,
        randomizer::{
            CreateRandomizerRequest, DistributionResponse, ParticipantDto, PreviewResponse,
            PublishResponse, RandomizerSummary,
        },
    },
    error::ServiceError,
    services::{distribution, publication, sse_events},
    state::{
        SharedState,
        lifecycle::RandomizerEvent,
        randomizer::{Bucket, UserId},
    },
};

/// Fetch a randomizer or fail with [`ServiceError::NotFound`].
pub(crate) async fn load_randomizer(
    store: &Arc<dyn RandomizerStore>,
    id: Uuid,
) -> Result<RandomizerEntity, ServiceError> {
    store
        .find_randomizer(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("randomizer `{id}` not found")))
}

/// Turn the outcome of a guarded write into a service result.
fn ensure_applied(id: Uuid, outcome: GuardedWrite) -> Result<(), ServiceError> {
    match outcome {
        GuardedWrite::Applied => Ok(()),
        GuardedWrite::Missing => Err(ServiceError::NotFound(format!(
            "randomizer `{id}` not found"
        ))),
        GuardedWrite::StatusMismatch(status) => Err(ServiceError::Conflict(format!(
            "randomizer `{id}` is {status}"
        ))),
        GuardedWrite::NoPreview => Err(ServiceError::NotFound(format!(
            "randomizer `{id}` has no preview"
        ))),
        GuardedWrite::NoAssignment => Err(ServiceError::NotFound(format!(
            "randomizer `{id}` preview has no row for this user"
        ))),
    }
}

async fn summarize(
    store: &Arc<dyn RandomizerStore>,
    randomizer: RandomizerEntity,
) -> Result<RandomizerSummary, ServiceError> {
    let participants = store.count_participants(randomizer.id).await?;
    Ok(RandomizerSummary::new(randomizer, participants))
}

// ---------------------------------------------------------------------------
// Read-only projections
// ---------------------------------------------------------------------------

pub async fn list_randomizers(
    state: &SharedState,
) -> Result<Vec<RandomizerSummary>, ServiceError> {
    let store = state.require_store().await?;
    let randomizers = store.list_randomizers().await?;

    let mut summaries = Vec::with_capacity(randomizers.len());
    for randomizer in randomizers {
        summaries.push(summarize(&store, randomizer).await?);
    }
    Ok(summaries)
}

pub async fn get_randomizer(
    state: &SharedState,
    id: Uuid,
) -> Result<RandomizerSummary, ServiceError> {
    let store = state.require_store().await?;
    let randomizer = load_randomizer(&store, id).await?;
    summarize(&store, randomizer).await
}

/// Participants of a randomizer in opt-in order.
pub async fn list_participants(
    state: &SharedState,
    id: Uuid,
) -> Result<Vec<ParticipantDto>, ServiceError> {
    let store = state.require_store().await?;
    load_randomizer(&store, id).await?;
    let participants = store.list_participants(id).await?;
    Ok(participants.into_iter().map(Into::into).collect())
}

pub async fn get_preview(state: &SharedState, id: Uuid) -> Result<PreviewResponse, ServiceError> {
    let store = state.require_store().await?;
    let randomizer = load_randomizer(&store, id).await?;
    let preview = randomizer
        .preview
        .ok_or_else(|| ServiceError::NotFound(format!("randomizer `{id}` has no preview")))?;
    Ok(PreviewResponse::new(id, preview))
}

pub async fn get_distribution(
    state: &SharedState,
    id: Uuid,
) -> Result<DistributionResponse, ServiceError> {
    let store = state.require_store().await?;
    let randomizer = load_randomizer(&store, id).await?;
    let Some(published) = randomizer.published.clone() else {
        return Err(ServiceError::NotFound(format!(
            "randomizer `{id}` has not been published"
        )));
    };
    Ok(DistributionResponse::new(&randomizer, published))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Create an open randomizer.
pub async fn create_randomizer(
    state: &SharedState,
    request: CreateRandomizerRequest,
) -> Result<RandomizerSummary, ServiceError> {
    distribution::validate_config(&request.config)?;
    let store = state.require_store().await?;

    let randomizer = RandomizerEntity::new(
        request.title.trim().to_owned(),
        request.assignment_id,
        request.config,
        request.reward_points,
    );
    store.insert_randomizer(randomizer.clone()).await?;

    info!(randomizer_id = %randomizer.id, title = %randomizer.title, "randomizer created");
    sse_events::broadcast_randomizer_status(state, &randomizer);
    Ok(RandomizerSummary::new(randomizer, 0))
}

/// Stop accepting participants.
pub async fn close_randomizer(
    state: &SharedState,
    id: Uuid,
) -> Result<RandomizerSummary, ServiceError> {
    change_status(state, id, RandomizerEvent::Close).await
}

/// Accept participants again after a close.
pub async fn reopen_randomizer(
    state: &SharedState,
    id: Uuid,
) -> Result<RandomizerSummary, ServiceError> {
    change_status(state, id, RandomizerEvent::Reopen).await
}

async fn change_status(
    state: &SharedState,
    id: Uuid,
    event: RandomizerEvent,
) -> Result<RandomizerSummary, ServiceError> {
    let store = state.require_store().await?;
    let current = load_randomizer(&store, id).await?;
    let next = current.status.apply(event)?;

    let outcome = store.transition_status(id, current.status, next).await?;
    ensure_applied(id, outcome)?;

    let randomizer = load_randomizer(&store, id).await?;
    info!(randomizer_id = %id, from = %current.status, to = %next, "randomizer status changed");
    sse_events::broadcast_randomizer_status(state, &randomizer);
    summarize(&store, randomizer).await
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Compute a fresh preview from the current participants, replacing any
/// previous one. Only allowed while the randomizer is open.
pub async fn generate_preview(
    state: &SharedState,
    id: Uuid,
) -> Result<PreviewResponse, ServiceError> {
    let store = state.require_store().await?;
    let randomizer = load_randomizer(&store, id).await?;
    if !randomizer.status.allows_preview() {
        return Err(ServiceError::Conflict(format!(
            "randomizer `{id}` is {}",
            randomizer.status
        )));
    }

    let participants: Vec<UserId> = store
        .list_participants(id)
        .await?
        .into_iter()
        .map(|participant| participant.user_id)
        .collect();

    let plan = {
        let mut rng = rand::rng();
        distribution::compute_preview(
            &participants,
            &randomizer.config,
            state.config().overflow_policy,
            &mut rng,
        )?
    };

    let preview = DistributionEntity {
        assignments: plan.assignments,
        overflow: u32::try_from(plan.overflow).unwrap_or(u32::MAX),
        generated_at: SystemTime::now(),
    };

    let outcome = store.replace_preview(id, preview.clone()).await?;
    ensure_applied(id, outcome)?;

    debug!(
        randomizer_id = %id,
        assignments = preview.assignments.len(),
        overflow = preview.overflow,
        "preview generated"
    );
    sse_events::broadcast_preview_updated(
        state,
        id,
        preview.assignments.len(),
        preview.overflow,
    );
    Ok(PreviewResponse::new(id, preview))
}

/// Move one participant of the preview to another bucket.
///
/// Occupancy is not checked and other rows are left untouched.
pub async fn edit_assignment(
    state: &SharedState,
    id: Uuid,
    user_id: UserId,
    bucket: Bucket,
) -> Result<PreviewResponse, ServiceError> {
    let store = state.require_store().await?;
    let randomizer = load_randomizer(&store, id).await?;
    if !randomizer.status.allows_preview() {
        return Err(ServiceError::Conflict(format!(
            "randomizer `{id}` is {}",
            randomizer.status
        )));
    }
    if !randomizer.config.accepts(&bucket) {
        return Err(ServiceError::InvalidInput(format!(
            "{bucket} is not valid for this randomizer"
        )));
    }

    let outcome = store.update_preview_assignment(id, user_id, bucket).await?;
    ensure_applied(id, outcome)?;

    let preview = load_randomizer(&store, id)
        .await?
        .preview
        .ok_or_else(|| ServiceError::NotFound(format!("randomizer `{id}` has no preview")))?;

    info!(randomizer_id = %id, user_id, %bucket, "preview row edited");
    sse_events::broadcast_preview_updated(
        state,
        id,
        preview.assignments.len(),
        preview.overflow,
    );
    Ok(PreviewResponse::new(id, preview))
}

// ---------------------------------------------------------------------------
// Publication
// ---------------------------------------------------------------------------

/// Freeze the preview as the published distribution, then notify and reward
/// every assigned participant. Only the call that wins the store write
/// performs the side effects.
///
/// The store write and the fan-out run in a detached task, so dropping the
/// request after the write has been issued does not lose any delivery.
pub async fn publish(state: &SharedState, id: Uuid) -> Result<PublishResponse, ServiceError> {
    let store = state.require_store().await?;
    let current = load_randomizer(&store, id).await?;
    current.status.apply(RandomizerEvent::Publish)?;
    if current.preview.is_none() {
        return Err(ServiceError::NotFound(format!(
            "randomizer `{id}` has no preview"
        )));
    }

    let (committed_tx, committed_rx) = oneshot::channel();
    tokio::spawn(commit_and_deliver(state.clone(), store, id, committed_tx));

    let randomizer = committed_rx.await.map_err(|_| {
        ServiceError::Internal(format!("publication task of randomizer `{id}` aborted"))
    })??;
    let queued = randomizer
        .published
        .as_ref()
        .map(|published| published.assignments.len())
        .unwrap_or_default();

    Ok(PublishResponse {
        randomizer_id: id,
        distributed_at: randomizer
            .distributed_at
            .map(format_system_time)
            .unwrap_or_default(),
        queued,
    })
}

/// Publish `id` in the store, report the outcome through `committed`, then
/// notify and reward the participants if this call won the write.
async fn commit_and_deliver(
    state: SharedState,
    store: Arc<dyn RandomizerStore>,
    id: Uuid,
    committed: oneshot::Sender<Result<RandomizerEntity, ServiceError>>,
) {
    let published = match store.publish_preview(id, SystemTime::now()).await {
        Ok(outcome) => ensure_applied(id, outcome),
        Err(err) => Err(err.into()),
    };
    if let Err(err) = published {
        let _ = committed.send(Err(err));
        return;
    }

    let randomizer = match load_randomizer(&store, id).await {
        Ok(randomizer) => randomizer,
        Err(err) => {
            error!(
                randomizer_id = %id,
                error = %err,
                "published randomizer could not be reloaded; notifications skipped"
            );
            let _ = committed.send(Err(err));
            return;
        }
    };
    let assignments = randomizer
        .published
        .as_ref()
        .map(|published| published.assignments.clone())
        .unwrap_or_default();
    info!(
        randomizer_id = %id,
        participants = assignments.len(),
        "distribution published"
    );
    sse_events::broadcast_distribution_published(&state, &randomizer);

    if committed.send(Ok(randomizer.clone())).is_err() {
        debug!(randomizer_id = %id, "publish request dropped; delivering anyway");
    }

    let notifier = state.notifier();
    publication::fan_out(
        &randomizer,
        &assignments,
        notifier.as_ref(),
        store.as_ref(),
        &state.config().templates,
    )
    .await;
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use futures::{FutureExt, future::join_all};
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::ParticipantEntity, randomizer_store::memory::MemoryRandomizerStore},
        services::notifier::testing::RecordingDispatcher,
        state::{
            AppState,
            randomizer::{RandomizerConfig, RandomizerStatus},
        },
    };

    struct Harness {
        state: SharedState,
        store: MemoryRandomizerStore,
        dispatcher: RecordingDispatcher,
    }

    async fn harness() -> Harness {
        harness_with(RecordingDispatcher::default()).await
    }

    async fn harness_with(dispatcher: RecordingDispatcher) -> Harness {
        let store = MemoryRandomizerStore::new();
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(dispatcher.clone()),
            Some("secret".into()),
        );
        state.set_store(Arc::new(store.clone())).await;
        Harness {
            state,
            store,
            dispatcher,
        }
    }

    /// Poll `check` until it holds; deliveries run in a background task.
    async fn eventually(mut check: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !check() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn tables(tables_count: u32, participants_per_table: u32) -> RandomizerConfig {
        RandomizerConfig::Tables {
            tables_count,
            participants_per_table,
        }
    }

    async fn create_with_participants(
        harness: &Harness,
        config: RandomizerConfig,
        users: impl IntoIterator<Item = UserId>,
    ) -> Uuid {
        let summary = create_randomizer(
            &harness.state,
            CreateRandomizerRequest {
                title: "Dinner".into(),
                assignment_id: None,
                config,
                reward_points: 10,
            },
        )
        .await
        .unwrap();

        for user_id in users {
            harness
                .store
                .add_participant(ParticipantEntity {
                    randomizer_id: summary.id,
                    user_id,
                    participated_at: SystemTime::now(),
                })
                .await
                .unwrap();
        }
        summary.id
    }

    #[tokio::test]
    async fn preview_seats_five_participants_at_two_tables_of_three() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(2, 3), 1..=5).await;

        let preview = generate_preview(&harness.state, id).await.unwrap();
        assert_eq!(preview.assignments.len(), 5);
        assert_eq!(preview.overflow, 0);
        let mut counts: Vec<usize> = preview.occupancy.iter().map(|entry| entry.count).collect();
        counts.sort();
        assert_eq!(counts, vec![2, 3]);

        let users: HashSet<UserId> = preview.assignments.iter().map(|a| a.user_id).collect();
        assert_eq!(users, (1..=5).collect::<HashSet<UserId>>());
    }

    #[tokio::test]
    async fn repeated_previews_replace_each_other() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(3, 2), 1..=6).await;

        generate_preview(&harness.state, id).await.unwrap();
        let second = generate_preview(&harness.state, id).await.unwrap();
        let stored = get_preview(&harness.state, id).await.unwrap();

        assert_eq!(stored.assignments, second.assignments);
        assert!(stored.occupancy.iter().all(|entry| entry.count == 2));
    }

    #[tokio::test]
    async fn simple_mode_with_single_value_gives_everyone_the_same_number() {
        let harness = harness().await;
        let config = RandomizerConfig::Simple {
            number_min: 1,
            number_max: 1,
            unique_numbers: false,
        };
        let id = create_with_participants(&harness, config, 1..=3).await;

        let preview = generate_preview(&harness.state, id).await.unwrap();
        assert_eq!(preview.assignments.len(), 3);
        assert!(
            preview
                .assignments
                .iter()
                .all(|assignment| assignment.bucket == Bucket::Number(1))
        );
    }

    #[tokio::test]
    async fn preview_requires_an_open_randomizer() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(2, 2), 1..=2).await;
        close_randomizer(&harness.state, id).await.unwrap();

        assert!(matches!(
            generate_preview(&harness.state, id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            generate_preview(&harness.state, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn close_and_reopen_follow_the_lifecycle() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(1, 1), []).await;

        let closed = close_randomizer(&harness.state, id).await.unwrap();
        assert_eq!(closed.status, RandomizerStatus::Closed);
        assert!(matches!(
            close_randomizer(&harness.state, id).await,
            Err(ServiceError::Conflict(_))
        ));

        let reopened = reopen_randomizer(&harness.state, id).await.unwrap();
        assert_eq!(reopened.status, RandomizerStatus::Open);
    }

    #[tokio::test]
    async fn create_rejects_unusable_config() {
        let harness = harness().await;
        let result = create_randomizer(
            &harness.state,
            CreateRandomizerRequest {
                title: "Broken".into(),
                assignment_id: None,
                config: tables(0, 4),
                reward_points: 0,
            },
        )
        .await;

        assert!(matches!(result, Err(ServiceError::InvalidConfig(_))));
        assert!(list_randomizers(&harness.state).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_moves_one_row_without_rebalancing() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(2, 2), 1..=4).await;
        let before = generate_preview(&harness.state, id).await.unwrap();

        let edited = edit_assignment(&harness.state, id, 3, Bucket::Table(2))
            .await
            .unwrap();

        for (old, new) in before.assignments.iter().zip(&edited.assignments) {
            assert_eq!(old.user_id, new.user_id);
            if new.user_id == 3 {
                assert_eq!(new.bucket, Bucket::Table(2));
            } else {
                assert_eq!(old.bucket, new.bucket);
            }
        }
    }

    #[tokio::test]
    async fn edit_validates_bucket_and_target_row() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(2, 2), 1..=2).await;

        assert!(matches!(
            edit_assignment(&harness.state, id, 1, Bucket::Table(1)).await,
            Err(ServiceError::NotFound(_))
        ));

        generate_preview(&harness.state, id).await.unwrap();
        assert!(matches!(
            edit_assignment(&harness.state, id, 1, Bucket::Table(3)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            edit_assignment(&harness.state, id, 1, Bucket::Number(1)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            edit_assignment(&harness.state, id, 99, Bucket::Table(1)).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn publish_freezes_preview_and_notifies_once() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(2, 3), 1..=5).await;
        let preview = generate_preview(&harness.state, id).await.unwrap();

        let response = publish(&harness.state, id).await.unwrap();
        assert_eq!(response.queued, 5);
        eventually(|| harness.dispatcher.sent().len() == 5).await;
        eventually(|| (1..=5).all(|user| harness.store.points_of(user) == 10)).await;

        let distribution = get_distribution(&harness.state, id).await.unwrap();
        assert_eq!(distribution.assignments, preview.assignments);

        let second = publish(&harness.state, id).await;
        assert!(matches!(second, Err(ServiceError::Conflict(_))));
        assert_eq!(harness.dispatcher.sent().len(), 5);
        assert_eq!(harness.store.points_of(1), 10);

        let unchanged = get_distribution(&harness.state, id).await.unwrap();
        assert_eq!(unchanged.assignments, distribution.assignments);
    }

    #[tokio::test]
    async fn edit_and_preview_after_publish_conflict() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(2, 2), 1..=3).await;
        generate_preview(&harness.state, id).await.unwrap();
        publish(&harness.state, id).await.unwrap();

        assert!(matches!(
            edit_assignment(&harness.state, id, 1, Bucket::Table(2)).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            generate_preview(&harness.state, id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            reopen_randomizer(&harness.state, id).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn publish_without_preview_is_not_found() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(2, 2), 1..=3).await;

        assert!(matches!(
            publish(&harness.state, id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            get_distribution(&harness.state, id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn publish_of_closed_randomizer_conflicts() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(2, 2), 1..=3).await;
        generate_preview(&harness.state, id).await.unwrap();
        close_randomizer(&harness.state, id).await.unwrap();

        assert!(matches!(
            publish(&harness.state, id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(harness.dispatcher.sent().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishes_have_exactly_one_winner() {
        let harness = harness().await;
        let id = create_with_participants(&harness, tables(3, 3), 1..=8).await;
        generate_preview(&harness.state, id).await.unwrap();

        let attempts = (0..8).map(|_| {
            let state = harness.state.clone();
            tokio::spawn(async move { publish(&state, id).await })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let winners = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(
            results
                .iter()
                .filter_map(|result| result.as_ref().err())
                .all(|err| matches!(err, ServiceError::Conflict(_)))
        );
        eventually(|| harness.dispatcher.sent().len() == 8).await;
        eventually(|| harness.store.rewards_of(4).len() == 1).await;
        sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.dispatcher.sent().len(), 8);
        assert_eq!(harness.store.rewards_of(4).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropped_publish_request_still_notifies_and_rewards_everyone() {
        let harness =
            harness_with(RecordingDispatcher::delayed(Duration::from_millis(200))).await;
        let id = create_with_participants(&harness, tables(8, 5), 1..=40).await;
        generate_preview(&harness.state, id).await.unwrap();

        let request = {
            let state = harness.state.clone();
            tokio::spawn(async move { publish(&state, id).await })
        };
        let store = harness.store.clone();
        eventually(move || {
            store
                .find_randomizer(id)
                .now_or_never()
                .and_then(Result::ok)
                .flatten()
                .is_some_and(|randomizer| randomizer.status == RandomizerStatus::Distributed)
        })
        .await;
        request.abort();

        eventually(|| harness.dispatcher.sent().len() == 40).await;
        eventually(|| (1..=40).all(|user| harness.store.rewards_of(user).len() == 1)).await;
        assert!(matches!(
            publish(&harness.state, id).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn degraded_mode_rejects_admin_operations() {
        let harness = harness().await;
        harness.state.clear_store().await;

        assert!(matches!(
            list_randomizers(&harness.state).await,
            Err(ServiceError::Degraded)
        ));
    }
}
