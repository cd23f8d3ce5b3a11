//! In-process store used for local runs without MongoDB and by the test suite.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::{
    models::{DistributionEntity, ParticipantEntity, RandomizerEntity, RewardEntity},
    randomizer_store::{RandomizerStore, RewardsLedger},
    storage::{GuardedWrite, ParticipantInsert, StorageResult},
};
use crate::state::randomizer::{Bucket, RandomizerStatus, UserId};

#[derive(Clone, Default)]
pub struct MemoryRandomizerStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    randomizers: DashMap<Uuid, StoredRandomizer>,
    rewards: DashMap<UserId, Vec<RewardEntity>>,
}

/// A randomizer together with its participants keyed by user, in opt-in order.
struct StoredRandomizer {
    entity: RandomizerEntity,
    participants: IndexMap<UserId, SystemTime>,
}

impl MemoryRandomizerStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewards credited to `user_id`, oldest first.
    pub fn rewards_of(&self, user_id: UserId) -> Vec<RewardEntity> {
        self.inner
            .rewards
            .get(&user_id)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    /// Current points balance of `user_id`.
    pub fn points_of(&self, user_id: UserId) -> u64 {
        self.rewards_of(user_id)
            .iter()
            .map(|reward| reward.points as u64)
            .sum()
    }

    /// Run `write` on the randomizer while holding its entry lock, after
    /// checking that it exists and has the `expected` status.
    fn guarded<F>(&self, id: Uuid, expected: RandomizerStatus, write: F) -> GuardedWrite
    where
        F: FnOnce(&mut RandomizerEntity) -> GuardedWrite,
    {
        let Some(mut stored) = self.inner.randomizers.get_mut(&id) else {
            return GuardedWrite::Missing;
        };
        if stored.entity.status != expected {
            return GuardedWrite::StatusMismatch(stored.entity.status);
        }
        let outcome = write(&mut stored.entity);
        if outcome == GuardedWrite::Applied {
            stored.entity.updated_at = SystemTime::now();
        }
        outcome
    }
}

impl RewardsLedger for MemoryRandomizerStore {
    fn award(&self, reward: RewardEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .rewards
                .entry(reward.user_id)
                .or_default()
                .push(reward);
            Ok(())
        })
    }
}

impl RandomizerStore for MemoryRandomizerStore {
    fn insert_randomizer(
        &self,
        randomizer: RandomizerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.randomizers.insert(
                randomizer.id,
                StoredRandomizer {
                    entity: randomizer,
                    participants: IndexMap::new(),
                },
            );
            Ok(())
        })
    }

    fn find_randomizer(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RandomizerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .randomizers
                .get(&id)
                .map(|stored| stored.entity.clone()))
        })
    }

    fn list_randomizers(&self) -> BoxFuture<'static, StorageResult<Vec<RandomizerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut randomizers: Vec<RandomizerEntity> = store
                .inner
                .randomizers
                .iter()
                .map(|stored| stored.entity.clone())
                .collect();
            randomizers.sort_by_key(|randomizer| randomizer.created_at);
            Ok(randomizers)
        })
    }

    fn transition_status(
        &self,
        id: Uuid,
        from: RandomizerStatus,
        to: RandomizerStatus,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store.guarded(id, from, |entity| {
                entity.status = to;
                GuardedWrite::Applied
            }))
        })
    }

    fn add_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<ParticipantInsert>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(mut stored) = store.inner.randomizers.get_mut(&participant.randomizer_id)
            else {
                return Ok(ParticipantInsert::UnknownRandomizer);
            };
            if stored.participants.contains_key(&participant.user_id) {
                return Ok(ParticipantInsert::Duplicate);
            }
            stored
                .participants
                .insert(participant.user_id, participant.participated_at);
            Ok(ParticipantInsert::Inserted)
        })
    }

    fn list_participants(
        &self,
        randomizer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .randomizers
                .get(&randomizer_id)
                .map(|stored| {
                    stored
                        .participants
                        .iter()
                        .map(|(user_id, participated_at)| ParticipantEntity {
                            randomizer_id,
                            user_id: *user_id,
                            participated_at: *participated_at,
                        })
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn count_participants(&self, randomizer_id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .randomizers
                .get(&randomizer_id)
                .map(|stored| stored.participants.len() as u64)
                .unwrap_or(0))
        })
    }

    fn replace_preview(
        &self,
        id: Uuid,
        preview: DistributionEntity,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store.guarded(id, RandomizerStatus::Open, |entity| {
                entity.preview = Some(preview);
                GuardedWrite::Applied
            }))
        })
    }

    fn update_preview_assignment(
        &self,
        id: Uuid,
        user_id: UserId,
        bucket: Bucket,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store.guarded(id, RandomizerStatus::Open, |entity| {
                let Some(preview) = entity.preview.as_mut() else {
                    return GuardedWrite::NoPreview;
                };
                match preview
                    .assignments
                    .iter_mut()
                    .find(|assignment| assignment.user_id == user_id)
                {
                    Some(assignment) => {
                        assignment.bucket = bucket;
                        GuardedWrite::Applied
                    }
                    None => GuardedWrite::NoAssignment,
                }
            }))
        })
    }

    fn publish_preview(
        &self,
        id: Uuid,
        distributed_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store.guarded(id, RandomizerStatus::Open, |entity| {
                let Some(preview) = entity.preview.clone() else {
                    return GuardedWrite::NoPreview;
                };
                entity.published = Some(preview);
                entity.distributed_at = Some(distributed_at);
                entity.status = RandomizerStatus::Distributed;
                GuardedWrite::Applied
            }))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::randomizer::{Assignment, RandomizerConfig};

    fn open_randomizer() -> RandomizerEntity {
        RandomizerEntity::new(
            "Networking dinner".into(),
            None,
            RandomizerConfig::Tables {
                tables_count: 2,
                participants_per_table: 2,
            },
            0,
        )
    }

    fn preview(users: &[UserId]) -> DistributionEntity {
        DistributionEntity {
            assignments: users
                .iter()
                .map(|user_id| Assignment {
                    user_id: *user_id,
                    bucket: Bucket::Table(1),
                })
                .collect(),
            overflow: 0,
            generated_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn participants_are_unique_and_ordered() {
        let store = MemoryRandomizerStore::new();
        let randomizer = open_randomizer();
        let id = randomizer.id;
        store.insert_randomizer(randomizer).await.unwrap();

        for user_id in [3, 1, 3, 2] {
            store
                .add_participant(ParticipantEntity {
                    randomizer_id: id,
                    user_id,
                    participated_at: SystemTime::now(),
                })
                .await
                .unwrap();
        }

        let users: Vec<UserId> = store
            .list_participants(id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.user_id)
            .collect();
        assert_eq!(users, vec![3, 1, 2]);
        assert_eq!(store.count_participants(id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn guarded_writes_report_why_they_failed() {
        let store = MemoryRandomizerStore::new();
        let randomizer = open_randomizer();
        let id = randomizer.id;
        store.insert_randomizer(randomizer).await.unwrap();

        assert_eq!(
            store.publish_preview(Uuid::new_v4(), SystemTime::now()).await.unwrap(),
            GuardedWrite::Missing
        );
        assert_eq!(
            store.publish_preview(id, SystemTime::now()).await.unwrap(),
            GuardedWrite::NoPreview
        );

        store.replace_preview(id, preview(&[10, 11])).await.unwrap();
        assert_eq!(
            store
                .update_preview_assignment(id, 99, Bucket::Table(2))
                .await
                .unwrap(),
            GuardedWrite::NoAssignment
        );
        assert_eq!(
            store.publish_preview(id, SystemTime::now()).await.unwrap(),
            GuardedWrite::Applied
        );
        assert_eq!(
            store.publish_preview(id, SystemTime::now()).await.unwrap(),
            GuardedWrite::StatusMismatch(RandomizerStatus::Distributed)
        );

        let stored = store.find_randomizer(id).await.unwrap().unwrap();
        assert_eq!(stored.published, stored.preview);
        assert!(stored.distributed_at.is_some());
    }
}
