pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{DistributionEntity, ParticipantEntity, RandomizerEntity, RewardEntity};
use crate::dao::storage::{GuardedWrite, ParticipantInsert, StorageResult};
use crate::state::randomizer::{Bucket, RandomizerStatus, UserId};

/// Points ledger of the gamification layer.
pub trait RewardsLedger: Send + Sync {
    /// Append one reward entry.
    fn award(&self, reward: RewardEntity) -> BoxFuture<'static, StorageResult<()>>;
}

/// Abstraction over the persistence layer for randomizers and their participants.
///
/// Every status-dependent write is a single conditional operation in the
/// backend, so concurrent requests cannot both win the same transition.
pub trait RandomizerStore: RewardsLedger + Send + Sync {
    /// Store a freshly created randomizer.
    fn insert_randomizer(&self, randomizer: RandomizerEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Load one randomizer, `None` when the id is unknown.
    fn find_randomizer(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<RandomizerEntity>>>;
    /// Every randomizer in creation order.
    fn list_randomizers(&self) -> BoxFuture<'static, StorageResult<Vec<RandomizerEntity>>>;
    /// Move `id` from `from` to `to` only if it is still in `from`.
    fn transition_status(
        &self,
        id: Uuid,
        from: RandomizerStatus,
        to: RandomizerStatus,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>>;
    /// Insert an opt-in; a second row for the same user is reported, not stored.
    fn add_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<ParticipantInsert>>;
    /// Participants in opt-in order.
    fn list_participants(
        &self,
        randomizer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Number of opted-in users.
    fn count_participants(&self, randomizer_id: Uuid) -> BoxFuture<'static, StorageResult<u64>>;
    /// Replace the whole preview while the randomizer is open.
    fn replace_preview(
        &self,
        id: Uuid,
        preview: DistributionEntity,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>>;
    /// Overwrite one preview row while the randomizer is open.
    fn update_preview_assignment(
        &self,
        id: Uuid,
        user_id: UserId,
        bucket: Bucket,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>>;
    /// Copy the preview into the published distribution and mark the
    /// randomizer distributed, only if it is open and has a preview.
    fn publish_preview(
        &self,
        id: Uuid,
        distributed_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>>;
    /// Cheap round trip to the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
