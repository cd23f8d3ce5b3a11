use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::randomizer::{Assignment, RandomizerConfig, RandomizerStatus, UserId};

/// Randomizer aggregate persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RandomizerEntity {
    /// Primary key of the randomizer.
    pub id: Uuid,
    /// Display title shown to participants and used in notifications.
    pub title: String,
    /// Assignment or question this randomizer belongs to, if any.
    pub assignment_id: Option<Uuid>,
    /// Bucket configuration (tables or number draw).
    pub config: RandomizerConfig,
    /// Lifecycle status.
    pub status: RandomizerStatus,
    /// Points credited to every participant on publication (0 disables rewards).
    pub reward_points: u32,
    /// Editable distribution shown to admins before publication.
    pub preview: Option<DistributionEntity>,
    /// Frozen distribution copied from the preview on publication.
    pub published: Option<DistributionEntity>,
    /// When the randomizer was published.
    pub distributed_at: Option<SystemTime>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the randomizer was updated.
    pub updated_at: SystemTime,
}

impl RandomizerEntity {
    /// Build a freshly created, open randomizer.
    pub fn new(
        title: String,
        assignment_id: Option<Uuid>,
        config: RandomizerConfig,
        reward_points: u32,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            title,
            assignment_id,
            config,
            status: RandomizerStatus::Open,
            reward_points,
            preview: None,
            published: None,
            distributed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A computed set of assignments, either the preview or the published result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DistributionEntity {
    /// One row per participant.
    pub assignments: Vec<Assignment>,
    /// Participants seated beyond the configured capacity.
    pub overflow: u32,
    /// When the engine produced these assignments.
    pub generated_at: SystemTime,
}

impl DistributionEntity {
    /// Find the bucket of `user_id`, if assigned.
    pub fn assignment_of(&self, user_id: UserId) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.user_id == user_id)
    }
}

/// Opt-in record of a user for a randomizer. Unique per `(randomizer_id, user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Randomizer the user joined.
    pub randomizer_id: Uuid,
    /// Telegram user id.
    pub user_id: UserId,
    /// When the user opted in.
    pub participated_at: SystemTime,
}

/// Points credited to a user by the gamification ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardEntity {
    /// Credited user.
    pub user_id: UserId,
    /// Points credited.
    pub points: u32,
    /// Human readable reason (e.g. the randomizer title).
    pub reason: String,
    /// Randomizer that triggered the reward.
    pub randomizer_id: Uuid,
    /// When the reward was posted.
    pub created_at: SystemTime,
}
