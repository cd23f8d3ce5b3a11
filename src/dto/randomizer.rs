use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{DistributionEntity, ParticipantEntity, RandomizerEntity},
    dto::{
        format_system_time,
        validation::{validate_randomizer_config, validate_reward_points, validate_title},
    },
    services::distribution::occupancy,
    state::randomizer::{Assignment, Bucket, RandomizerConfig, RandomizerStatus, UserId},
};

#[derive(Debug, Deserialize, ToSchema)]
/// Payload used by admins to create a randomizer.
pub struct CreateRandomizerRequest {
    pub title: String,
    /// Assignment (question) this randomizer belongs to, if any.
    #[serde(default)]
    pub assignment_id: Option<Uuid>,
    pub config: RandomizerConfig,
    /// Points granted to each participant on publication.
    #[serde(default)]
    pub reward_points: u32,
}

impl Validate for CreateRandomizerRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_title(&self.title) {
            errors.add("title", e);
        }
        if let Err(e) = validate_randomizer_config(&self.config) {
            errors.add("config", e);
        }
        if let Err(e) = validate_reward_points(self.reward_points) {
            errors.add("reward_points", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
/// Admin override of one preview row.
pub struct EditAssignmentRequest {
    pub bucket: Bucket,
}

#[derive(Debug, Serialize, ToSchema)]
/// Randomizer as listed in the admin console.
pub struct RandomizerSummary {
    pub id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<Uuid>,
    pub config: RandomizerConfig,
    pub status: RandomizerStatus,
    pub reward_points: u32,
    pub participants_count: u64,
    pub has_preview: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distributed_at: Option<String>,
}

impl RandomizerSummary {
    pub fn new(randomizer: RandomizerEntity, participants_count: u64) -> Self {
        Self {
            id: randomizer.id,
            title: randomizer.title,
            assignment_id: randomizer.assignment_id,
            config: randomizer.config,
            status: randomizer.status,
            reward_points: randomizer.reward_points,
            participants_count,
            has_preview: randomizer.preview.is_some(),
            created_at: format_system_time(randomizer.created_at),
            updated_at: format_system_time(randomizer.updated_at),
            distributed_at: randomizer.distributed_at.map(format_system_time),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Number of participants placed in one bucket.
pub struct BucketOccupancy {
    pub bucket: Bucket,
    pub count: usize,
}

fn occupancy_summary(assignments: &[Assignment]) -> Vec<BucketOccupancy> {
    occupancy(assignments)
        .into_iter()
        .map(|(bucket, count)| BucketOccupancy { bucket, count })
        .collect()
}

#[derive(Debug, Serialize, ToSchema)]
/// Current preview of a randomizer.
pub struct PreviewResponse {
    pub randomizer_id: Uuid,
    pub generated_at: String,
    /// Participants seated beyond the configured table capacity.
    pub overflow: u32,
    pub assignments: Vec<Assignment>,
    pub occupancy: Vec<BucketOccupancy>,
}

impl PreviewResponse {
    pub fn new(randomizer_id: Uuid, preview: DistributionEntity) -> Self {
        Self {
            randomizer_id,
            generated_at: format_system_time(preview.generated_at),
            overflow: preview.overflow,
            occupancy: occupancy_summary(&preview.assignments),
            assignments: preview.assignments,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Published distribution of a randomizer.
pub struct DistributionResponse {
    pub randomizer_id: Uuid,
    pub distributed_at: Option<String>,
    pub assignments: Vec<Assignment>,
    pub occupancy: Vec<BucketOccupancy>,
}

impl DistributionResponse {
    pub fn new(randomizer: &RandomizerEntity, published: DistributionEntity) -> Self {
        Self {
            randomizer_id: randomizer.id,
            distributed_at: randomizer.distributed_at.map(format_system_time),
            occupancy: occupancy_summary(&published.assignments),
            assignments: published.assignments,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Outcome of a successful publication.
pub struct PublishResponse {
    pub randomizer_id: Uuid,
    pub distributed_at: String,
    /// Participants whose notification and reward were handed to the background delivery.
    pub queued: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// One opted-in user.
pub struct ParticipantDto {
    pub user_id: UserId,
    pub participated_at: String,
}

impl From<ParticipantEntity> for ParticipantDto {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            user_id: value.user_id,
            participated_at: format_system_time(value.participated_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Confirmation returned when a user opts in.
pub struct ParticipationResponse {
    pub randomizer_id: Uuid,
    pub user_id: UserId,
    pub participants_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// The caller's published bucket.
pub struct MyResultResponse {
    pub randomizer_id: Uuid,
    pub user_id: UserId,
    pub bucket: Bucket,
}

#[derive(Debug, Serialize, ToSchema)]
/// Randomizer as shown in the Mini App to a given user.
pub struct PublicRandomizerView {
    pub id: Uuid,
    pub title: String,
    pub config: RandomizerConfig,
    pub status: RandomizerStatus,
    pub participants_count: u64,
    /// Whether the calling user has opted in.
    pub participating: bool,
    /// The caller's bucket once the distribution is published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Bucket>,
}
