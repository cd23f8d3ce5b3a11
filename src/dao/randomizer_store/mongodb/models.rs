use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{DistributionEntity, ParticipantEntity, RandomizerEntity, RewardEntity};
use crate::state::randomizer::{Assignment, RandomizerConfig, RandomizerStatus};

use super::error::MongoDaoError;

/// Randomizer document. Identifiers are stored as hyphenated strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRandomizerDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    #[serde(default)]
    assignment_id: Option<String>,
    config: RandomizerConfig,
    status: RandomizerStatus,
    #[serde(default)]
    reward_points: u32,
    #[serde(default)]
    preview: Option<MongoDistributionDocument>,
    #[serde(default)]
    published: Option<MongoDistributionDocument>,
    #[serde(default)]
    distributed_at: Option<DateTime>,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDistributionDocument {
    assignments: Vec<Assignment>,
    #[serde(default)]
    overflow: u32,
    generated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    randomizer_id: String,
    user_id: i64,
    participated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRewardDocument {
    user_id: i64,
    points: u32,
    reason: String,
    randomizer_id: String,
    created_at: DateTime,
}

impl MongoRandomizerDocument {
    pub fn status(&self) -> RandomizerStatus {
        self.status
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }
}

impl From<RandomizerEntity> for MongoRandomizerDocument {
    fn from(value: RandomizerEntity) -> Self {
        Self {
            id: value.id.to_string(),
            title: value.title,
            assignment_id: value.assignment_id.map(|id| id.to_string()),
            config: value.config,
            status: value.status,
            reward_points: value.reward_points,
            preview: value.preview.map(Into::into),
            published: value.published.map(Into::into),
            distributed_at: value.distributed_at.map(DateTime::from_system_time),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoRandomizerDocument> for RandomizerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRandomizerDocument) -> Result<Self, Self::Error> {
        let id = parse_uuid(&value.id, "invalid randomizer id")?;
        let assignment_id = value
            .assignment_id
            .as_deref()
            .map(|raw| parse_uuid(raw, "invalid assignment id"))
            .transpose()?;

        Ok(Self {
            id,
            title: value.title,
            assignment_id,
            config: value.config,
            status: value.status,
            reward_points: value.reward_points,
            preview: value.preview.map(Into::into),
            published: value.published.map(Into::into),
            distributed_at: value.distributed_at.map(DateTime::to_system_time),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

impl From<DistributionEntity> for MongoDistributionDocument {
    fn from(value: DistributionEntity) -> Self {
        Self {
            assignments: value.assignments,
            overflow: value.overflow,
            generated_at: DateTime::from_system_time(value.generated_at),
        }
    }
}

impl From<MongoDistributionDocument> for DistributionEntity {
    fn from(value: MongoDistributionDocument) -> Self {
        Self {
            assignments: value.assignments,
            overflow: value.overflow,
            generated_at: value.generated_at.to_system_time(),
        }
    }
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            randomizer_id: value.randomizer_id.to_string(),
            user_id: value.user_id,
            participated_at: DateTime::from_system_time(value.participated_at),
        }
    }
}

impl MongoParticipantDocument {
    pub fn into_entity(self, randomizer_id: Uuid) -> ParticipantEntity {
        ParticipantEntity {
            randomizer_id,
            user_id: self.user_id,
            participated_at: self.participated_at.to_system_time(),
        }
    }
}

impl From<RewardEntity> for MongoRewardDocument {
    fn from(value: RewardEntity) -> Self {
        Self {
            user_id: value.user_id,
            points: value.points,
            reason: value.reason,
            randomizer_id: value.randomizer_id.to_string(),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

fn parse_uuid(raw: &str, reason: &'static str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|_| MongoDaoError::Malformed {
        id: raw.to_owned(),
        reason,
    })
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::state::randomizer::Bucket;

    #[test]
    fn randomizer_round_trips_through_document() {
        let mut entity = RandomizerEntity::new(
            "Coffee roulette".into(),
            Some(Uuid::new_v4()),
            RandomizerConfig::Simple {
                number_min: 1,
                number_max: 99,
                unique_numbers: true,
            },
            25,
        );
        // BSON dates carry millisecond precision.
        let at = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        entity.created_at = at;
        entity.updated_at = at;
        entity.preview = Some(DistributionEntity {
            assignments: vec![Assignment {
                user_id: 42,
                bucket: Bucket::Number(7),
            }],
            overflow: 0,
            generated_at: at,
        });

        let document: MongoRandomizerDocument = entity.clone().into();
        let bson = mongodb::bson::serialize_to_document(&document).unwrap();
        assert_eq!(bson.get_str("status").unwrap(), "open");
        assert_eq!(bson.get_str("_id").unwrap(), entity.id.to_string());

        let decoded: MongoRandomizerDocument = mongodb::bson::deserialize_from_document(bson).unwrap();
        let restored = RandomizerEntity::try_from(decoded).unwrap();
        assert_eq!(restored, entity);
    }

    #[test]
    fn malformed_id_is_reported() {
        let mut document: MongoRandomizerDocument = RandomizerEntity::new(
            "x".into(),
            None,
            RandomizerConfig::Tables {
                tables_count: 1,
                participants_per_table: 1,
            },
            0,
        )
        .into();
        document.id = "not-a-uuid".into();
        assert!(matches!(
            RandomizerEntity::try_from(document),
            Err(MongoDaoError::Malformed { .. })
        ));
    }
}
