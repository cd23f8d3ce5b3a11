use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save randomizer `{id}`")]
    SaveRandomizer {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load randomizer `{id}`")]
    LoadRandomizer {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list randomizers")]
    ListRandomizers {
        #[source]
        source: MongoError,
    },
    #[error("failed to update randomizer `{id}`")]
    UpdateRandomizer {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to encode {what} for randomizer `{id}`: {message}")]
    Encode {
        id: Uuid,
        what: &'static str,
        message: String,
    },
    #[error("stored randomizer `{id}` is malformed: {reason}")]
    Malformed { id: String, reason: &'static str },
    #[error("failed to save participant {user_id} of randomizer `{randomizer_id}`")]
    SaveParticipant {
        randomizer_id: Uuid,
        user_id: i64,
        #[source]
        source: MongoError,
    },
    #[error("failed to load participants of randomizer `{randomizer_id}`")]
    LoadParticipants {
        randomizer_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to record reward for user {user_id}")]
    SaveReward {
        user_id: i64,
        #[source]
        source: MongoError,
    },
}
