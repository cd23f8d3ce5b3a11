use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{self, DateTime, doc},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::open_database,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoDistributionDocument, MongoParticipantDocument, MongoRandomizerDocument,
        MongoRewardDocument, doc_id,
    },
};
use crate::dao::{
    models::{DistributionEntity, ParticipantEntity, RandomizerEntity, RewardEntity},
    randomizer_store::{RandomizerStore, RewardsLedger},
    storage::{GuardedWrite, ParticipantInsert, StorageResult},
};
use crate::state::randomizer::{Bucket, RandomizerStatus, UserId};

const RANDOMIZER_COLLECTION_NAME: &str = "randomizers";
const PARTICIPANT_COLLECTION_NAME: &str = "randomizer_participants";
const REWARD_COLLECTION_NAME: &str = "point_transactions";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoRandomizerStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database = open_database(&self.config).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoRandomizerStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = open_database(&config).await?;
        let inner = Arc::new(MongoInner {
            database: RwLock::new(database),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let randomizers = self.randomizers().await;
        let by_assignment = IndexModel::builder()
            .keys(doc! {"assignment_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("randomizer_assignment_idx".to_owned()))
                    .build(),
            )
            .build();
        randomizers
            .create_index(by_assignment)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RANDOMIZER_COLLECTION_NAME,
                index: "assignment_id",
                source,
            })?;

        // One participation per user and randomizer, enforced by the database.
        let participants = self.participants().await;
        let unique_participant = IndexModel::builder()
            .keys(doc! {"randomizer_id": 1, "user_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("participant_unique_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        participants
            .create_index(unique_participant)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PARTICIPANT_COLLECTION_NAME,
                index: "randomizer_id,user_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.database.read().await.clone()
    }

    async fn randomizers(&self) -> Collection<MongoRandomizerDocument> {
        self.database()
            .await
            .collection::<MongoRandomizerDocument>(RANDOMIZER_COLLECTION_NAME)
    }

    async fn participants(&self) -> Collection<MongoParticipantDocument> {
        self.database()
            .await
            .collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION_NAME)
    }

    async fn rewards(&self) -> Collection<MongoRewardDocument> {
        self.database()
            .await
            .collection::<MongoRewardDocument>(REWARD_COLLECTION_NAME)
    }

    async fn insert_randomizer(&self, randomizer: RandomizerEntity) -> MongoResult<()> {
        let id = randomizer.id;
        let document: MongoRandomizerDocument = randomizer.into();
        self.randomizers()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveRandomizer { id, source })?;
        Ok(())
    }

    async fn find_document(&self, id: Uuid) -> MongoResult<Option<MongoRandomizerDocument>> {
        self.randomizers()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadRandomizer { id, source })
    }

    async fn find_randomizer(&self, id: Uuid) -> MongoResult<Option<RandomizerEntity>> {
        self.find_document(id)
            .await?
            .map(RandomizerEntity::try_from)
            .transpose()
    }

    async fn list_randomizers(&self) -> MongoResult<Vec<RandomizerEntity>> {
        let documents: Vec<MongoRandomizerDocument> = self
            .randomizers()
            .await
            .find(doc! {})
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::ListRandomizers { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListRandomizers { source })?;

        documents.into_iter().map(RandomizerEntity::try_from).collect()
    }

    /// Apply `update` to the randomizer matching `filter` (which must include the
    /// id and the status guard). When nothing matched, read the document back to
    /// explain why.
    async fn guarded_update(
        &self,
        id: Uuid,
        expected: RandomizerStatus,
        filter: bson::Document,
        update: impl Into<mongodb::options::UpdateModifications>,
    ) -> MongoResult<GuardedWrite> {
        let result = self
            .randomizers()
            .await
            .update_one(filter, update)
            .await
            .map_err(|source| MongoDaoError::UpdateRandomizer { id, source })?;

        if result.matched_count == 1 {
            return Ok(GuardedWrite::Applied);
        }

        let Some(current) = self.find_document(id).await? else {
            return Ok(GuardedWrite::Missing);
        };
        if current.status() != expected {
            return Ok(GuardedWrite::StatusMismatch(current.status()));
        }
        if !current.has_preview() {
            return Ok(GuardedWrite::NoPreview);
        }
        Ok(GuardedWrite::NoAssignment)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: RandomizerStatus,
        to: RandomizerStatus,
    ) -> MongoResult<GuardedWrite> {
        self.guarded_update(
            id,
            from,
            doc! {"_id": id.to_string(), "status": from.as_str()},
            doc! {"$set": {"status": to.as_str(), "updated_at": DateTime::now()}},
        )
        .await
    }

    async fn replace_preview(
        &self,
        id: Uuid,
        preview: DistributionEntity,
    ) -> MongoResult<GuardedWrite> {
        let preview = bson::serialize_to_bson(&MongoDistributionDocument::from(preview)).map_err(|err| {
            MongoDaoError::Encode {
                id,
                what: "preview",
                message: err.to_string(),
            }
        })?;

        self.guarded_update(
            id,
            RandomizerStatus::Open,
            doc! {"_id": id.to_string(), "status": RandomizerStatus::Open.as_str()},
            doc! {"$set": {"preview": preview, "updated_at": DateTime::now()}},
        )
        .await
    }

    async fn update_preview_assignment(
        &self,
        id: Uuid,
        user_id: UserId,
        bucket: Bucket,
    ) -> MongoResult<GuardedWrite> {
        let bucket = bson::serialize_to_bson(&bucket).map_err(|err| MongoDaoError::Encode {
            id,
            what: "bucket",
            message: err.to_string(),
        })?;

        self.guarded_update(
            id,
            RandomizerStatus::Open,
            doc! {
                "_id": id.to_string(),
                "status": RandomizerStatus::Open.as_str(),
                "preview.assignments.user_id": user_id,
            },
            doc! {"$set": {"preview.assignments.$.bucket": bucket, "updated_at": DateTime::now()}},
        )
        .await
    }

    async fn publish_preview(
        &self,
        id: Uuid,
        distributed_at: SystemTime,
    ) -> MongoResult<GuardedWrite> {
        let distributed_at = DateTime::from_system_time(distributed_at);
        // Pipeline update so the preview is copied server-side in the same write
        // that flips the status.
        let pipeline = vec![doc! {
            "$set": {
                "status": RandomizerStatus::Distributed.as_str(),
                "published": "$preview",
                "distributed_at": distributed_at,
                "updated_at": distributed_at,
            }
        }];

        self.guarded_update(
            id,
            RandomizerStatus::Open,
            doc! {
                "_id": id.to_string(),
                "status": RandomizerStatus::Open.as_str(),
                "preview": {"$type": "object"},
            },
            pipeline,
        )
        .await
    }

    async fn add_participant(
        &self,
        participant: ParticipantEntity,
    ) -> MongoResult<ParticipantInsert> {
        let randomizer_id = participant.randomizer_id;
        let user_id = participant.user_id;
        let document: MongoParticipantDocument = participant.into();

        match self.participants().await.insert_one(&document).await {
            Ok(_) => Ok(ParticipantInsert::Inserted),
            Err(err) if is_duplicate_key(&err) => {
                debug!(%randomizer_id, user_id, "participant already registered");
                Ok(ParticipantInsert::Duplicate)
            }
            Err(source) => Err(MongoDaoError::SaveParticipant {
                randomizer_id,
                user_id,
                source,
            }),
        }
    }

    async fn list_participants(&self, randomizer_id: Uuid) -> MongoResult<Vec<ParticipantEntity>> {
        let documents: Vec<MongoParticipantDocument> = self
            .participants()
            .await
            .find(doc! {"randomizer_id": randomizer_id.to_string()})
            .sort(doc! {"participated_at": 1, "_id": 1})
            .await
            .map_err(|source| MongoDaoError::LoadParticipants {
                randomizer_id,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadParticipants {
                randomizer_id,
                source,
            })?;

        Ok(documents
            .into_iter()
            .map(|document| document.into_entity(randomizer_id))
            .collect())
    }

    async fn count_participants(&self, randomizer_id: Uuid) -> MongoResult<u64> {
        self.participants()
            .await
            .count_documents(doc! {"randomizer_id": randomizer_id.to_string()})
            .await
            .map_err(|source| MongoDaoError::LoadParticipants {
                randomizer_id,
                source,
            })
    }

    async fn award(&self, reward: RewardEntity) -> MongoResult<()> {
        let user_id = reward.user_id;
        let document: MongoRewardDocument = reward.into();
        self.rewards()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveReward { user_id, source })?;
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl RewardsLedger for MongoRandomizerStore {
    fn award(&self, reward: RewardEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.award(reward).await.map_err(Into::into) })
    }
}

impl RandomizerStore for MongoRandomizerStore {
    fn insert_randomizer(
        &self,
        randomizer: RandomizerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_randomizer(randomizer).await.map_err(Into::into) })
    }

    fn find_randomizer(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RandomizerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_randomizer(id).await.map_err(Into::into) })
    }

    fn list_randomizers(&self) -> BoxFuture<'static, StorageResult<Vec<RandomizerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_randomizers().await.map_err(Into::into) })
    }

    fn transition_status(
        &self,
        id: Uuid,
        from: RandomizerStatus,
        to: RandomizerStatus,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .transition_status(id, from, to)
                .await
                .map_err(Into::into)
        })
    }

    fn add_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<ParticipantInsert>> {
        let store = self.clone();
        Box::pin(async move { store.add_participant(participant).await.map_err(Into::into) })
    }

    fn list_participants(
        &self,
        randomizer_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_participants(randomizer_id)
                .await
                .map_err(Into::into)
        })
    }

    fn count_participants(&self, randomizer_id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .count_participants(randomizer_id)
                .await
                .map_err(Into::into)
        })
    }

    fn replace_preview(
        &self,
        id: Uuid,
        preview: DistributionEntity,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>> {
        let store = self.clone();
        Box::pin(async move { store.replace_preview(id, preview).await.map_err(Into::into) })
    }

    fn update_preview_assignment(
        &self,
        id: Uuid,
        user_id: UserId,
        bucket: Bucket,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_preview_assignment(id, user_id, bucket)
                .await
                .map_err(Into::into)
        })
    }

    fn publish_preview(
        &self,
        id: Uuid,
        distributed_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<GuardedWrite>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .publish_preview(id, distributed_at)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
