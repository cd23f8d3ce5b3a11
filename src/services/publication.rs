//! Side effects of a publication: one notification and one reward per
//! assigned participant.
//!
//! Failures are logged and counted. They never undo the publication.

use std::time::SystemTime;

use futures::{StreamExt, future::BoxFuture, stream};
use tracing::{info, warn};

use crate::{
    config::MessageTemplates,
    dao::{
        models::{RandomizerEntity, RewardEntity},
        randomizer_store::RewardsLedger,
        storage::StorageResult,
    },
    services::notifier::{NotificationDispatcher, NotifyError},
    state::randomizer::{Assignment, UserId},
};

/// Deliveries in flight at once.
const FAN_OUT_CONCURRENCY: usize = 16;
const REWARD_REASON: &str = "randomizer_participation";

/// Counters reported back to the admin who published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublicationReport {
    /// Participants the dispatcher accepted a message for.
    pub notified: usize,
    /// Messages the dispatcher refused or failed to send.
    pub notification_failures: usize,
    /// Ledger entries written.
    pub rewarded: usize,
    /// Ledger entries that could not be written.
    pub reward_failures: usize,
}

struct Delivery {
    notified: bool,
    rewarded: Option<bool>,
}

/// Notify and reward every participant of `assignments`.
pub async fn fan_out<L>(
    randomizer: &RandomizerEntity,
    assignments: &[Assignment],
    notifier: &dyn NotificationDispatcher,
    ledger: &L,
    templates: &MessageTemplates,
) -> PublicationReport
where
    L: RewardsLedger + ?Sized,
{
    let created_at = SystemTime::now();
    let deliveries: Vec<Delivery> = stream::iter(assignments.iter().copied())
        .map(|assignment| {
            let text = templates.render(&randomizer.title, &assignment.bucket);
            let notification = notifier.notify(assignment.user_id, text);
            let reward = (randomizer.reward_points > 0).then(|| {
                ledger.award(RewardEntity {
                    user_id: assignment.user_id,
                    points: randomizer.reward_points,
                    reason: REWARD_REASON.to_owned(),
                    randomizer_id: randomizer.id,
                    created_at,
                })
            });
            deliver(assignment.user_id, notification, reward)
        })
        .buffer_unordered(FAN_OUT_CONCURRENCY)
        .collect()
        .await;

    let report = deliveries
        .iter()
        .fold(PublicationReport::default(), |mut report, delivery| {
            if delivery.notified {
                report.notified += 1;
            } else {
                report.notification_failures += 1;
            }
            match delivery.rewarded {
                Some(true) => report.rewarded += 1,
                Some(false) => report.reward_failures += 1,
                None => {}
            }
            report
        });

    info!(
        randomizer_id = %randomizer.id,
        notified = report.notified,
        notification_failures = report.notification_failures,
        rewarded = report.rewarded,
        reward_failures = report.reward_failures,
        "publication side effects completed"
    );
    report
}

async fn deliver(
    user_id: UserId,
    notification: BoxFuture<'static, Result<(), NotifyError>>,
    reward: Option<BoxFuture<'static, StorageResult<()>>>,
) -> Delivery {
    let notified = match notification.await {
        Ok(()) => true,
        Err(err) => {
            warn!(user_id, error = %err, "failed to notify participant");
            false
        }
    };

    let rewarded = match reward {
        Some(award) => Some(match award.await {
            Ok(()) => true,
            Err(err) => {
                warn!(user_id, error = %err, "failed to post participation reward");
                false
            }
        }),
        None => None,
    };

    Delivery { notified, rewarded }
}
