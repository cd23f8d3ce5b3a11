//! Participant notification delivery.
//!
//! Publication hands every participant's message to a [`NotificationDispatcher`].
//! The log dispatcher is the default; the Telegram dispatcher calls the Bot API
//! `sendMessage` method when a bot token is configured.

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::info;

use crate::state::randomizer::UserId;

#[cfg(feature = "telegram-notify")]
pub use self::telegram::TelegramDispatcher;

/// Failures raised while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The request never reached the Bot API.
    #[cfg(feature = "telegram-notify")]
    #[error("failed to reach Telegram for user {user_id}")]
    Transport {
        user_id: UserId,
        #[source]
        source: reqwest::Error,
    },
    /// The Bot API answered but refused the message.
    #[error("notification to user {user_id} rejected: {reason}")]
    Rejected { user_id: UserId, reason: String },
}

/// Delivers one text message to one user.
pub trait NotificationDispatcher: Send + Sync {
    fn notify(&self, user_id: UserId, text: String) -> BoxFuture<'static, Result<(), NotifyError>>;
}

/// Dispatcher that only records messages in the application log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn notify(&self, user_id: UserId, text: String) -> BoxFuture<'static, Result<(), NotifyError>> {
        Box::pin(async move {
            info!(user_id, text = %text, "participant notification");
            Ok(())
        })
    }
}

#[cfg(feature = "telegram-notify")]
mod telegram {
    use std::sync::Arc;

    use futures::future::BoxFuture;
    use reqwest::Client;
    use serde::{Deserialize, Serialize};

    use super::{NotificationDispatcher, NotifyError};
    use crate::state::randomizer::UserId;

    /// Dispatcher posting to the Telegram Bot API.
    #[derive(Clone)]
    pub struct TelegramDispatcher {
        client: Client,
        endpoint: Arc<str>,
    }

    #[derive(Serialize)]
    struct SendMessage<'a> {
        chat_id: UserId,
        text: &'a str,
    }

    #[derive(Deserialize)]
    struct BotApiResponse {
        ok: bool,
        #[serde(default)]
        description: Option<String>,
    }

    impl TelegramDispatcher {
        /// Build a dispatcher for `bot_token` against the API rooted at `api_base`.
        pub fn new(api_base: &str, bot_token: &str) -> Result<Self, reqwest::Error> {
            let client = Client::builder().build()?;
            let endpoint = format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                bot_token
            );
            Ok(Self {
                client,
                endpoint: Arc::from(endpoint),
            })
        }

        async fn send(&self, user_id: UserId, text: &str) -> Result<(), NotifyError> {
            let response = self
                .client
                .post(self.endpoint.as_ref())
                .json(&SendMessage {
                    chat_id: user_id,
                    text,
                })
                .send()
                .await
                .map_err(|source| NotifyError::Transport { user_id, source })?;

            let status = response.status();
            let body: BotApiResponse = response
                .json()
                .await
                .map_err(|source| NotifyError::Transport { user_id, source })?;

            if status.is_success() && body.ok {
                Ok(())
            } else {
                Err(NotifyError::Rejected {
                    user_id,
                    reason: body
                        .description
                        .unwrap_or_else(|| format!("status {status}")),
                })
            }
        }
    }

    impl NotificationDispatcher for TelegramDispatcher {
        fn notify(
            &self,
            user_id: UserId,
            text: String,
        ) -> BoxFuture<'static, Result<(), NotifyError>> {
            let dispatcher = self.clone();
            Box::pin(async move { dispatcher.send(user_id, &text).await })
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use futures::future::BoxFuture;

    use super::{NotificationDispatcher, NotifyError};
    use crate::state::randomizer::UserId;

    /// Dispatcher capturing every message, optionally refusing some users.
    #[derive(Clone, Default)]
    pub struct RecordingDispatcher {
        sent: Arc<Mutex<Vec<(UserId, String)>>>,
        refused: Arc<Vec<UserId>>,
        delay: Option<Duration>,
    }

    impl RecordingDispatcher {
        pub fn refusing(users: Vec<UserId>) -> Self {
            Self {
                sent: Arc::default(),
                refused: Arc::new(users),
                delay: None,
            }
        }

        /// Dispatcher taking `delay` per message, like a slow Bot API.
        pub fn delayed(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<(UserId, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl NotificationDispatcher for RecordingDispatcher {
        fn notify(
            &self,
            user_id: UserId,
            text: String,
        ) -> BoxFuture<'static, Result<(), NotifyError>> {
            let dispatcher = self.clone();
            Box::pin(async move {
                if let Some(delay) = dispatcher.delay {
                    tokio::time::sleep(delay).await;
                }
                if dispatcher.refused.contains(&user_id) {
                    return Err(NotifyError::Rejected {
                        user_id,
                        reason: "blocked by user".into(),
                    });
                }
                dispatcher.sent.lock().unwrap().push((user_id, text));
                Ok(())
            })
        }
    }
}
