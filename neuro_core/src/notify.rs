use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotificationError;

/// A user as reached through a specific bot of the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub bot_name: String,
    pub telegram_id: i64,
}

impl Recipient {
    pub fn new(bot_name: impl Into<String>, telegram_id: i64) -> Self {
        Self {
            bot_name: bot_name.into(),
            telegram_id,
        }
    }
}

/// Single inline button attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAction {
    pub label: String,
    pub callback_data: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_user_message(
        &self,
        recipient: &Recipient,
        text: &str,
        action: Option<MessageAction>,
    ) -> Result<(), NotificationError>;
}
