use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, EnumString, Display, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationCategory {
    NewRequest,
    RequestApproved,
    RequestRejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub recipient_id: u64,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: u64,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl NewNotification {
    pub fn into_notification(self, id: u64) -> Notification {
        Notification {
            id,
            recipient_id: self.recipient_id,
            category: self.category,
            title: self.title,
            body: self.body,
            read: false,
            created_at: self.created_at,
        }
    }
}
