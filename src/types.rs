use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Visitor,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Active,
    Sent,
    Read,
}

impl DeliveryStatus {
    pub fn label(self) -> &'static str {
        match self {
            DeliveryStatus::Active => "Active",
            DeliveryStatus::Sent => "Sent",
            DeliveryStatus::Read => "Read",
        }
    }
}

/// One chat turn as the inbox server speaks it. The text travels under the
/// wire name `message`; visitor messages always carry a delivery status,
/// admin messages never do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    #[serde(rename = "message")]
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Message {
    /// A visitor turn at the moment of optimistic append: `active` until the
    /// server acknowledges it, carrying a freshly minted client id.
    pub fn visitor(text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            sender: Sender::Visitor,
            text: text.into(),
            timestamp: now,
            status: Some(DeliveryStatus::Active),
            id: Some(opaque_token("msg", now)),
        }
    }

    /// A locally synthesized admin-styled line (greeting, upload errors).
    /// Carries neither status nor id, so reconciliation treats it as
    /// display-only.
    pub fn admin_notice(text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            sender: Sender::Admin,
            text: text.into(),
            timestamp: now,
            status: None,
            id: None,
        }
    }
}

/// `<prefix>_<unix millis>_<9 random chars>` — unique in practice, not by
/// construction.
pub fn opaque_token(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("{prefix}_{}_{suffix}", now.timestamp_millis())
}
