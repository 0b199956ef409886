use crate::types::account::AccountRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown as a conversation's `last_message` when nothing better is known.
pub const NO_MESSAGE: &str = "No message";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Open,
    Pending,
    Closed,
}

/// A support thread between one end-user account and the staff pool.
///
/// Closed conversations never live in the in-memory list; a close event
/// removes the entry instead of updating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(rename = "accountId")]
    pub account: AccountRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<String>,
    #[serde(default)]
    pub status: ConversationStatus,
    #[serde(default = "default_last_message")]
    pub last_message: String,
    #[serde(default)]
    pub unread_count: u32,
    /// Sort key only: the list renders most recently active first.
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn account_id(&self) -> &str {
        self.account.id()
    }
}

/// Partial conversation fields as delivered by `conversation_updated` and
/// `conversation_created` payloads. Absent fields never overwrite populated
/// ones during a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    pub id: String,
    #[serde(default, rename = "accountId")]
    pub account: Option<AccountRef>,
    #[serde(default)]
    pub staff_id: Option<String>,
    #[serde(default)]
    pub status: Option<ConversationStatus>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub unread_count: Option<u32>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_last_message() -> String {
    NO_MESSAGE.to_string()
}

// Records missing a timestamp sort last rather than jumping the list.
fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}
