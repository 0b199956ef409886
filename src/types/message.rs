use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Client-side limit on outbound text, enforced before emission.
pub const MAX_TEXT_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Sticker,
    Emoji,
}

impl MessageKind {
    /// Short list-row summary used for a conversation's `last_message`.
    pub fn summary(self, text: Option<&str>) -> String {
        match self {
            MessageKind::Text => text.unwrap_or(super::conversation::NO_MESSAGE).to_string(),
            MessageKind::Image => "Image".to_string(),
            MessageKind::Sticker => "Sticker".to_string(),
            MessageKind::Emoji => "Emoji".to_string(),
        }
    }
}

/// One transcript entry. Transcripts are append-only in arrival order; no
/// edit or delete is modeled, and no resequencing by `created_at` happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned id, or a client correlation id for sent messages.
    /// Events arriving without one get a generated id, which makes them
    /// unique: redelivery of id-less messages cannot be detected.
    #[serde(default = "generate_message_id")]
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn summary(&self) -> String {
        self.kind.summary(self.message_text.as_deref())
    }
}

/// Correlation id for locally produced messages. The optimistic transcript
/// insert registers it so the server echo de-duplicates into a no-op.
pub fn generate_message_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    format!("m-{}", hex::encode(bytes))
}
