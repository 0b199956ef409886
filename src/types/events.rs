use crate::types::account::{AccountRef, AccountSummary};
use crate::types::conversation::{Conversation, ConversationPatch};
use crate::types::message::Message;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// `conversation_taken` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTaken {
    #[serde(alias = "conversationId")]
    pub id: String,
    pub staff_id: String,
    #[serde(default, rename = "accountId")]
    pub account: Option<AccountRef>,
}

/// `conversation_closed` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationClosed {
    #[serde(alias = "conversationId")]
    pub id: String,
}

/// `messages_read` payload. Accepted but inert: unread counts are owned
/// client-side per admin session. Reserved for cross-client sync.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRead {
    pub conversation_id: String,
    #[serde(default)]
    pub reader_id: Option<String>,
}

/// The closed set of live events the transport can deliver. Dispatch is an
/// exhaustive match, so a new wire event is a compile-time decision rather
/// than a silently ignored string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    NewMessage(Message),
    ConversationUpdated(ConversationPatch),
    ConversationCreated(ConversationPatch),
    ConversationTaken(ConversationTaken),
    ConversationClosed(ConversationClosed),
    MessagesRead(MessagesRead),
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl LiveEvent {
    /// Decode a named transport event. Unknown names and malformed payloads
    /// are dropped (with a diagnostic) by the pump; they never crash it.
    pub fn from_wire(name: &str, payload: serde_json::Value) -> Result<Self, EventDecodeError> {
        match name {
            "new_message" => Ok(Self::NewMessage(serde_json::from_value(payload)?)),
            "conversation_updated" => {
                Ok(Self::ConversationUpdated(serde_json::from_value(payload)?))
            }
            "conversation_created" => {
                Ok(Self::ConversationCreated(serde_json::from_value(payload)?))
            }
            "conversation_taken" => Ok(Self::ConversationTaken(serde_json::from_value(payload)?)),
            "conversation_closed" => {
                Ok(Self::ConversationClosed(serde_json::from_value(payload)?))
            }
            "messages_read" => Ok(Self::MessagesRead(serde_json::from_value(payload)?)),
            other => Err(EventDecodeError::UnknownEvent(other.to_string())),
        }
    }

    /// Inline account objects rich enough to seed the identity cache.
    pub fn inline_accounts(&self) -> Vec<&AccountSummary> {
        let account = match self {
            LiveEvent::ConversationUpdated(patch) | LiveEvent::ConversationCreated(patch) => {
                patch.account.as_ref()
            }
            LiveEvent::ConversationTaken(taken) => taken.account.as_ref(),
            _ => None,
        };
        account
            .and_then(AccountRef::as_summary)
            .filter(|summary| summary.has_identity())
            .into_iter()
            .collect()
    }
}

/// Events the client emits back over the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinRoom {
        conversation_id: String,
    },
    LeaveRoom {
        conversation_id: String,
    },
    MarkRead {
        conversation_id: String,
        reader_id: String,
    },
    SendMessage(Message),
    TakeConversation {
        staff_id: String,
        conversation_id: String,
    },
    CloseConversation {
        conversation_id: String,
    },
}

impl OutboundEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::JoinRoom { .. } => "join_room",
            OutboundEvent::LeaveRoom { .. } => "leave_room",
            OutboundEvent::MarkRead { .. } => "mark_read",
            OutboundEvent::SendMessage(_) => "send_message",
            OutboundEvent::TakeConversation { .. } => "take_conversation",
            OutboundEvent::CloseConversation { .. } => "close_conversation",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            OutboundEvent::JoinRoom { conversation_id }
            | OutboundEvent::LeaveRoom { conversation_id } => {
                serde_json::Value::String(conversation_id.clone())
            }
            OutboundEvent::MarkRead {
                conversation_id,
                reader_id,
            } => serde_json::json!({
                "conversationId": conversation_id,
                "readerId": reader_id,
            }),
            OutboundEvent::SendMessage(message) => {
                serde_json::to_value(message).unwrap_or_default()
            }
            OutboundEvent::TakeConversation {
                staff_id,
                conversation_id,
            } => serde_json::json!({
                "staffId": staff_id,
                "conversationId": conversation_id,
            }),
            OutboundEvent::CloseConversation { conversation_id } => serde_json::json!({
                "conversationId": conversation_id,
            }),
        }
    }
}

/// User-facing, non-blocking notification (rendered as a toast by the UI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
}

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus exposing one broadcast channel per UI-facing
        /// update, so views subscribe only to what they render.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Conversation list snapshot after any state transition that touched it.
    (list_updated, Arc<Vec<Conversation>>),
    // Full transcript of the open conversation after an append or load.
    (transcript_updated, Arc<Vec<Message>>),
    // Transient errors and local rejections, surfaced without blocking.
    (notice, Arc<Notice>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
