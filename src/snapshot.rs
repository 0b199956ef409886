use crate::cache::IdentityCache;
use crate::error::FetchError;
use crate::rest::RestClient;
use crate::types::account::AccountRef;
use crate::types::conversation::{Conversation, ConversationStatus};
use log::debug;
use std::collections::HashSet;

/// A normalized point-in-time conversation list, plus the account ids that
/// still need a background identity fetch.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub conversations: Vec<Conversation>,
    pub unresolved_accounts: Vec<String>,
}

/// Fetch and normalize the authoritative conversation list. Idempotent and
/// safe to call repeatedly (manual refresh). On failure the error propagates
/// and the caller keeps its prior state; no partial list is ever produced.
///
/// Field-level normalization (`last_message`, `unread_count`, `status`
/// fallbacks) happens in the `Conversation` deserializer; this pass filters
/// closed records, seeds the identity cache from inline summaries, and sorts.
pub async fn load(
    rest: &dyn RestClient,
    cache: &IdentityCache,
    is_admin: bool,
) -> Result<Snapshot, FetchError> {
    let raw = rest.load_conversations(is_admin).await?;
    Ok(normalize(raw, cache))
}

fn normalize(raw: Vec<Conversation>, cache: &IdentityCache) -> Snapshot {
    let mut conversations = Vec::with_capacity(raw.len());
    let mut unresolved = Vec::new();
    let mut requested: HashSet<String> = HashSet::new();

    for conversation in raw {
        // Closed conversations never enter the in-memory list.
        if conversation.status == ConversationStatus::Closed {
            debug!("snapshot skipping closed conversation {}", conversation.id);
            continue;
        }

        match &conversation.account {
            AccountRef::Summary(summary) if summary.has_identity() => {
                cache.merge(summary.clone());
            }
            account => {
                let id = account.id().to_string();
                let known = cache
                    .resolve(&id)
                    .is_some_and(|cached| cached.has_identity());
                if !known && requested.insert(id.clone()) {
                    unresolved.push(id);
                }
            }
        }

        conversations.push(conversation);
    }

    // Stable sort: ties keep the server's original order.
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    Snapshot {
        conversations,
        unresolved_accounts: unresolved,
    }
}
