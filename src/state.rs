use crate::types::account::AccountSummary;
use crate::types::conversation::{Conversation, ConversationPatch, ConversationStatus};
use crate::types::events::{ConversationTaken, LiveEvent};
use crate::types::message::Message;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashSet;

/// Effects the reducer asks the orchestrator to perform. The reducer itself
/// never touches the transport or the network, which keeps every transition
/// synchronous and testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    JoinRoom(String),
    LeaveRoom(String),
    /// Resolve a bare account id through the identity cache in the
    /// background. The completion patches entries in place; it never
    /// re-sorts and never re-inserts a conversation that is gone.
    ResolveIdentity(String),
}

/// In-memory synchronization state: the conversation list, the open
/// conversation pointer, and the open transcript.
///
/// The transport delivers at least once with no global sequence number, so
/// every transition is idempotent and order-tolerant. A malformed or
/// unresolvable event is logged and swallowed; it never panics and never
/// touches unrelated entries.
#[derive(Default)]
pub struct SyncState {
    conversations: Vec<Conversation>,
    /// The conversation the admin currently has open, mirrored out of the
    /// list so the header renders without another lookup. Events always read
    /// this pointer at dispatch time.
    open: Option<Conversation>,
    /// Transcript of the open conversation, in arrival order. Deliberately
    /// not resequenced by `created_at`; see DESIGN.md.
    transcript: Vec<Message>,
    /// Message ids already applied this session. Redelivered `new_message`
    /// events become no-ops, and locally sent messages register their
    /// correlation id here so the server echo de-duplicates.
    seen_message_ids: HashSet<String>,
}

impl SyncState {
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn open(&self) -> Option<&Conversation> {
        self.open.as_ref()
    }

    pub fn open_conversation_id(&self) -> Option<&str> {
        self.open.as_ref().map(|c| c.id.as_str())
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Apply one live event and return the effects to perform.
    pub fn apply(&mut self, event: LiveEvent, now: DateTime<Utc>) -> Vec<Command> {
        match event {
            LiveEvent::NewMessage(message) => self.apply_new_message(message, now),
            LiveEvent::ConversationUpdated(patch) => self.apply_updated(patch, now),
            LiveEvent::ConversationCreated(patch) => self.apply_created(patch, now),
            LiveEvent::ConversationTaken(taken) => self.apply_taken(taken),
            LiveEvent::ConversationClosed(closed) => {
                let mut commands = Vec::new();
                if self.remove_conversation(&closed.id) {
                    commands.push(Command::LeaveRoom(closed.id));
                } else {
                    debug!("close for unknown conversation {}", closed.id);
                }
                commands
            }
            // Unread counts are owned client-side per admin session; nothing
            // to do until cross-client read sync exists.
            LiveEvent::MessagesRead(_) => Vec::new(),
        }
    }

    fn apply_new_message(&mut self, message: Message, now: DateTime<Utc>) -> Vec<Command> {
        if !self.seen_message_ids.insert(message.id.clone()) {
            debug!("duplicate message {}, ignoring", message.id);
            return Vec::new();
        }

        let is_open = self
            .open
            .as_ref()
            .is_some_and(|open| open.id == message.conversation_id);
        let summary = message.summary();
        let sender_id = message.sender_id.clone();
        let conversation_id = message.conversation_id.clone();

        if is_open {
            self.transcript.push(message);
        }

        let Some(entry) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            debug!("message for unknown conversation {conversation_id}");
            return Vec::new();
        };

        entry.last_message = summary.clone();
        entry.updated_at = now;
        entry.unread_count = if is_open { 0 } else { entry.unread_count + 1 };

        if is_open && let Some(open) = self.open.as_mut() {
            open.last_message = summary;
            open.updated_at = now;
            open.unread_count = 0;
        }

        self.sort_conversations();
        vec![Command::ResolveIdentity(sender_id)]
    }

    fn apply_updated(&mut self, patch: ConversationPatch, now: DateTime<Utc>) -> Vec<Command> {
        if patch.status == Some(ConversationStatus::Closed) {
            self.remove_conversation(&patch.id);
            return Vec::new();
        }

        let mut commands = Vec::new();
        if let Some(account) = &patch.account
            && account.as_summary().is_none()
        {
            commands.push(Command::ResolveIdentity(account.id().to_string()));
        }

        if let Some(entry) = self.conversations.iter_mut().find(|c| c.id == patch.id) {
            // Shallow merge: an absent field never overwrites a populated one.
            if let Some(last_message) = patch.last_message {
                entry.last_message = last_message;
            }
            if let Some(staff_id) = patch.staff_id {
                entry.staff_id = Some(staff_id);
            }
            if let Some(updated_at) = patch.updated_at {
                entry.updated_at = updated_at;
            }
            if let Some(status) = patch.status {
                entry.status = status;
            }
            if let Some(unread_count) = patch.unread_count {
                entry.unread_count = unread_count;
            }
            if let Some(account) = &patch.account
                && let Some(summary) = account.as_summary()
            {
                entry.account.enrich(summary);
            }
        } else {
            match self.build_conversation(patch, now, 1, None) {
                Some(conversation) => self.conversations.push(conversation),
                None => return commands,
            }
        }

        self.sort_conversations();
        commands
    }

    fn apply_created(&mut self, patch: ConversationPatch, now: DateTime<Utc>) -> Vec<Command> {
        if patch.status == Some(ConversationStatus::Closed) {
            debug!("created event for already closed conversation {}", patch.id);
            return Vec::new();
        }

        let mut commands = Vec::new();
        if let Some(account) = &patch.account
            && account.as_summary().is_none()
        {
            commands.push(Command::ResolveIdentity(account.id().to_string()));
        }

        let id = patch.id.clone();
        let Some(conversation) =
            self.build_conversation(patch, now, 1, Some("New conversation")) else {
            return commands;
        };

        // Dedup by id: a redelivered create replaces rather than duplicates.
        if let Some(existing) = self.conversations.iter_mut().find(|c| c.id == id) {
            *existing = conversation;
        } else {
            self.conversations.push(conversation);
        }
        self.sort_conversations();

        commands.push(Command::JoinRoom(id));
        commands
    }

    fn apply_taken(&mut self, taken: ConversationTaken) -> Vec<Command> {
        let Some(entry) = self.conversations.iter_mut().find(|c| c.id == taken.id) else {
            debug!("take for unknown conversation {}", taken.id);
            return Vec::new();
        };

        entry.staff_id = Some(taken.staff_id.clone());
        if let Some(summary) = taken.account.as_ref().and_then(|a| a.as_summary()) {
            entry.account.enrich(summary);
        }

        // Mirror onto the open pointer so the header reflects the new
        // assignee without a re-fetch.
        if let Some(open) = self.open.as_mut()
            && open.id == taken.id
        {
            open.staff_id = Some(taken.staff_id);
            if let Some(summary) = taken.account.as_ref().and_then(|a| a.as_summary()) {
                open.account.enrich(summary);
            }
        }
        Vec::new()
    }

    /// Build a full conversation from a patch, for insert paths. Returns
    /// `None` when the payload lacks the account reference a new entry needs.
    fn build_conversation(
        &self,
        patch: ConversationPatch,
        now: DateTime<Utc>,
        default_unread: u32,
        default_last_message: Option<&str>,
    ) -> Option<Conversation> {
        let Some(account) = patch.account else {
            debug!("cannot insert conversation {} without an account", patch.id);
            return None;
        };
        Some(Conversation {
            id: patch.id,
            account,
            staff_id: patch.staff_id,
            status: patch.status.unwrap_or_default(),
            last_message: patch
                .last_message
                .unwrap_or_else(|| {
                    default_last_message
                        .unwrap_or(crate::types::conversation::NO_MESSAGE)
                        .to_string()
                }),
            unread_count: patch.unread_count.unwrap_or(default_unread),
            updated_at: patch.updated_at.unwrap_or(now),
        })
    }

    /// Remove a conversation, clearing the open pointer and transcript if it
    /// was the open one. Returns whether anything was removed.
    fn remove_conversation(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.open_conversation_id() == Some(id) {
            self.open = None;
            self.transcript.clear();
        }
        self.conversations.len() != before
    }

    /// Descending by `updated_at`. `sort_by` is stable, so entries touched in
    /// the same tick keep their relative order instead of flapping.
    fn sort_conversations(&mut self) {
        self.conversations
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }

    /// Replace the list from a REST snapshot. The open pointer survives only
    /// if its conversation is still present.
    pub fn install_snapshot(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        if let Some(open_id) = self.open_conversation_id().map(str::to_string)
            && !self.conversations.iter().any(|c| c.id == open_id)
        {
            self.open = None;
            self.transcript.clear();
        }
    }

    /// Open a conversation: set the pointer, reset its unread count, clear
    /// the previous transcript. Returns the opened entry, or `None` for an
    /// unknown id.
    pub fn open_by_id(&mut self, id: &str) -> Option<Conversation> {
        let entry = self.conversations.iter_mut().find(|c| c.id == id)?;
        entry.unread_count = 0;
        let opened = entry.clone();
        self.open = Some(opened.clone());
        self.transcript.clear();
        Some(opened)
    }

    /// Close the panel. Deliberately no leave-room: the admin stays
    /// subscribed so badge updates keep arriving.
    pub fn clear_open(&mut self) {
        self.open = None;
        self.transcript.clear();
    }

    /// Install a fetched transcript, but only if `conversation_id` is still
    /// the open one; a fetch that resolves after the admin moved on is
    /// dropped. Returns whether it was installed.
    pub fn install_transcript(&mut self, conversation_id: &str, messages: Vec<Message>) -> bool {
        if self.open_conversation_id() != Some(conversation_id) {
            debug!("dropping stale transcript for {conversation_id}");
            return false;
        }
        self.seen_message_ids
            .extend(messages.iter().map(|m| m.id.clone()));
        self.transcript = messages;
        true
    }

    /// Patch every conversation referencing this account with a resolved
    /// summary, including the open pointer. No re-sort; the identity of a
    /// participant does not change recency. Returns whether anything matched
    /// (a resolution for a conversation that is gone is dropped).
    pub fn patch_account(&mut self, summary: &AccountSummary) -> bool {
        let mut patched = false;
        for entry in &mut self.conversations {
            if entry.account_id() == summary.id {
                entry.account.enrich(summary);
                patched = true;
            }
        }
        if let Some(open) = self.open.as_mut()
            && open.account_id() == summary.id
        {
            open.account.enrich(summary);
            patched = true;
        }
        patched
    }
}
