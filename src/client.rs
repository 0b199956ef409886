use crate::cache::IdentityCache;
use crate::error::{ClientError, ValidationError};
use crate::rest::RestClient;
use crate::snapshot;
use crate::state::{Command, SyncState};
use crate::transport::{Transport, TransportEvent};
use crate::types::conversation::Conversation;
use crate::types::events::{EventBus, LiveEvent, Notice, OutboundEvent};
use crate::types::message::{MAX_TEXT_LEN, Message, MessageKind, generate_message_id};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};

/// The admin chat client: consumes live transport events, reconciles them
/// into the in-memory state, and exposes the operations the console views
/// call (open, send, take, close, refresh).
///
/// All state lives behind one `Mutex`, so every event reads the open
/// conversation pointer as it is at dispatch time, never a value captured at
/// subscription time.
pub struct Client {
    admin_id: String,
    state: Mutex<SyncState>,
    cache: Arc<IdentityCache>,
    rest: Arc<dyn RestClient>,
    transport: Arc<dyn Transport>,
    bus: EventBus,
    connected: AtomicBool,
}

impl Client {
    pub fn new(
        admin_id: impl Into<String>,
        rest: Arc<dyn RestClient>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            admin_id: admin_id.into(),
            state: Mutex::new(SyncState::default()),
            cache: Arc::new(IdentityCache::new()),
            rest,
            transport,
            bus: EventBus::new(),
            connected: AtomicBool::new(false),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn identity_cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Display name for any account id, resolved synchronously from cache.
    pub fn display_name(&self, account_id: &str) -> String {
        self.cache.display_name(account_id)
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations().to_vec()
    }

    pub async fn open_conversation_view(&self) -> Option<Conversation> {
        self.state.lock().await.open().cloned()
    }

    pub async fn transcript(&self) -> Vec<Message> {
        self.state.lock().await.transcript().to_vec()
    }

    /// Spawn the event pump over the transport's inbound stream. The handle
    /// resolves when the transport closes its channel.
    pub fn run(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let _connected_guard = scopeguard::guard(client.clone(), |client| {
                client.connected.store(false, Ordering::SeqCst);
            });
            while let Some(event) = events.recv().await {
                client.handle_transport_event(event).await;
            }
            debug!("transport event stream ended");
        })
    }

    pub async fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.handle_connected().await,
            TransportEvent::Disconnected => {
                self.connected.store(false, Ordering::SeqCst);
                info!("transport disconnected, waiting for reconnect");
            }
            TransportEvent::Live(live) => self.handle_live_event(live).await,
        }
    }

    /// Room membership does not survive a reconnect, so re-join every
    /// conversation currently held.
    async fn handle_connected(self: &Arc<Self>) {
        self.connected.store(true, Ordering::SeqCst);
        let ids: Vec<String> = {
            let state = self.state.lock().await;
            state
                .conversations()
                .iter()
                .map(|c| c.id.clone())
                .collect()
        };
        info!("transport connected, re-joining {} rooms", ids.len());
        for id in ids {
            self.emit(OutboundEvent::JoinRoom {
                conversation_id: id,
            })
            .await;
        }
    }

    async fn handle_live_event(self: &Arc<Self>, live: LiveEvent) {
        for summary in live.inline_accounts() {
            self.cache.merge(summary.clone());
        }

        let (commands, list, transcript) = {
            let mut state = self.state.lock().await;
            let transcript_len = state.transcript().len();
            let open_before = state.open_conversation_id().map(str::to_string);
            let commands = state.apply(live, Utc::now());
            let transcript = (state.transcript().len() != transcript_len
                || open_before.as_deref() != state.open_conversation_id())
            .then(|| Arc::new(state.transcript().to_vec()));
            (commands, Arc::new(state.conversations().to_vec()), transcript)
        };

        let _ = self.bus.list_updated.send(list);
        if let Some(transcript) = transcript {
            let _ = self.bus.transcript_updated.send(transcript);
        }
        self.perform(commands).await;
    }

    async fn perform(self: &Arc<Self>, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::JoinRoom(conversation_id) => {
                    self.emit(OutboundEvent::JoinRoom { conversation_id }).await;
                }
                Command::LeaveRoom(conversation_id) => {
                    self.emit(OutboundEvent::LeaveRoom { conversation_id })
                        .await;
                }
                Command::ResolveIdentity(account_id) => {
                    let already_known = self
                        .cache
                        .resolve(&account_id)
                        .is_some_and(|cached| cached.has_identity());
                    if !already_known {
                        let client = self.clone();
                        tokio::spawn(async move {
                            client.resolve_identity(account_id).await;
                        });
                    }
                }
            }
        }
    }

    /// Fire-and-forget identity resolution. A result arriving after the
    /// referencing conversation was removed is dropped on the floor.
    async fn resolve_identity(self: Arc<Self>, account_id: String) {
        let Some(summary) = self
            .cache
            .fetch_and_cache(&account_id, self.rest.as_ref())
            .await
        else {
            return;
        };

        let list = {
            let mut state = self.state.lock().await;
            state
                .patch_account(&summary)
                .then(|| Arc::new(state.conversations().to_vec()))
        };
        if let Some(list) = list {
            let _ = self.bus.list_updated.send(list);
        }
    }

    /// Load (or refresh) the conversation list from REST. On failure the
    /// prior list is retained and a notice is surfaced.
    pub async fn load_conversations(self: &Arc<Self>) -> Result<(), ClientError> {
        let snapshot = match snapshot::load(self.rest.as_ref(), &self.cache, true).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("conversation snapshot failed: {e}");
                self.notify("Could not load conversations");
                return Err(e.into());
            }
        };

        let list = {
            let mut state = self.state.lock().await;
            state.install_snapshot(snapshot.conversations);
            Arc::new(state.conversations().to_vec())
        };
        let _ = self.bus.list_updated.send(list);

        for account_id in snapshot.unresolved_accounts {
            let client = self.clone();
            tokio::spawn(async move {
                client.resolve_identity(account_id).await;
            });
        }
        Ok(())
    }

    /// Open a conversation: set the pointer, reset its unread badge, signal
    /// the room, and fetch the transcript. The admin may navigate away
    /// before the transcript resolves; the stale result is then dropped.
    pub async fn open_conversation(self: &Arc<Self>, conversation_id: &str) -> Result<(), ClientError> {
        let opened = {
            let mut state = self.state.lock().await;
            state.open_by_id(conversation_id)
        };
        if opened.is_none() {
            return Err(ClientError::UnknownConversation(conversation_id.to_string()));
        }

        let list = Arc::new(self.state.lock().await.conversations().to_vec());
        let _ = self.bus.list_updated.send(list);

        self.emit(OutboundEvent::JoinRoom {
            conversation_id: conversation_id.to_string(),
        })
        .await;
        self.emit(OutboundEvent::MarkRead {
            conversation_id: conversation_id.to_string(),
            reader_id: self.admin_id.clone(),
        })
        .await;

        match self.rest.fetch_messages(conversation_id).await {
            Ok(messages) => {
                let transcript = {
                    let mut state = self.state.lock().await;
                    state
                        .install_transcript(conversation_id, messages)
                        .then(|| Arc::new(state.transcript().to_vec()))
                };
                if let Some(transcript) = transcript {
                    let _ = self.bus.transcript_updated.send(transcript);
                }
            }
            Err(e) => {
                warn!("transcript fetch for {conversation_id} failed: {e}");
                self.notify("Could not load messages");
            }
        }
        Ok(())
    }

    /// Close the panel. No leave-room: the admin stays subscribed so badge
    /// updates keep arriving for this conversation.
    pub async fn close_panel(&self) {
        let mut state = self.state.lock().await;
        state.clear_open();
    }

    pub async fn send_text(self: &Arc<Self>, text: &str) -> Result<String, ClientError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.notify("Cannot send an empty message");
            return Err(ValidationError::EmptyMessage.into());
        }
        let len = trimmed.chars().count();
        if len > MAX_TEXT_LEN {
            self.notify("Message is too long");
            return Err(ValidationError::MessageTooLong {
                len,
                limit: MAX_TEXT_LEN,
            }
            .into());
        }
        self.send_payload(MessageKind::Text, Some(trimmed.to_string()), None)
            .await
    }

    pub async fn send_image(self: &Arc<Self>, image_url: &str) -> Result<String, ClientError> {
        self.send_payload(MessageKind::Image, None, Some(image_url.to_string()))
            .await
    }

    /// Upload image bytes and return the served URL for `send_image`.
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<String, ClientError> {
        let response = self.rest.upload(bytes, filename).await.map_err(|e| {
            warn!("upload failed: {e}");
            self.notify("Could not upload image");
            e
        })?;
        if !response.success {
            self.notify("Could not upload image");
            return Err(crate::error::FetchError::new(
                "/upload",
                anyhow::anyhow!("server reported failure"),
            )
            .into());
        }
        Ok(response.url)
    }

    /// Build and emit an outbound message for the open conversation. The
    /// message is applied locally first (optimistic append under its
    /// correlation id), so the server echo de-duplicates into a no-op.
    async fn send_payload(
        self: &Arc<Self>,
        kind: MessageKind,
        message_text: Option<String>,
        image_url: Option<String>,
    ) -> Result<String, ClientError> {
        let (message, list, transcript) = {
            let mut state = self.state.lock().await;
            let Some(open_id) = state.open_conversation_id().map(str::to_string) else {
                self.notify("No conversation is open");
                return Err(ValidationError::NoOpenConversation.into());
            };
            let message = Message {
                id: generate_message_id(),
                conversation_id: open_id,
                sender_id: self.admin_id.clone(),
                kind,
                message_text,
                image_url,
                created_at: Utc::now(),
            };
            // Route through the reducer so the optimistic insert and the
            // echo share one code path. Its commands would only re-resolve
            // our own identity, so they are dropped.
            let _ = state.apply(LiveEvent::NewMessage(message.clone()), Utc::now());
            (
                message,
                Arc::new(state.conversations().to_vec()),
                Arc::new(state.transcript().to_vec()),
            )
        };

        let _ = self.bus.list_updated.send(list);
        let _ = self.bus.transcript_updated.send(transcript);

        self.transport
            .emit(OutboundEvent::SendMessage(message.clone()))
            .await?;
        Ok(message.id)
    }

    /// Assign the open conversation (or any conversation) to this admin. The
    /// state change arrives back as `conversation_taken`.
    pub async fn take_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        self.transport
            .emit(OutboundEvent::TakeConversation {
                staff_id: self.admin_id.clone(),
                conversation_id: conversation_id.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Ask the server to close a conversation. Local removal happens when
    /// `conversation_closed` comes back.
    pub async fn close_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        self.transport
            .emit(OutboundEvent::CloseConversation {
                conversation_id: conversation_id.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Emit on the transport, logging failures. Used for signaling events
    /// where losing one is recoverable (the reconnect path re-joins rooms).
    async fn emit(&self, event: OutboundEvent) {
        let name = event.name();
        if let Err(e) = self.transport.emit(event).await {
            warn!("failed to emit '{name}': {e}");
        }
    }

    fn notify(&self, text: impl Into<String>) {
        let _ = self.bus.notice.send(Arc::new(Notice { text: text.into() }));
    }
}
