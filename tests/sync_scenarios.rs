//! End-to-end scenarios: a full client wired to an in-process transport and
//! an in-memory REST double, driven by wire-shaped event payloads.

use chrono::{TimeZone, Utc};
use deskchat::error::FetchError;
use deskchat::rest::{RestClient, UploadResponse};
use deskchat::transport::{LocalTransport, TransportEvent};
use deskchat::types::account::{AccountRef, AccountSummary};
use deskchat::types::conversation::{Conversation, ConversationStatus};
use deskchat::types::events::{LiveEvent, OutboundEvent};
use deskchat::types::message::Message;
use deskchat::{Client, ClientError, ValidationError};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct FakeRest {
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    accounts: Mutex<HashMap<String, AccountSummary>>,
    fetch_messages_calls: AtomicUsize,
    fetch_account_calls: AtomicUsize,
    /// When set, `fetch_account` blocks until notified.
    account_gate: Option<Arc<Notify>>,
}

#[async_trait::async_trait]
impl RestClient for FakeRest {
    async fn load_conversations(&self, _is_admin: bool) -> Result<Vec<Conversation>, FetchError> {
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>, FetchError> {
        self.fetch_messages_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_account(&self, id: &str) -> Result<Option<AccountSummary>, FetchError> {
        self.fetch_account_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.account_gate {
            gate.notified().await;
        }
        Ok(self.accounts.lock().unwrap().get(id).cloned())
    }

    async fn upload(&self, _bytes: Vec<u8>, filename: &str) -> Result<UploadResponse, FetchError> {
        Ok(UploadResponse {
            success: true,
            url: format!("http://cdn.local/{filename}"),
        })
    }
}

fn seeded_conversation(id: &str, account_id: &str, unread: u32, secs: i64) -> Conversation {
    Conversation {
        id: id.into(),
        account: AccountRef::Id(account_id.into()),
        staff_id: None,
        status: ConversationStatus::Open,
        last_message: "No message".into(),
        unread_count: unread,
        updated_at: Utc.timestamp_opt(secs, 0).unwrap(),
    }
}

struct Harness {
    client: Arc<Client>,
    rest: Arc<FakeRest>,
    inbound: mpsc::Sender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<OutboundEvent>,
}

fn harness(rest: FakeRest) -> Harness {
    init_logs();
    let rest = Arc::new(rest);
    let (transport, outbound) = LocalTransport::new();
    let (inbound, inbound_rx) = mpsc::channel(16);
    let client = Client::new("admin-1", rest.clone(), transport);
    client.run(inbound_rx);
    Harness {
        client,
        rest,
        inbound,
        outbound,
    }
}

impl Harness {
    /// Feed a wire event and wait for the client to finish applying it.
    async fn deliver(&self, name: &str, payload: serde_json::Value) {
        let mut applied = self.client.bus().list_updated.subscribe();
        let event = LiveEvent::from_wire(name, payload).expect("valid wire event");
        self.inbound
            .send(TransportEvent::Live(event))
            .await
            .unwrap();
        applied.recv().await.expect("event applied");
    }

    fn drain_outbound(&mut self) -> Vec<OutboundEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.outbound.try_recv() {
            drained.push(event);
        }
        drained
    }
}

#[tokio::test]
async fn image_message_updates_summary_and_unread() {
    let rest = FakeRest::default();
    rest.conversations
        .lock()
        .unwrap()
        .push(seeded_conversation("c1", "u1", 3, 100));
    let mut h = harness(rest);

    h.client.load_conversations().await.unwrap();
    h.deliver(
        "new_message",
        json!({
            "id": "m1",
            "conversationId": "c1",
            "senderId": "u1",
            "type": "image",
            "imageUrl": "http://cdn.local/pic.png"
        }),
    )
    .await;

    let list = h.client.conversations().await;
    assert_eq!(list[0].last_message, "Image");
    assert_eq!(list[0].unread_count, 4);
    h.drain_outbound();
}

#[tokio::test]
async fn created_conversation_seeds_cache_and_joins_room() {
    let mut h = harness(FakeRest::default());

    h.deliver(
        "conversation_created",
        json!({"id": "c2", "accountId": {"id": "u2", "username": "bob"}}),
    )
    .await;

    assert_eq!(h.client.display_name("u2"), "bob");
    let list = h.client.conversations().await;
    assert_eq!(list[0].id, "c2");
    assert_eq!(list[0].unread_count, 1);
    assert_eq!(list[0].last_message, "New conversation");

    let outbound = h.drain_outbound();
    assert!(outbound.contains(&OutboundEvent::JoinRoom {
        conversation_id: "c2".into()
    }));
}

#[tokio::test]
async fn taken_while_open_updates_header_without_refetch() {
    let rest = FakeRest::default();
    rest.conversations
        .lock()
        .unwrap()
        .push(seeded_conversation("c1", "u1", 0, 100));
    let mut h = harness(rest);

    h.client.load_conversations().await.unwrap();
    h.client.open_conversation("c1").await.unwrap();
    assert_eq!(h.rest.fetch_messages_calls.load(Ordering::SeqCst), 1);

    h.deliver("conversation_taken", json!({"id": "c1", "staffId": "s1"}))
        .await;

    let open = h.client.open_conversation_view().await.unwrap();
    assert_eq!(open.staff_id.as_deref(), Some("s1"));
    assert_eq!(h.rest.fetch_messages_calls.load(Ordering::SeqCst), 1);
    h.drain_outbound();
}

#[tokio::test]
async fn reconnect_rejoins_every_held_room() {
    let rest = FakeRest::default();
    {
        let mut seeded = rest.conversations.lock().unwrap();
        seeded.push(seeded_conversation("c1", "u1", 0, 100));
        seeded.push(seeded_conversation("c2", "u2", 0, 200));
    }
    let mut h = harness(rest);

    h.client.load_conversations().await.unwrap();
    h.drain_outbound();

    let mut applied = h.client.bus().list_updated.subscribe();
    h.inbound.send(TransportEvent::Connected).await.unwrap();
    // Connected emits no list update; deliver an inert event as a barrier.
    h.inbound
        .send(TransportEvent::Live(
            LiveEvent::from_wire("messages_read", json!({"conversationId": "c1"})).unwrap(),
        ))
        .await
        .unwrap();
    applied.recv().await.unwrap();

    assert!(h.client.is_connected());
    let rejoined: Vec<String> = h
        .drain_outbound()
        .into_iter()
        .filter_map(|event| match event {
            OutboundEvent::JoinRoom { conversation_id } => Some(conversation_id),
            _ => None,
        })
        .collect();
    assert_eq!(rejoined, vec!["c2".to_string(), "c1".to_string()]);
}

#[tokio::test]
async fn closing_open_conversation_clears_pointer_and_leaves_room() {
    let rest = FakeRest::default();
    rest.conversations
        .lock()
        .unwrap()
        .push(seeded_conversation("c1", "u1", 0, 100));
    let mut h = harness(rest);

    h.client.load_conversations().await.unwrap();
    h.client.open_conversation("c1").await.unwrap();
    h.drain_outbound();

    h.deliver("conversation_closed", json!({"conversationId": "c1"}))
        .await;

    assert!(h.client.conversations().await.is_empty());
    assert!(h.client.open_conversation_view().await.is_none());
    assert!(h.client.transcript().await.is_empty());
    assert!(h.drain_outbound().contains(&OutboundEvent::LeaveRoom {
        conversation_id: "c1".into()
    }));
}

#[tokio::test]
async fn oversized_message_is_rejected_before_emission() {
    let rest = FakeRest::default();
    rest.conversations
        .lock()
        .unwrap()
        .push(seeded_conversation("c1", "u1", 0, 100));
    let mut h = harness(rest);

    h.client.load_conversations().await.unwrap();
    h.client.open_conversation("c1").await.unwrap();
    h.drain_outbound();

    let oversized = "x".repeat(501);
    let err = h.client.send_text(&oversized).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::MessageTooLong { len: 501, limit: 500 })
    ));
    assert!(h.drain_outbound().is_empty());

    // Exactly at the limit is fine.
    let at_limit = "x".repeat(500);
    h.client.send_text(&at_limit).await.unwrap();
    assert_eq!(h.drain_outbound().len(), 1);
}

#[tokio::test]
async fn sending_without_open_conversation_is_rejected() {
    let h = harness(FakeRest::default());
    let err = h.client.send_text("hello").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::NoOpenConversation)
    ));
}

#[tokio::test]
async fn server_echo_of_sent_message_deduplicates() {
    let rest = FakeRest::default();
    rest.conversations
        .lock()
        .unwrap()
        .push(seeded_conversation("c1", "u1", 0, 100));
    let mut h = harness(rest);

    h.client.load_conversations().await.unwrap();
    h.client.open_conversation("c1").await.unwrap();

    let correlation_id = h.client.send_text("hello there").await.unwrap();
    assert_eq!(h.client.transcript().await.len(), 1);

    h.deliver(
        "new_message",
        json!({
            "id": correlation_id,
            "conversationId": "c1",
            "senderId": "admin-1",
            "type": "text",
            "messageText": "hello there"
        }),
    )
    .await;

    let transcript = h.client.transcript().await;
    assert_eq!(transcript.len(), 1);
    let list = h.client.conversations().await;
    assert_eq!(list[0].unread_count, 0);
    assert_eq!(list[0].last_message, "hello there");
    h.drain_outbound();
}

#[tokio::test]
async fn stale_identity_fetch_after_close_is_dropped() {
    let gate = Arc::new(Notify::new());
    let rest = FakeRest {
        account_gate: Some(gate.clone()),
        ..FakeRest::default()
    };
    rest.conversations
        .lock()
        .unwrap()
        .push(seeded_conversation("c1", "u1", 0, 100));
    rest.accounts.lock().unwrap().insert(
        "u1".into(),
        AccountSummary {
            id: "u1".into(),
            username: Some("alice".into()),
            email: None,
            role: None,
        },
    );
    let mut h = harness(rest);

    // Snapshot schedules a background fetch for the bare u1 id; it parks on
    // the gate while the conversation gets closed underneath it.
    h.client.load_conversations().await.unwrap();
    h.deliver("conversation_closed", json!({"id": "c1"})).await;
    assert!(h.client.conversations().await.is_empty());

    gate.notify_waiters();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // The resolution is cached but must not re-insert the conversation.
    assert!(h.client.conversations().await.is_empty());
    h.drain_outbound();
}

#[tokio::test]
async fn snapshot_refresh_is_idempotent() {
    let rest = FakeRest::default();
    rest.conversations
        .lock()
        .unwrap()
        .push(seeded_conversation("c1", "u1", 2, 100));
    let h = harness(rest);

    h.client.load_conversations().await.unwrap();
    h.client.load_conversations().await.unwrap();

    let list = h.client.conversations().await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].unread_count, 2);
}

#[tokio::test]
async fn upload_returns_served_url() {
    let h = harness(FakeRest::default());
    let url = h
        .client
        .upload_image(vec![1, 2, 3], "shot.png")
        .await
        .unwrap();
    assert_eq!(url, "http://cdn.local/shot.png");
}
