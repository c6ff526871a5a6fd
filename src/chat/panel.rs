//! Direct messages with one peer at a time.
//!
//! Selecting a peer subscribes to message inserts before loading the
//! history, so nothing sent in between is missed; rows that show up in both
//! are kept once, by id. The subscription lives inside the task that consumes
//! it and is released whenever that task is aborted: on peer change, on
//! "back" and when the panel is dropped.

use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{Realtime, Services, Store, Subscription, MESSAGES};
use crate::models::{Message, NewMessage, Profile};
use crate::state::lock;
use crate::ClientError;

const EVENT_CAPACITY: usize = 64;

/// Pushed to attached viewers for every message appended to the open
/// conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Message { peer_id: Uuid, message: Message },
}

#[derive(Default)]
struct Conversation {
    selection: u64,
    peer: Option<Profile>,
    messages: Vec<Message>,
    loading: bool,
    error: Option<String>,
    feed: Option<JoinHandle<()>>,
}

impl Conversation {
    /// Starts a new selection, dropping whatever the previous one held.
    fn reset(&mut self, peer: Option<Profile>) -> u64 {
        self.selection += 1;
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
        self.loading = peer.is_some();
        self.error = None;
        self.peer = peer;
        self.messages.clear();
        self.selection
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatView {
    pub peers: Vec<Profile>,
    pub peer: Option<Profile>,
    pub messages: Vec<Message>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct ChatPanel {
    me: Uuid,
    store: Arc<dyn Store>,
    realtime: Arc<dyn Realtime>,
    peers: Vec<Profile>,
    conversation: Arc<Mutex<Conversation>>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatPanel {
    /// Opens the panel for `me`, listing every other profile as a peer.
    pub async fn open(services: &Services, me: Uuid) -> Result<Self, ClientError> {
        let peers = services.store.list_profiles_except(me).await?;
        tracing::debug!(user = %me, peers = peers.len(), "chat opened");
        Ok(ChatPanel {
            me,
            store: services.store.clone(),
            realtime: services.realtime.clone(),
            peers,
            conversation: Arc::new(Mutex::new(Conversation::default())),
            events: broadcast::channel(EVENT_CAPACITY).0,
        })
    }

    pub fn me(&self) -> Uuid {
        self.me
    }

    pub fn peers(&self) -> &[Profile] {
        &self.peers
    }

    pub fn selected(&self) -> Option<Uuid> {
        lock(&self.conversation).peer.as_ref().map(|peer| peer.id)
    }

    /// Switches the conversation to `peer_id`. Returns false when another
    /// selection superseded this one before its history arrived.
    pub async fn select_peer(&self, peer_id: Uuid) -> Result<bool, ClientError> {
        let Some(peer) = self.peers.iter().find(|peer| peer.id == peer_id).cloned() else {
            self.back();
            return Err(self.failed(ClientError::validation("Unknown user")));
        };

        let selection = {
            let mut conversation = lock(&self.conversation);
            conversation.reset(Some(peer))
        };

        let subscription = self.realtime.subscribe_inserts(MESSAGES).await;
        let history = self.store.conversation(self.me, peer_id).await;

        let mut conversation = lock(&self.conversation);
        if conversation.selection != selection {
            tracing::debug!(peer = %peer_id, "peer selection superseded");
            return Ok(false);
        }
        conversation.loading = false;

        let (subscription, history) = match (subscription, history) {
            (Ok(subscription), Ok(history)) => (subscription, history),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(peer = %peer_id, "failed to open conversation: {e}");
                conversation.error = Some(e.to_string());
                return Err(e.into());
            }
        };
        conversation.messages = history;
        conversation.feed = Some(tokio::spawn(consume(
            Arc::downgrade(&self.conversation),
            self.events.clone(),
            self.me,
            peer_id,
            selection,
            subscription,
        )));
        Ok(true)
    }

    /// Back to the peer list. Releases the subscription.
    pub fn back(&self) {
        lock(&self.conversation).reset(None);
    }

    /// Sends to the selected peer. Blank text or no peer does nothing. The
    /// message shows up once the insert comes back through the feed.
    pub async fn send(&self, content: &str) -> Result<(), ClientError> {
        let content = content.trim();
        let Some(peer_id) = self.selected() else {
            return Ok(());
        };
        if content.is_empty() {
            return Ok(());
        }

        let sent = self
            .store
            .insert_message(&NewMessage {
                sender_id: self.me,
                receiver_id: peer_id,
                content: content.to_owned(),
            })
            .await;
        match sent {
            Ok(()) => {
                lock(&self.conversation).error = None;
                Ok(())
            }
            Err(e) => Err(self.failed(e.into())),
        }
    }

    /// Records `error` for the next render and hands it back.
    fn failed(&self, error: ClientError) -> ClientError {
        lock(&self.conversation).error = Some(error.to_string());
        error
    }

    /// Messages already on screen for the open conversation, as the events a
    /// viewer attaching now would have missed.
    pub fn backlog(&self) -> Vec<ChatEvent> {
        let conversation = lock(&self.conversation);
        let Some(peer) = &conversation.peer else {
            return Vec::new();
        };
        conversation
            .messages
            .iter()
            .map(|message| ChatEvent::Message {
                peer_id: peer.id,
                message: message.clone(),
            })
            .collect()
    }

    pub fn view(&self) -> ChatView {
        let conversation = lock(&self.conversation);
        ChatView {
            peers: self.peers.clone(),
            peer: conversation.peer.clone(),
            messages: conversation.messages.clone(),
            loading: conversation.loading,
            error: conversation.error.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }
}

impl Drop for ChatPanel {
    fn drop(&mut self) {
        if let Some(feed) = lock(&self.conversation).feed.take() {
            feed.abort();
        }
    }
}

async fn consume(
    conversation: Weak<Mutex<Conversation>>,
    events: broadcast::Sender<ChatEvent>,
    me: Uuid,
    peer_id: Uuid,
    selection: u64,
    mut subscription: Subscription,
) {
    while let Some(row) = subscription.next().await {
        let message: Message = match serde_json::from_value(row) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("skipping malformed message row: {e}");
                continue;
            }
        };
        if !message.is_between(me, peer_id) {
            continue;
        }

        let Some(current) = conversation.upgrade() else {
            break;
        };
        let appended = {
            let mut conversation = lock(&current);
            if conversation.selection != selection {
                break;
            }
            if conversation.messages.iter().any(|known| known.id == message.id) {
                false
            } else {
                conversation.messages.push(message.clone());
                true
            }
        };

        if appended {
            let _ = events.send(ChatEvent::Message { peer_id, message });
        }
    }
    tracing::debug!(peer = %peer_id, "message feed ended");
}
