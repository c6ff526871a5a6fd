//! In-process backend. Every [`MemoryBackend::connect`] handle behaves like a
//! separate browser: its own signed-in user over shared tables, buckets and
//! change feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backend::{
    AuthEvent, AuthService, BackendError, BackendResult, MESSAGES, ObjectStorage, POSTS, Realtime,
    Store, Subscription, SubscriptionSink,
};
use crate::models::{Author, Credentials, Identity, Message, NewMessage, NewPost, Post, PostQuery, Profile, Upload};

const FEED_CAPACITY: usize = 256;
const AUTH_EVENT_CAPACITY: usize = 16;
const MIN_PASSWORD_LEN: usize = 6;
const PUBLIC_URL_BASE: &str = "memory://storage";

struct Account {
    identity: Identity,
    password: String,
}

#[derive(Default)]
struct Tables {
    accounts: Vec<Account>,
    profiles: HashMap<Uuid, Profile>,
    posts: Vec<Post>,
    messages: Vec<Message>,
    objects: HashMap<(String, String), Vec<u8>>,
    next_id: i64,
    last_created: Option<OffsetDateTime>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing creation times, so ordering by them is total.
    fn created_now(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let created = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(created);
        created
    }

    fn author(&self, id: Uuid) -> Option<Author> {
        self.profiles.get(&id).map(|profile| Author {
            username: profile.username.clone(),
            avatar_url: profile.avatar_url.clone(),
        })
    }
}

struct Shared {
    tables: Mutex<Tables>,
    inserts: broadcast::Sender<(&'static str, Value)>,
    live_subscriptions: AtomicUsize,
}

#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                inserts: broadcast::channel(FEED_CAPACITY).0,
                live_subscriptions: AtomicUsize::new(0),
            }),
        }
    }

    /// A client with its own sign-in state.
    pub fn connect(&self) -> Arc<MemoryClient> {
        Arc::new(MemoryClient {
            shared: self.shared.clone(),
            current: RwLock::new(None),
            events: broadcast::channel(AUTH_EVENT_CAPACITY).0,
        })
    }

    /// Realtime subscriptions that have not been released yet.
    pub fn live_subscriptions(&self) -> usize {
        self.shared.live_subscriptions.load(Ordering::SeqCst)
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.tables()
            .ok()?
            .objects
            .get(&(bucket.to_owned(), path.to_owned()))
            .cloned()
    }

    pub fn profile(&self, id: Uuid) -> Option<Profile> {
        self.tables().ok()?.profiles.get(&id).cloned()
    }

    fn tables(&self) -> BackendResult<std::sync::MutexGuard<'_, Tables>> {
        self.shared.tables()
    }
}

impl Shared {
    fn tables(&self) -> BackendResult<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| BackendError::api(500, "memory backend poisoned"))
    }

    fn publish(&self, table: &'static str, row: &impl serde::Serialize) -> BackendResult<()> {
        let row = serde_json::to_value(row)?;
        let _ = self.inserts.send((table, row));
        Ok(())
    }
}

pub struct MemoryClient {
    shared: Arc<Shared>,
    current: RwLock<Option<Identity>>,
    events: broadcast::Sender<AuthEvent>,
}

impl MemoryClient {
    fn set_current(&self, identity: Option<Identity>) {
        if let Ok(mut current) = self.current.write() {
            *current = identity;
        }
    }

    fn signed_in(&self) -> BackendResult<Identity> {
        self.current
            .read()
            .ok()
            .and_then(|current| current.clone())
            .ok_or(BackendError::NotSignedIn)
    }
}

fn validate_credentials(credentials: &Credentials) -> BackendResult<()> {
    let email = credentials.email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(BackendError::api(400, "Unable to validate email address: invalid format"));
    }
    if credentials.password.len() < MIN_PASSWORD_LEN {
        return Err(BackendError::api(422, "Password should be at least 6 characters."));
    }
    Ok(())
}

#[async_trait]
impl AuthService for MemoryClient {
    async fn sign_up(&self, credentials: &Credentials) -> BackendResult<Option<Identity>> {
        validate_credentials(credentials)?;
        let mut tables = self.shared.tables()?;
        let email = credentials.email.trim().to_lowercase();
        if tables
            .accounts
            .iter()
            .any(|account| account.identity.email.as_deref() == Some(email.as_str()))
        {
            return Err(BackendError::api(422, "User already registered"));
        }

        tables.accounts.push(Account {
            identity: Identity {
                id: Uuid::now_v7(),
                email: Some(email),
            },
            password: credentials.password.clone(),
        });
        Ok(None)
    }

    async fn sign_in(&self, credentials: &Credentials) -> BackendResult<Identity> {
        let identity = {
            let tables = self.shared.tables()?;
            let email = credentials.email.trim().to_lowercase();
            tables
                .accounts
                .iter()
                .find(|account| {
                    account.identity.email.as_deref() == Some(email.as_str())
                        && account.password == credentials.password
                })
                .map(|account| account.identity.clone())
                .ok_or_else(|| BackendError::api(400, "Invalid login credentials"))?
        };

        self.set_current(Some(identity.clone()));
        let _ = self.events.send(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        self.set_current(None);
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn current_user(&self) -> BackendResult<Option<Identity>> {
        Ok(self.current.read().ok().and_then(|current| current.clone()))
    }

    async fn refresh_session(&self) -> BackendResult<Option<Identity>> {
        let current = self.current_user().await?;
        if let Some(identity) = &current {
            let _ = self.events.send(AuthEvent::TokenRefreshed(identity.clone()));
        }
        Ok(current)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl Store for MemoryClient {
    async fn fetch_profile(&self, id: Uuid) -> BackendResult<Option<Profile>> {
        Ok(self.shared.tables()?.profiles.get(&id).cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> BackendResult<()> {
        self.signed_in()?;
        self.shared
            .tables()?
            .profiles
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn list_profiles_except(&self, id: Uuid) -> BackendResult<Vec<Profile>> {
        let tables = self.shared.tables()?;
        let mut profiles: Vec<Profile> = tables
            .profiles
            .values()
            .filter(|profile| profile.id != id)
            .cloned()
            .collect();
        profiles.sort_by_key(|profile| profile.id);
        Ok(profiles)
    }

    async fn list_posts(&self, query: &PostQuery) -> BackendResult<Vec<Post>> {
        let tables = self.shared.tables()?;
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|post| query.owner.is_none_or(|owner| post.user_id == owner))
            .map(|post| Post {
                author: tables.author(post.user_id),
                ..post.clone()
            })
            .collect();
        posts.sort_by_key(|post| post.created_at);
        if !query.order.ascending() {
            posts.reverse();
        }
        Ok(posts)
    }

    async fn insert_post(&self, post: &NewPost) -> BackendResult<()> {
        self.signed_in()?;
        let row = {
            let mut tables = self.shared.tables()?;
            let row = Post {
                id: tables.next_id(),
                title: post.title.clone(),
                content: post.content.clone(),
                image_url: post.image_url.clone(),
                created_at: tables.created_now(),
                user_id: post.user_id,
                author: None,
            };
            tables.posts.push(row.clone());
            row
        };
        self.shared.publish(POSTS, &row)
    }

    async fn conversation(&self, a: Uuid, b: Uuid) -> BackendResult<Vec<Message>> {
        let tables = self.shared.tables()?;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|message| message.is_between(a, b))
            .cloned()
            .collect();
        messages.sort_by_key(|message| message.created_at);
        Ok(messages)
    }

    async fn insert_message(&self, message: &NewMessage) -> BackendResult<()> {
        self.signed_in()?;
        let row = {
            let mut tables = self.shared.tables()?;
            let row = Message {
                id: tables.next_id(),
                sender_id: message.sender_id,
                receiver_id: message.receiver_id,
                content: message.content.clone(),
                created_at: tables.created_now(),
            };
            tables.messages.push(row.clone());
            row
        };
        self.shared.publish(MESSAGES, &row)
    }
}

#[async_trait]
impl ObjectStorage for MemoryClient {
    async fn upload(&self, bucket: &str, path: &str, file: &Upload) -> BackendResult<()> {
        self.signed_in()?;
        let mut tables = self.shared.tables()?;
        let key = (bucket.to_owned(), path.to_owned());
        if tables.objects.contains_key(&key) {
            return Err(BackendError::api(409, "The resource already exists"));
        }
        tables.objects.insert(key, file.bytes.clone());
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{PUBLIC_URL_BASE}/{bucket}/{path}")
    }
}

#[async_trait]
impl Realtime for MemoryClient {
    async fn subscribe_inserts(&self, table: &str) -> BackendResult<Subscription> {
        let inserts = self.shared.inserts.subscribe();
        let (sink, subscription) = Subscription::channel();
        self.shared.live_subscriptions.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(forward_inserts(
            self.shared.clone(),
            table.to_owned(),
            inserts,
            sink,
        ));
        Ok(subscription)
    }
}

async fn forward_inserts(
    shared: Arc<Shared>,
    table: String,
    mut inserts: broadcast::Receiver<(&'static str, Value)>,
    sink: SubscriptionSink,
) {
    let SubscriptionSink { rows, mut released } = sink;
    loop {
        tokio::select! {
            _ = &mut released => break,
            insert = inserts.recv() => match insert {
                Ok((inserted_into, row)) if inserted_into == table => {
                    if rows.send(row).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(%table, "change feed lagged, skipped {n} rows");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    shared.live_subscriptions.fetch_sub(1, Ordering::SeqCst);
}
