//! Shared application state handed to every handler.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::FromRef;

use crate::auth::SessionManager;
use crate::backend::Services;
use crate::chat::ChatPanel;
use crate::posts::{PostComposer, PostFeed};
use crate::profiles::ProfileEditor;

/// Locks a std mutex, recovering the data if a panicking holder poisoned it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-user view state of the open page: forms, feed and chat.
#[derive(Default)]
pub struct UiState {
    pub composer: tokio::sync::Mutex<PostComposer>,
    pub profile_editor: tokio::sync::Mutex<ProfileEditor>,
    pub feed: Mutex<PostFeed>,
    pub chat: Mutex<Option<Arc<ChatPanel>>>,
}

impl UiState {
    /// Forgets everything tied to the signed-in user. Closing the chat
    /// releases its realtime subscription.
    pub async fn reset(&self) {
        *self.composer.lock().await = PostComposer::default();
        *self.profile_editor.lock().await = ProfileEditor::default();
        *lock(&self.feed) = PostFeed::default();
        let chat = lock(&self.chat).take();
        drop(chat);
    }

    pub fn chat(&self) -> Option<Arc<ChatPanel>> {
        lock(&self.chat).clone()
    }
}

#[derive(Clone, FromRef)]
pub struct AppState {
    pub services: Services,
    pub session: Arc<SessionManager>,
    pub ui: Arc<UiState>,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        let session = SessionManager::new(&services);
        AppState {
            services,
            session,
            ui: Arc::new(UiState::default()),
        }
    }
}
