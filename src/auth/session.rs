//! Who is signed in, and what their profile says.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError, Weak};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{AuthEvent, AuthService, BackendResult, Services, Store};
use crate::models::{Identity, Profile};

/// Profile columns as the header shows them. Empty until a profile is found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFields {
    pub username: String,
    pub avatar_url: String,
    pub setup_complete: bool,
}

impl From<Profile> for ProfileFields {
    fn from(profile: Profile) -> Self {
        ProfileFields {
            username: profile.username.unwrap_or_default(),
            avatar_url: profile.avatar_url.unwrap_or_default(),
            setup_complete: profile.is_modal,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub profile: ProfileFields,
    editor_open: bool,
}

impl SessionState {
    pub fn needs_profile_setup(&self) -> bool {
        self.identity.is_some() && !self.profile.setup_complete
    }

    pub fn show_profile_editor(&self) -> bool {
        self.identity.is_some() && (self.editor_open || self.needs_profile_setup())
    }
}

pub struct SessionManager {
    auth: Arc<dyn AuthService>,
    store: Arc<dyn Store>,
    state: RwLock<SessionState>,
}

impl SessionManager {
    pub fn new(services: &Services) -> Arc<Self> {
        Arc::new(SessionManager {
            auth: services.auth.clone(),
            store: services.store.clone(),
            state: RwLock::new(SessionState::default()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SessionState {
        self.read().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.read().identity.clone()
    }

    /// Picks up a session the backend already holds.
    pub async fn load(&self) -> BackendResult<()> {
        let user = self.auth.current_user().await?;
        self.set_identity(user).await;
        Ok(())
    }

    /// Follows auth events until the manager or the auth service goes away.
    pub fn watch(self: &Arc<Self>) -> JoinHandle<()> {
        let events = self.auth.subscribe();
        tokio::spawn(watch_events(Arc::downgrade(self), events))
    }

    pub async fn handle_event(&self, event: AuthEvent) {
        self.set_identity(event.identity().cloned()).await;
    }

    /// Called by the credential form once a sign-in succeeded.
    pub async fn signed_in(&self, identity: Identity) {
        self.set_identity(Some(identity)).await;
    }

    async fn set_identity(&self, identity: Option<Identity>) {
        let fetch_for = {
            let mut state = self.write();
            let changed = state.identity.as_ref().map(|i| i.id) != identity.as_ref().map(|i| i.id);
            if changed {
                state.profile = ProfileFields::default();
                state.editor_open = false;
            }
            state.identity = identity;
            state.identity.as_ref().map(|identity| identity.id)
        };

        if let Some(id) = fetch_for {
            self.fetch_profile(id).await;
        }
    }

    /// Loads the profile row for `id`. Missing rows and failures are logged
    /// and leave the fields as they were.
    pub async fn fetch_profile(&self, id: Uuid) {
        let profile = match self.store.fetch_profile(id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!(user = %id, "no profile yet");
                return;
            }
            Err(e) => {
                tracing::warn!(user = %id, "failed to fetch profile: {e}");
                return;
            }
        };

        let mut state = self.write();
        if state.identity.as_ref().map(|identity| identity.id) != Some(id) {
            tracing::debug!(user = %id, "dropping profile of a previous identity");
            return;
        }
        state.profile = profile.into();
    }

    pub fn open_profile_editor(&self) {
        self.write().editor_open = true;
    }

    pub fn close_profile_editor(&self) {
        self.write().editor_open = false;
    }

    /// Closes the editor and reloads the freshly saved profile.
    pub async fn profile_saved(&self) {
        let id = {
            let mut state = self.write();
            state.editor_open = false;
            state.identity.as_ref().map(|identity| identity.id)
        };
        if let Some(id) = id {
            self.fetch_profile(id).await;
        }
    }

    /// Clears identity and profile locally even when the backend call fails.
    pub async fn sign_out(&self) -> BackendResult<()> {
        let result = self.auth.sign_out().await;
        if let Err(e) = &result {
            tracing::warn!("sign-out request failed: {e}");
        }
        *self.write() = SessionState::default();
        result
    }
}

async fn watch_events(session: Weak<SessionManager>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("missed {n} auth events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let Some(session) = session.upgrade() else {
            break;
        };
        session.handle_event(event).await;
    }
}
