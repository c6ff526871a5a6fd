mod common;

use std::sync::Arc;

use async_trait::async_trait;
use blogweb::backend::memory::{MemoryBackend, MemoryClient};
use blogweb::backend::{AuthEvent, AuthService, BackendError, BackendResult, Services};
use blogweb::models::{Credentials, Identity};
use blogweb::AppState;
use reqwest::{redirect, StatusCode};
use tokio::sync::broadcast;
use uuid::Uuid;

use common::{with_profile, ScriptedGenerator};

/// Memory auth whose sign-out request always fails.
struct UnreachableSignOut(Arc<MemoryClient>);

#[async_trait]
impl AuthService for UnreachableSignOut {
    async fn sign_up(&self, credentials: &Credentials) -> BackendResult<Option<Identity>> {
        self.0.sign_up(credentials).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> BackendResult<Identity> {
        self.0.sign_in(credentials).await
    }

    async fn sign_out(&self) -> BackendResult<()> {
        Err(BackendError::api(503, "auth service unavailable"))
    }

    async fn current_user(&self) -> BackendResult<Option<Identity>> {
        self.0.current_user().await
    }

    async fn refresh_session(&self) -> BackendResult<Option<Identity>> {
        self.0.refresh_session().await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.0.subscribe()
    }
}

async fn serve(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, blogweb::app(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn browser() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap()
}

async fn signed_in_state(client: Arc<MemoryClient>) -> AppState {
    let state = AppState::new(Services::from_backend(client, ScriptedGenerator::failing()));
    state.session.load().await.unwrap();
    state
}

#[tokio::test]
async fn unknown_chat_peer_is_shown_inline() {
    let backend = MemoryBackend::new();
    let (ann, _) = with_profile(&backend, "ann").await;
    let base = serve(signed_in_state(ann).await).await;

    let response = browser()
        .get(format!("{base}/chat/{}", Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains(r#"<div class="error">Unknown user</div>"#));
    assert!(body.contains("Select a user to chat with"));
}

#[tokio::test]
async fn failed_send_returns_the_conversation_with_the_reason() {
    let backend = MemoryBackend::new();
    let (ann, _) = with_profile(&backend, "ann").await;
    let (_bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;
    let base = serve(signed_in_state(ann.clone()).await).await;
    let browser = browser();

    let page = browser.get(format!("{base}/chat/{bob_id}")).send().await.unwrap();
    assert_eq!(page.status(), StatusCode::OK);

    // the backend forgets the session; the local UI still thinks ann is in
    ann.sign_out().await.unwrap();
    let response = browser
        .post(format!("{base}/chat/{bob_id}"))
        .form(&[("content", "hello")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.text().await.unwrap();
    assert!(body.contains(r#"<div class="error">not signed in</div>"#));
    assert!(body.contains("bob"));
}

#[tokio::test]
async fn logout_clears_local_state_when_backend_fails() {
    let backend = MemoryBackend::new();
    let (ann, _) = with_profile(&backend, "ann").await;
    let services = Services {
        auth: Arc::new(UnreachableSignOut(ann.clone())),
        store: ann.clone(),
        storage: ann.clone(),
        realtime: ann,
        generator: ScriptedGenerator::failing(),
    };
    let state = AppState::new(services);
    state.session.load().await.unwrap();
    state.ui.composer.lock().await.title = "draft".into();
    let base = serve(state.clone()).await;

    let response = browser().post(format!("{base}/logout")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], "/login");

    assert!(state.session.identity().is_none());
    assert!(state.ui.composer.lock().await.title.is_empty());
}
