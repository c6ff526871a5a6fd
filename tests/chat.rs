mod common;

use std::sync::Arc;
use std::time::Duration;

use blogweb::backend::memory::MemoryBackend;
use blogweb::backend::{AuthService, Store};
use blogweb::chat::{ChatEvent, ChatPanel};
use blogweb::models::{Identity, NewMessage};

use common::{eventually, services, with_profile, GatedStore};

fn contents(panel: &ChatPanel) -> Vec<String> {
    panel.view().messages.into_iter().map(|m| m.content).collect()
}

#[tokio::test]
async fn peers_exclude_me() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (_bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;

    let panel = ChatPanel::open(&services(ann), ann_id).await.unwrap();
    let peers: Vec<_> = panel.peers().iter().map(|p| p.id).collect();
    assert_eq!(peers, vec![bob_id]);
    assert!(panel.view().peer.is_none());
}

#[tokio::test]
async fn messages_arrive_once_on_both_sides() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;

    let ann_panel = ChatPanel::open(&services(ann), ann_id).await.unwrap();
    let bob_panel = ChatPanel::open(&services(bob), bob_id).await.unwrap();
    assert!(ann_panel.select_peer(bob_id).await.unwrap());
    assert!(bob_panel.select_peer(ann_id).await.unwrap());

    ann_panel.send("  hello bob ").await.unwrap();
    bob_panel.send("hi ann").await.unwrap();
    ann_panel.send("how are you?").await.unwrap();

    let expected = vec!["hello bob", "hi ann", "how are you?"];
    eventually("ann's view", || contents(&ann_panel) == expected).await;
    eventually("bob's view", || contents(&bob_panel) == expected).await;

    let ids: Vec<i64> = ann_panel.view().messages.iter().map(|m| m.id).collect();
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    // give stray duplicates a chance to show up
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(contents(&ann_panel), expected);
    assert_eq!(contents(&bob_panel), expected);
}

#[tokio::test]
async fn history_loads_on_selection() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (_bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;
    let ann = services(ann);

    let panel = ChatPanel::open(&ann, ann_id).await.unwrap();
    panel.select_peer(bob_id).await.unwrap();
    panel.send("earlier").await.unwrap();
    eventually("sent message", || contents(&panel) == ["earlier"]).await;
    panel.back();
    assert!(panel.view().messages.is_empty());

    panel.select_peer(bob_id).await.unwrap();
    assert_eq!(contents(&panel), ["earlier"]);
}

#[tokio::test]
async fn switching_peer_replaces_history() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;
    let (_cy, Identity { id: cy_id, .. }) = with_profile(&backend, "cy").await;
    let bob = services(bob);

    let panel = ChatPanel::open(&services(ann), ann_id).await.unwrap();
    panel.select_peer(bob_id).await.unwrap();
    panel.send("for bob").await.unwrap();
    eventually("bob's thread", || contents(&panel) == ["for bob"]).await;

    panel.select_peer(cy_id).await.unwrap();
    assert_eq!(panel.view().peer.unwrap().id, cy_id);
    assert!(panel.view().messages.is_empty());

    // bob writing to ann does not leak into the conversation with cy
    let bob_panel = ChatPanel::open(&bob, bob_id).await.unwrap();
    bob_panel.select_peer(ann_id).await.unwrap();
    bob_panel.send("back to ann").await.unwrap();
    eventually("bob's copy", || contents(&bob_panel) == ["for bob", "back to ann"]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(panel.view().messages.is_empty());
}

#[tokio::test]
async fn blank_messages_and_missing_peer_are_ignored() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (_bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;
    let ann = services(ann);

    let panel = ChatPanel::open(&ann, ann_id).await.unwrap();
    panel.send("nobody selected").await.unwrap();
    panel.select_peer(bob_id).await.unwrap();
    panel.send("   ").await.unwrap();

    assert!(ann.store.conversation(ann_id, bob_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn viewers_get_appended_messages() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (_bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;

    let panel = ChatPanel::open(&services(ann), ann_id).await.unwrap();
    let mut events = panel.subscribe();
    panel.select_peer(bob_id).await.unwrap();
    panel.send("ping").await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no chat event")
        .unwrap();
    let ChatEvent::Message { peer_id, message } = event;
    assert_eq!(peer_id, bob_id);
    assert_eq!(message.content, "ping");
    assert_eq!(message.sender_id, ann_id);

    let json = serde_json::to_value(ChatEvent::Message { peer_id, message }).unwrap();
    assert_eq!(json["type"], "message");
    assert_eq!(json["message"]["content"], "ping");
}

#[tokio::test]
async fn subscriptions_are_released() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (_bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;
    let (_cy, Identity { id: cy_id, .. }) = with_profile(&backend, "cy").await;

    let panel = ChatPanel::open(&services(ann), ann_id).await.unwrap();
    panel.select_peer(bob_id).await.unwrap();
    assert_eq!(backend.live_subscriptions(), 1);

    panel.select_peer(cy_id).await.unwrap();
    eventually("one live feed after switching", || backend.live_subscriptions() == 1).await;

    panel.back();
    eventually("release on back", || backend.live_subscriptions() == 0).await;

    panel.select_peer(bob_id).await.unwrap();
    assert_eq!(backend.live_subscriptions(), 1);
    drop(panel);
    eventually("release on drop", || backend.live_subscriptions() == 0).await;
}

#[tokio::test]
async fn superseded_selection_installs_nothing() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (_bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;
    let (_cy, Identity { id: cy_id, .. }) = with_profile(&backend, "cy").await;
    ann.insert_message(&NewMessage {
        sender_id: ann_id,
        receiver_id: bob_id,
        content: "for bob".into(),
    })
    .await
    .unwrap();

    let store = GatedStore::new(ann.clone(), bob_id);
    let panel = Arc::new(ChatPanel::open(&store.services(ann), ann_id).await.unwrap());

    let slow = tokio::spawn({
        let panel = panel.clone();
        async move { panel.select_peer(bob_id).await }
    });
    eventually("bob selected", || panel.selected() == Some(bob_id)).await;
    assert!(panel.view().loading);

    assert!(panel.select_peer(cy_id).await.unwrap());
    store.open();
    assert!(!slow.await.unwrap().unwrap());

    let view = panel.view();
    assert_eq!(view.peer.unwrap().id, cy_id);
    assert!(view.messages.is_empty());
    assert!(!view.loading);
    eventually("only cy's feed is live", || backend.live_subscriptions() == 1).await;
}

#[tokio::test]
async fn unknown_peer_is_reported_on_the_panel() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (_bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;

    let panel = ChatPanel::open(&services(ann), ann_id).await.unwrap();
    panel.select_peer(bob_id).await.unwrap();
    let err = panel.select_peer(ann_id).await.unwrap_err();
    assert_eq!(err.to_string(), "Unknown user");

    let view = panel.view();
    assert!(view.peer.is_none());
    assert_eq!(view.error.as_deref(), Some("Unknown user"));

    panel.select_peer(bob_id).await.unwrap();
    assert_eq!(panel.view().error, None);
}

#[tokio::test]
async fn failed_send_is_reported_on_the_panel() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (_bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;

    let panel = ChatPanel::open(&services(ann.clone()), ann_id).await.unwrap();
    panel.select_peer(bob_id).await.unwrap();
    ann.sign_out().await.unwrap();

    panel.send("hello").await.unwrap_err();
    assert_eq!(panel.view().error.as_deref(), Some("not signed in"));
}

#[tokio::test]
async fn backlog_replays_the_open_conversation() {
    let backend = MemoryBackend::new();
    let (ann, Identity { id: ann_id, .. }) = with_profile(&backend, "ann").await;
    let (_bob, Identity { id: bob_id, .. }) = with_profile(&backend, "bob").await;

    let panel = ChatPanel::open(&services(ann), ann_id).await.unwrap();
    assert!(panel.backlog().is_empty());

    panel.select_peer(bob_id).await.unwrap();
    panel.send("one").await.unwrap();
    panel.send("two").await.unwrap();
    eventually("both messages", || contents(&panel) == ["one", "two"]).await;

    let replayed: Vec<String> = panel
        .backlog()
        .into_iter()
        .map(|ChatEvent::Message { peer_id, message }| {
            assert_eq!(peer_id, bob_id);
            message.content
        })
        .collect();
    assert_eq!(replayed, ["one", "two"]);
}
