//! Postgres change feed over the realtime websocket (Phoenix channels).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt as _, StreamExt as _};
use reqwest::Url;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use crate::backend::{BackendResult, Realtime, Subscription, SubscriptionSink};

use super::SupabaseClient;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const JOIN_REF: &str = "1";

impl SupabaseClient {
    fn realtime_url(&self) -> Url {
        let mut url = self.endpoint(["realtime", "v1", "websocket"]);
        let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
        let _ = url.set_scheme(scheme);
        url.query_pairs_mut()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");
        url
    }
}

fn frame(topic: &str, event: &str, payload: Value, msg_ref: u64) -> WsMessage {
    let frame = json!({
        "topic": topic,
        "event": event,
        "payload": payload,
        "ref": msg_ref.to_string(),
        "join_ref": JOIN_REF,
    });
    WsMessage::Text(frame.to_string().into())
}

fn join_payload(table: &str, access_token: &str) -> Value {
    json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [
                { "event": "INSERT", "schema": "public", "table": table }
            ]
        },
        "access_token": access_token,
    })
}

/// The inserted row carried by a `postgres_changes` frame for `topic`.
pub(super) fn inserted_record(text: &str, topic: &str) -> Option<Value> {
    let mut frame: Value = serde_json::from_str(text).ok()?;
    if frame.get("topic")?.as_str()? != topic {
        return None;
    }

    let event = frame.get("event")?.as_str()?.to_owned();
    match event.as_str() {
        "postgres_changes" => {
            let data = frame.pointer_mut("/payload/data")?;
            if data.get("type")?.as_str()? != "INSERT" {
                return None;
            }
            data.get_mut("record").map(Value::take)
        }
        "phx_reply" => {
            if frame.pointer("/payload/status").and_then(Value::as_str) == Some("error") {
                tracing::warn!(topic, reply = %frame["payload"], "realtime join rejected");
            }
            None
        }
        _ => None,
    }
}

#[async_trait]
impl Realtime for SupabaseClient {
    async fn subscribe_inserts(&self, table: &str) -> BackendResult<Subscription> {
        let token = self.access_token().await?;
        let (socket, _response) = tokio_tungstenite::connect_async(self.realtime_url().as_str()).await?;
        let (mut write, read) = socket.split();

        let topic = format!("realtime:{table}");
        write
            .send(frame(&topic, "phx_join", join_payload(table, &token), 1))
            .await?;
        tracing::debug!(%topic, "joined realtime channel");

        let (sink, subscription) = Subscription::channel();
        tokio::spawn(run_channel(topic, write, read, sink));
        Ok(subscription)
    }
}

async fn run_channel<W, R>(topic: String, mut write: W, mut read: R, sink: SubscriptionSink)
where
    W: futures_util::Sink<WsMessage> + Unpin,
    R: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let SubscriptionSink { rows, mut released } = sink;
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut next_ref = 2u64;

    loop {
        tokio::select! {
            _ = &mut released => {
                let _ = write.send(frame(&topic, "phx_leave", json!({}), next_ref)).await;
                let _ = write.send(WsMessage::Close(None)).await;
                tracing::debug!(%topic, "left realtime channel");
                break;
            }
            _ = heartbeat.tick() => {
                if write.send(frame("phoenix", "heartbeat", json!({}), next_ref)).await.is_err() {
                    tracing::warn!(%topic, "realtime heartbeat failed");
                    break;
                }
                next_ref += 1;
            }
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(row) = inserted_record(text.as_str(), &topic) {
                        if rows.send(row).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    tracing::info!(%topic, "realtime socket closed");
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(%topic, "realtime socket error: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}
