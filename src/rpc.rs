//! Request/response correlation over the bus
//!
//! Turns the fire-and-forget [`Bus`](crate::bus::Bus) into an async RPC
//! mechanism. Each call gets a unique correlation id and an ephemeral
//! one-shot reply topic; concurrent calls to the same topic never cross-wire.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::Bus;

/// Default per-call timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Errors surfaced to RPC callers
#[derive(Debug, Error)]
pub enum RpcError {
    /// No `respond` handler was registered for the topic. Fails fast and
    /// synchronously: this is a wiring bug, not a slow responder.
    #[error("No handler registered for {0}")]
    NoHandler(String),

    /// The handler existed but never replied within the deadline
    #[error("Request timed out")]
    Timeout,

    /// The handler ran and failed; carries the handler's error message
    #[error("{0}")]
    Handler(String),

    /// A payload or reply could not be encoded/decoded
    #[error("Malformed payload: {0}")]
    Payload(String),

    /// The reply channel closed before any reply arrived
    #[error("Bus closed for {0}")]
    BusClosed(String),
}

/// Request envelope published on `rpc:<topic>`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub request_id: String,
    pub reply_topic: String,
    pub payload: Value,
}

/// Reply envelope published on the per-call reply topic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReply {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn request_topic(topic: &str) -> String {
    format!("rpc:{topic}")
}

/// Send a request on a topic and await the correlated reply
///
/// Registration is checked synchronously before anything is published; a
/// missing handler fails immediately rather than via timeout. The one-shot
/// reply subscription is dropped and its topic pruned on every exit path.
pub async fn request(bus: &Bus, topic: &str, payload: Value, timeout: Duration) -> Result<Value, RpcError> {
    let rpc_topic = request_topic(topic);
    if bus.listener_count(&rpc_topic) == 0 {
        debug!(%topic, "request: no handler registered");
        return Err(RpcError::NoHandler(topic.to_string()));
    }

    let request_id = Uuid::now_v7().to_string();
    let reply_topic = format!("{topic}::reply::{request_id}");
    let mut reply_rx = bus.subscribe(&reply_topic);

    debug!(%topic, %request_id, "request: publishing");
    let envelope = RpcRequest {
        request_id: request_id.clone(),
        reply_topic: reply_topic.clone(),
        payload,
    };
    let envelope = serde_json::to_value(&envelope).map_err(|e| RpcError::Payload(e.to_string()))?;
    bus.publish(&rpc_topic, envelope);

    let outcome = tokio::time::timeout(timeout, async {
        loop {
            match reply_rx.recv().await {
                Ok(raw) => break Some(raw),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%reply_topic, skipped, "request: reply channel lagged");
                    continue;
                }
                Err(RecvError::Closed) => break None,
            }
        }
    })
    .await;

    // Whichever path fired, the one-shot subscription goes away here
    drop(reply_rx);
    bus.prune();

    let raw = match outcome {
        Err(_elapsed) => {
            warn!(%topic, %request_id, "request: timed out");
            return Err(RpcError::Timeout);
        }
        Ok(None) => return Err(RpcError::BusClosed(topic.to_string())),
        Ok(Some(raw)) => raw,
    };

    let reply: RpcReply = serde_json::from_value(raw).map_err(|e| RpcError::Payload(e.to_string()))?;
    match reply.error {
        Some(message) => Err(RpcError::Handler(message)),
        None => Ok(reply.data.unwrap_or(Value::Null)),
    }
}

/// Send a request with the default timeout
pub async fn request_with_default_timeout(bus: &Bus, topic: &str, payload: Value) -> Result<Value, RpcError> {
    request(bus, topic, payload, DEFAULT_REQUEST_TIMEOUT).await
}

/// Handle to a registered responder
///
/// Calling [`RespondHandle::detach`] is the only supported teardown; it
/// aborts the responder task, dropping its subscription.
pub struct RespondHandle {
    topic: String,
    task: JoinHandle<()>,
}

impl RespondHandle {
    /// The `rpc:` topic this responder listens on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Unregister the responder
    pub fn detach(self) {
        debug!(topic = %self.topic, "RespondHandle::detach");
        self.task.abort();
    }
}

/// Register a handler for requests on a topic
///
/// For every inbound envelope the handler runs with the request payload and
/// its result (or error message) is published on the envelope's reply topic.
/// A handler fault never takes the responder down.
pub fn respond<F, Fut>(bus: &Arc<Bus>, topic: &str, handler: F) -> RespondHandle
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<Value>> + Send,
{
    let rpc_topic = request_topic(topic);
    // Subscribe before spawning so listener-count lookups see this handler
    // as soon as respond() returns.
    let mut rx = bus.subscribe(&rpc_topic);
    let bus = Arc::clone(bus);
    let topic = topic.to_string();
    debug!(%topic, "respond: handler registered");

    let task_topic = topic.clone();
    let task = tokio::spawn(async move {
        loop {
            let raw = match rx.recv().await {
                Ok(raw) => raw,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %task_topic, skipped, "respond: dropped requests on lagged channel");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let envelope: RpcRequest = match serde_json::from_value(raw) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(topic = %task_topic, error = %e, "respond: dropping malformed request envelope");
                    continue;
                }
            };

            let reply_topic = envelope.reply_topic.clone();
            let reply = match handler(envelope.payload).await {
                Ok(data) => RpcReply {
                    request_id: envelope.request_id,
                    data: Some(data),
                    error: None,
                },
                Err(e) => RpcReply {
                    request_id: envelope.request_id,
                    data: None,
                    error: Some(e.to_string()),
                },
            };

            match serde_json::to_value(&reply) {
                Ok(value) => bus.publish(&reply_topic, value),
                Err(e) => warn!(topic = %task_topic, error = %e, "respond: could not encode reply"),
            }
        }
    });

    RespondHandle { topic: rpc_topic, task }
}
