//! WebSocket event source backed by a JSON-RPC event gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedReceiver;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chainevents_core::{
    BlockchainInfo, Category, EventFilter, EventSource, EventStream, Registration, RegistrationId,
    SubscriptionError,
};

use crate::error::WsSourceError;
use crate::rpc::{
    classify, Incoming, JsonRpcRequest, JsonRpcResponse, METHOD_QUERY_INFO, METHOD_SUBSCRIBE,
    METHOD_UNSUBSCRIBE,
};
use crate::subscriptions::SubscriptionManager;
use crate::wire::decode_event;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<JsonRpcResponse, WsSourceError>>;
type Subscribed = Result<(String, UnboundedReceiver<Value>), WsSourceError>;
type PendingMap = Arc<Mutex<HashMap<u64, Pending>>>;

/// A request waiting for its response.
enum Pending {
    Call(Reply),
    /// The route is created by the connection task as soon as the response
    /// is read, so a notification right behind it is not lost.
    Subscribe {
        category: Category,
        tx: oneshot::Sender<Subscribed>,
    },
}

impl Pending {
    fn fail(self, err: WsSourceError) {
        match self {
            Self::Call(tx) => {
                let _ = tx.send(Err(err));
            }
            Self::Subscribe { tx, .. } => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<u64, Pending>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Configuration for the WebSocket event source.
#[derive(Debug, Clone)]
pub struct WsSourceConfig {
    /// How long to wait for the gateway to answer a request.
    pub request_timeout: Duration,
}

impl Default for WsSourceConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Command sent from callers to the background connection task.
enum WsCommand {
    /// Write a request. Its response, if anyone waits for it, is routed
    /// through the pending map.
    Send(JsonRpcRequest),
    Close,
}

/// [`EventSource`] that talks to a Fabric event gateway over WebSocket.
///
/// One background task owns the socket. Requests are matched to responses
/// by ID; `fabric_subscription` notifications are routed to the stream of
/// the registration that asked for them.
pub struct WsEventSource {
    url: String,
    channel: String,
    config: WsSourceConfig,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    subscriptions: SubscriptionManager,
    pending: PendingMap,
    /// Local registration → gateway subscription ID.
    remote_ids: Mutex<HashMap<RegistrationId, String>>,
    next_req_id: Arc<AtomicU64>,
    next_reg_id: AtomicU64,
}

impl WsEventSource {
    /// Connect to the gateway at `url` for `channel` and start the
    /// background task.
    pub async fn connect(
        url: impl Into<String>,
        channel: impl Into<String>,
        config: WsSourceConfig,
    ) -> Result<Self, WsSourceError> {
        let url = url.into();
        tracing::info!(url = %url, "connecting to event gateway");

        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (socket, _) = tokio::time::timeout(config.request_timeout, connect)
            .await
            .map_err(|_| WsSourceError::Connect {
                url: url.clone(),
                reason: format!("timed out after {:?}", config.request_timeout),
            })?
            .map_err(|e| WsSourceError::Connect {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::new();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let next_req_id = Arc::new(AtomicU64::new(1));
        tokio::spawn(ws_task(
            url.clone(),
            socket,
            cmd_rx,
            Arc::clone(&pending),
            subscriptions.clone(),
            Arc::clone(&next_req_id),
        ));

        Ok(Self {
            url,
            channel: channel.into(),
            config,
            cmd_tx,
            subscriptions,
            pending,
            remote_ids: Mutex::new(HashMap::new()),
            next_req_id,
            next_reg_id: AtomicU64::new(1),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Number of gateway subscriptions currently routed to a stream.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        lock(&self.pending).len()
    }

    fn remote_ids(&self) -> MutexGuard<'_, HashMap<RegistrationId, String>> {
        self.remote_ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request(&self, method: &str, params: Vec<Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(self.next_req_id.fetch_add(1, Ordering::Relaxed), method, params)
    }

    /// Register `entry` for `req`, send it and wait for the outcome. The
    /// entry is removed again if the gateway does not answer in time.
    async fn roundtrip<T>(
        &self,
        req: JsonRpcRequest,
        entry: Pending,
        mut rx: oneshot::Receiver<Result<T, WsSourceError>>,
    ) -> Result<T, WsSourceError> {
        let id = req.id;
        lock(&self.pending).insert(id, entry);
        if self.cmd_tx.send(WsCommand::Send(req)).is_err() {
            lock(&self.pending).remove(&id);
            return Err(WsSourceError::Closed);
        }

        match tokio::time::timeout(self.config.request_timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(WsSourceError::Closed),
            Err(_) => {
                if lock(&self.pending).remove(&id).is_some() {
                    return Err(WsSourceError::Timeout {
                        ms: self.config.request_timeout.as_millis() as u64,
                    });
                }
                // The connection task took the entry just before the deadline.
                rx.await.unwrap_or(Err(WsSourceError::Closed))
            }
        }
    }

    /// Send a request and wait for its result.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, WsSourceError> {
        let (tx, rx) = oneshot::channel();
        let resp = self
            .roundtrip(self.request(method, params), Pending::Call(tx), rx)
            .await?;
        resp.into_result().map_err(WsSourceError::Rpc)
    }
}

impl Drop for WsEventSource {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

#[async_trait]
impl EventSource for WsEventSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn register(
        &self,
        filter: &EventFilter,
    ) -> Result<(Registration, EventStream), SubscriptionError> {
        filter.validate()?;
        let category = filter.category();

        let filter_json = serde_json::to_value(filter)
            .map_err(|e| SubscriptionError::Other(e.to_string()))?;
        let req = self.request(
            METHOD_SUBSCRIBE,
            vec![Value::String(self.channel.clone()), filter_json],
        );
        let (tx, rx) = oneshot::channel();
        let (remote, events) = self
            .roundtrip(req, Pending::Subscribe { category, tx }, rx)
            .await
            .map_err(|e| e.into_registration_error(category))?;

        let id = RegistrationId(self.next_reg_id.fetch_add(1, Ordering::Relaxed));
        self.remote_ids().insert(id, remote.clone());
        tracing::debug!(%id, subscription = %remote, %category, "gateway subscription created");

        let stream = events.filter_map(move |value| {
            let event = match decode_event(category, value) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(%category, error = %e, "dropping undecodable event");
                    None
                }
            };
            futures::future::ready(event)
        });

        Ok((Registration::new(id, category), Box::pin(stream)))
    }

    fn unregister(&self, registration: Registration) {
        let Some(remote) = self.remote_ids().remove(&registration.id()) else {
            tracing::debug!(id = %registration.id(), "unregister for unknown registration ignored");
            return;
        };
        self.subscriptions.remove(&remote);

        let req = self.request(METHOD_UNSUBSCRIBE, vec![Value::String(remote.clone())]);
        if self.cmd_tx.send(WsCommand::Send(req)).is_err() {
            tracing::debug!(subscription = %remote, "connection already closed, skipping unsubscribe");
        }
    }

    async fn query_info(&self) -> Result<BlockchainInfo, SubscriptionError> {
        let result = self
            .call(METHOD_QUERY_INFO, vec![Value::String(self.channel.clone())])
            .await
            .map_err(WsSourceError::into_query_error)?;
        serde_json::from_value(result).map_err(|e| SubscriptionError::Query(e.to_string()))
    }
}

// ─── Connection task ──────────────────────────────────────────────────────────

/// Owns the socket until the caller closes it or the gateway goes away.
async fn ws_task(
    url: String,
    socket: Socket,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    pending: PendingMap,
    subscriptions: SubscriptionManager,
    next_req_id: Arc<AtomicU64>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None | Some(WsCommand::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                Some(WsCommand::Send(req)) => {
                    let text = match serde_json::to_string(&req) {
                        Ok(text) => text,
                        Err(e) => {
                            if let Some(entry) = lock(&pending).remove(&req.id) {
                                entry.fail(e.into());
                            }
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            },
            msg = stream.next() => match msg {
                None => break,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "WS receive error");
                    break;
                }
                Some(Ok(Message::Text(text))) => {
                    if let Some(orphan) = handle_message(text.as_str(), &pending, &subscriptions) {
                        let req = JsonRpcRequest::new(
                            next_req_id.fetch_add(1, Ordering::Relaxed),
                            METHOD_UNSUBSCRIBE,
                            vec![Value::String(orphan)],
                        );
                        if let Ok(text) = serde_json::to_string(&req) {
                            if sink.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let waiting: Vec<Pending> = lock(&pending).drain().map(|(_, entry)| entry).collect();
    for entry in waiting {
        entry.fail(WsSourceError::Closed);
    }
    let closed = subscriptions.close_all();
    tracing::warn!(url = %url, closed_streams = closed, "event gateway connection closed");
}

/// Route one frame. Returns a gateway subscription that nobody claimed and
/// should be cancelled.
fn handle_message(
    text: &str,
    pending: &PendingMap,
    subscriptions: &SubscriptionManager,
) -> Option<String> {
    match classify(text) {
        Some(Incoming::Notification(params)) => {
            subscriptions.dispatch(&params.subscription, params.result);
            None
        }
        Some(Incoming::Response(resp)) => {
            let id = resp.id?;
            let entry = lock(pending).remove(&id)?;
            match entry {
                Pending::Call(tx) => {
                    let _ = tx.send(Ok(resp));
                    None
                }
                Pending::Subscribe { category, tx } => {
                    let outcome = match resp.into_result() {
                        Ok(Value::String(remote)) => {
                            let events = subscriptions.register(remote.clone(), category);
                            Ok((remote, events))
                        }
                        Ok(other) => Err(WsSourceError::InvalidResponse(format!(
                            "gateway returned non-string subscription ID: {other}"
                        ))),
                        Err(e) => Err(WsSourceError::Rpc(e)),
                    };
                    match tx.send(outcome) {
                        Err(Ok((remote, _))) => {
                            tracing::debug!(subscription = %remote, "subscribe caller gone, cancelling");
                            subscriptions.remove(&remote);
                            Some(remote)
                        }
                        _ => None,
                    }
                }
            }
        }
        None => {
            tracing::debug!("ignoring unrecognised gateway message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscribe_entry(pending: &PendingMap, id: u64) -> oneshot::Receiver<Subscribed> {
        let (tx, rx) = oneshot::channel();
        lock(pending).insert(
            id,
            Pending::Subscribe {
                category: Category::Block,
                tx,
            },
        );
        rx
    }

    #[test]
    fn subscribe_response_routes_before_next_frame() {
        let pending = PendingMap::default();
        let subscriptions = SubscriptionManager::new();
        let mut rx = subscribe_entry(&pending, 1);

        let resp = r#"{"jsonrpc":"2.0","id":1,"result":"sub-1"}"#;
        let note = r#"{"jsonrpc":"2.0","method":"fabric_subscription",
            "params":{"subscription":"sub-1","result":{"n":1}}}"#;
        assert!(handle_message(resp, &pending, &subscriptions).is_none());
        assert!(handle_message(note, &pending, &subscriptions).is_none());

        let (remote, mut events) = rx.try_recv().unwrap().unwrap();
        assert_eq!(remote, "sub-1");
        assert_eq!(events.try_next().unwrap().unwrap()["n"], 1);
        assert_eq!(lock(&pending).len(), 0);
    }

    #[test]
    fn unclaimed_subscription_is_cancelled() {
        let pending = PendingMap::default();
        let subscriptions = SubscriptionManager::new();
        drop(subscribe_entry(&pending, 3));

        let resp = r#"{"jsonrpc":"2.0","id":3,"result":"sub-9"}"#;
        let orphan = handle_message(resp, &pending, &subscriptions);
        assert_eq!(orphan.as_deref(), Some("sub-9"));
        assert_eq!(subscriptions.len(), 0);
    }

    #[test]
    fn non_string_subscription_id_is_rejected() {
        let pending = PendingMap::default();
        let subscriptions = SubscriptionManager::new();
        let mut rx = subscribe_entry(&pending, 4);

        let resp = r#"{"jsonrpc":"2.0","id":4,"result":17}"#;
        assert!(handle_message(resp, &pending, &subscriptions).is_none());
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(WsSourceError::InvalidResponse(_))
        ));
        assert_eq!(subscriptions.len(), 0);
    }
}
