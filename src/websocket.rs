//! Restartable GraphQL-over-WebSocket subscription channel.
//!
//! Implements the client side of the graphql-transport-ws protocol on top
//! of tokio-tungstenite. Each [`RestartableSocket`] owns one connection
//! carrying one logical subscription; a driver task re-establishes the
//! connection and replays the subscription whenever it closes with the
//! restart code, so the subscriber never observes a torn-down stream.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::graphql::{GraphqlError, GraphqlRequest, GraphqlResponse};

/// Close code sent when the caller asks for a deliberate reconnect.
pub(crate) const RESTART_CLOSE_CODE: u16 = 4205;
/// Close reason accompanying [`RESTART_CLOSE_CODE`].
pub(crate) const RESTART_CLOSE_REASON: &str = "Client Restart";

const SUBPROTOCOL: &str = "graphql-transport-ws";
const SUBSCRIPTION_ID: &str = "1";

/// Connection settings for one subscription channel.
#[derive(Debug, Clone)]
pub(crate) struct SocketOptions {
    /// Full WebSocket URL, e.g. `wss://gw.pixai.art/graphql`.
    pub url: String,
    /// Credential sent in the connection-init payload as `{token}`.
    pub token: String,
}

/// Terminal failure of a subscription, cloneable so it can be fanned out
/// to every attached listener.
#[derive(Debug, Clone)]
pub(crate) enum SocketFailure {
    /// The server delivered a GraphQL-level errors list.
    Api {
        message: String,
        errors: Vec<GraphqlError>,
    },
    /// The socket closed with the given code and reason.
    Closed { code: u16, reason: String },
    /// The socket errored below the protocol level.
    Socket { message: String },
}

impl From<SocketFailure> for crate::PixaiError {
    fn from(failure: SocketFailure) -> Self {
        match failure {
            SocketFailure::Api { message, errors } => crate::PixaiError::Api {
                message,
                errors,
                status: None,
                body: None,
            },
            SocketFailure::Closed { code, reason } => {
                crate::PixaiError::SocketClosed { code, reason }
            }
            SocketFailure::Socket { message } => crate::PixaiError::Socket(message),
        }
    }
}

/// One delivery to a subscriber. `Failed` and `Completed` are terminal.
#[derive(Debug, Clone)]
pub(crate) enum SubscriptionEvent {
    Next(Value),
    Failed(SocketFailure),
    Completed,
}

/// Receiving side of one logical subscription.
pub(crate) struct SubscriptionHandle {
    rx: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

impl SubscriptionHandle {
    /// Next event, or `None` once the channel driver has shut down.
    pub(crate) async fn next(&mut self) -> Option<SubscriptionEvent> {
        self.rx.recv().await
    }
}

/// Restart behavior as an explicit two-mode state machine.
///
/// While the transport is down the controller is `Deferred` and a restart
/// request only latches a flag; once the transport opens it goes `Live`
/// and a request closes the socket with the restart code. A request that
/// arrived while deferred is honored immediately upon open. The latch is
/// a boolean, not a counter: any number of deferred requests collapse
/// into one restart.
enum RestartMode {
    Deferred { requested: bool },
    Live { trigger: mpsc::UnboundedSender<()> },
}

pub(crate) struct RestartController {
    mode: Mutex<RestartMode>,
}

impl RestartController {
    pub(crate) fn new() -> Self {
        Self {
            mode: Mutex::new(RestartMode::Deferred { requested: false }),
        }
    }

    /// Ask for a restart. Never fails; deferred if the socket is not open.
    pub(crate) fn request(&self) {
        let mut mode = self.mode.lock();
        match &*mode {
            RestartMode::Live { trigger } => {
                let _ = trigger.send(());
            }
            RestartMode::Deferred { .. } => {
                *mode = RestartMode::Deferred { requested: true };
            }
        }
    }

    /// The transport opened. Returns true when a restart was requested
    /// while deferred; the pending flag is consumed either way.
    fn opened(&self, trigger: mpsc::UnboundedSender<()>) -> bool {
        let mut mode = self.mode.lock();
        let pending = matches!(&*mode, RestartMode::Deferred { requested: true });
        *mode = RestartMode::Live { trigger };
        pending
    }

    /// The transport closed; go back to deferring requests.
    fn closed(&self) {
        *self.mode.lock() = RestartMode::Deferred { requested: false };
    }
}

/// One logical subscription over a self-reconnecting socket.
pub(crate) struct RestartableSocket {
    restart: Arc<RestartController>,
    terminate: watch::Sender<bool>,
}

impl RestartableSocket {
    /// Spawn the connection driver and return the channel plus the
    /// subscriber half. The connection is established asynchronously;
    /// events begin flowing once the server acknowledges.
    pub(crate) fn connect(
        options: SocketOptions,
        request: GraphqlRequest,
    ) -> (Self, SubscriptionHandle) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let restart = Arc::new(RestartController::new());
        let (terminate_tx, terminate_rx) = watch::channel(false);

        tokio::spawn(drive(
            options,
            request,
            event_tx,
            Arc::clone(&restart),
            terminate_rx,
        ));

        (
            Self {
                restart,
                terminate: terminate_tx,
            },
            SubscriptionHandle { rx: event_rx },
        )
    }

    /// Ask the channel to re-establish its connection. Safe to call at
    /// any point in the connection lifecycle.
    pub(crate) fn restart(&self) {
        self.restart.request();
    }

    /// Tear the connection down. Subscribers receive a terminal failure.
    pub(crate) fn terminate(&self) {
        let _ = self.terminate.send(true);
    }
}

// ── Wire messages ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage<'a> {
    ConnectionInit { payload: Value },
    Subscribe { id: &'a str, payload: &'a GraphqlRequest },
    Pong,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    ConnectionAck,
    Ping,
    Pong,
    Next {
        id: String,
        payload: GraphqlResponse,
    },
    Error {
        id: String,
        payload: Vec<GraphqlError>,
    },
    Complete {
        id: String,
    },
}

fn encode(msg: &ClientMessage<'_>) -> Option<Message> {
    serde_json::to_string(msg).ok().map(Message::Text)
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    }))
}

// ── Connection driver ───────────────────────────────────────────────

/// Why one physical connection ended.
enum ConnOutcome {
    /// The subscriber got a terminal event; nothing left to do.
    Done,
    /// The session was closed.
    Terminated,
    /// The peer closed the connection (code/reason when known).
    Dropped {
        code: Option<u16>,
        reason: Option<String>,
    },
    /// The socket errored mid-stream.
    Errored(String),
}

async fn drive(
    options: SocketOptions,
    request: GraphqlRequest,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
    restart: Arc<RestartController>,
    mut terminate_rx: watch::Receiver<bool>,
) {
    loop {
        let handshake = match options.url.as_str().into_client_request() {
            Ok(mut req) => {
                req.headers_mut()
                    .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));
                req
            }
            Err(e) => {
                let _ = events.send(SubscriptionEvent::Failed(SocketFailure::Socket {
                    message: format!("invalid WebSocket URL {}: {}", options.url, e),
                }));
                return;
            }
        };

        let ws = match tokio_tungstenite::connect_async(handshake).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                let _ = events.send(SubscriptionEvent::Failed(SocketFailure::Socket {
                    message: format!("failed to connect to {}: {}", options.url, e),
                }));
                return;
            }
        };
        let (mut sink, mut stream) = ws.split();

        let (restart_tx, mut restart_rx) = mpsc::unbounded_channel::<()>();
        let mut restart_pending = false;
        if restart.opened(restart_tx) {
            // A restart was requested while the socket was down; honor it
            // now that the transport is open again.
            restart_pending = true;
            let _ = sink
                .send(close_message(RESTART_CLOSE_CODE, RESTART_CLOSE_REASON))
                .await;
        }

        let init = ClientMessage::ConnectionInit {
            payload: json!({ "token": options.token }),
        };
        if let Some(msg) = encode(&init) {
            let _ = sink.send(msg).await;
        }

        let outcome = loop {
            tokio::select! {
                _ = terminate_rx.changed() => {
                    let _ = sink
                        .send(close_message(u16::from(CloseCode::Normal), "session closed"))
                        .await;
                    break ConnOutcome::Terminated;
                }
                Some(()) = restart_rx.recv() => {
                    restart_pending = true;
                    let _ = sink
                        .send(close_message(RESTART_CLOSE_CODE, RESTART_CLOSE_REASON))
                        .await;
                    // Keep reading until the peer acknowledges the close.
                }
                incoming = stream.next() => match incoming {
                    None => break ConnOutcome::Dropped { code: None, reason: None },
                    Some(Err(e)) => break ConnOutcome::Errored(e.to_string()),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => {
                                (Some(u16::from(frame.code)), Some(frame.reason.to_string()))
                            }
                            None => (None, None),
                        };
                        break ConnOutcome::Dropped { code, reason };
                    }
                    Some(Ok(Message::Text(text))) => {
                        match handle_text(&text, &request, &events, &mut sink).await {
                            TextOutcome::Continue => {}
                            TextOutcome::Done => break ConnOutcome::Done,
                        }
                    }
                    Some(Ok(_)) => {}
                },
            }
        };

        restart.closed();

        match outcome {
            ConnOutcome::Done => {
                let _ = sink
                    .send(close_message(u16::from(CloseCode::Normal), ""))
                    .await;
                return;
            }
            ConnOutcome::Terminated => {
                let _ = events.send(SubscriptionEvent::Failed(SocketFailure::Closed {
                    code: u16::from(CloseCode::Normal),
                    reason: "session closed".into(),
                }));
                return;
            }
            ConnOutcome::Dropped { code, reason } => {
                if restart_pending || code == Some(RESTART_CLOSE_CODE) {
                    tracing::debug!(
                        target: "pixai_rs::websocket",
                        "reconnecting after restart of {}",
                        options.url
                    );
                    continue;
                }
                let _ = events.send(SubscriptionEvent::Failed(SocketFailure::Closed {
                    code: code.unwrap_or(1006),
                    reason: reason.unwrap_or_else(|| "connection dropped".into()),
                }));
                return;
            }
            ConnOutcome::Errored(message) => {
                if restart_pending {
                    // The error is fallout from the close we initiated.
                    tracing::debug!(
                        target: "pixai_rs::websocket",
                        "reconnecting after restart of {}",
                        options.url
                    );
                    continue;
                }
                let _ = events.send(SubscriptionEvent::Failed(SocketFailure::Socket {
                    message,
                }));
                return;
            }
        }
    }
}

enum TextOutcome {
    Continue,
    /// The subscriber received a terminal event; close the connection.
    Done,
}

async fn handle_text<S>(
    text: &str,
    request: &GraphqlRequest,
    events: &mpsc::UnboundedSender<SubscriptionEvent>,
    sink: &mut S,
) -> TextOutcome
where
    S: SinkExt<Message> + Unpin,
{
    let msg = match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => msg,
        // Unknown message kinds (e.g. legacy keep-alives) are ignored.
        Err(_) => return TextOutcome::Continue,
    };

    match msg {
        ServerMessage::ConnectionAck => {
            tracing::debug!(target: "pixai_rs::websocket", "connection acknowledged");
            let subscribe = ClientMessage::Subscribe {
                id: SUBSCRIPTION_ID,
                payload: request,
            };
            if let Some(msg) = encode(&subscribe) {
                let _ = sink.send(msg).await;
            }
            TextOutcome::Continue
        }
        ServerMessage::Ping => {
            if let Some(msg) = encode(&ClientMessage::Pong) {
                let _ = sink.send(msg).await;
            }
            TextOutcome::Continue
        }
        ServerMessage::Pong => TextOutcome::Continue,
        ServerMessage::Next { id, payload } if id == SUBSCRIPTION_ID => {
            if !payload.errors.is_empty() {
                let _ = events.send(SubscriptionEvent::Failed(SocketFailure::Api {
                    message: payload.errors[0].message.clone(),
                    errors: payload.errors,
                }));
                return TextOutcome::Done;
            }
            if let Some(data) = payload.data {
                if events.send(SubscriptionEvent::Next(data)).is_err() {
                    // Subscriber went away; tear the connection down.
                    return TextOutcome::Done;
                }
            }
            TextOutcome::Continue
        }
        ServerMessage::Error { id, payload } if id == SUBSCRIPTION_ID => {
            let message = payload
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "subscription failed".into());
            let _ = events.send(SubscriptionEvent::Failed(SocketFailure::Api {
                message,
                errors: payload,
            }));
            TextOutcome::Done
        }
        ServerMessage::Complete { id } if id == SUBSCRIPTION_ID => {
            let _ = events.send(SubscriptionEvent::Completed);
            TextOutcome::Done
        }
        // Messages for other subscription ids are not ours.
        _ => TextOutcome::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_before_open_is_latched_once() {
        let controller = RestartController::new();
        // Two requests while deferred collapse into one pending restart.
        controller.request();
        controller.request();

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(controller.opened(tx));
        assert!(rx.try_recv().is_err(), "opened() reports, never triggers");

        // The flag was consumed: a later reopen sees nothing pending.
        controller.closed();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        assert!(!controller.opened(tx2));
    }

    #[test]
    fn test_restart_while_live_triggers_immediately() {
        let controller = RestartController::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(!controller.opened(tx));

        controller.request();
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_restart_after_close_defers_again() {
        let controller = RestartController::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        controller.opened(tx);
        controller.closed();

        // Socket is down again: the request must latch, not panic.
        controller.request();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        assert!(controller.opened(tx2));
    }

    #[test]
    fn test_client_message_shapes() {
        let init = ClientMessage::ConnectionInit {
            payload: json!({"token": "k"}),
        };
        let value: Value =
            serde_json::from_str(&serde_json::to_string(&init).unwrap()).unwrap();
        assert_eq!(value["type"], "connection_init");
        assert_eq!(value["payload"]["token"], "k");

        let request = GraphqlRequest::new("subscription { personalEvents }", Value::Null);
        let subscribe = ClientMessage::Subscribe {
            id: "1",
            payload: &request,
        };
        let value: Value =
            serde_json::from_str(&serde_json::to_string(&subscribe).unwrap()).unwrap();
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["id"], "1");
        assert_eq!(value["payload"]["query"], "subscription { personalEvents }");
    }

    #[test]
    fn test_server_message_parsing() {
        let next: ServerMessage = serde_json::from_str(
            r#"{"type":"next","id":"1","payload":{"data":{"personalEvents":null}}}"#,
        )
        .unwrap();
        assert!(matches!(next, ServerMessage::Next { id, .. } if id == "1"));

        let complete: ServerMessage =
            serde_json::from_str(r#"{"type":"complete","id":"1"}"#).unwrap();
        assert!(matches!(complete, ServerMessage::Complete { id } if id == "1"));

        let error: ServerMessage = serde_json::from_str(
            r#"{"type":"error","id":"1","payload":[{"message":"denied"}]}"#,
        )
        .unwrap();
        match error {
            ServerMessage::Error { payload, .. } => {
                assert_eq!(payload[0].message, "denied");
            }
            other => panic!("expected error message, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_server_message_is_rejected_by_parser() {
        assert!(serde_json::from_str::<ServerMessage>(r#"{"type":"ka"}"#).is_err());
    }

    #[test]
    fn test_close_message_carries_restart_code() {
        match close_message(RESTART_CLOSE_CODE, RESTART_CLOSE_REASON) {
            Message::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 4205);
                assert_eq!(frame.reason, "Client Restart");
            }
            other => panic!("expected close frame, got {:?}", other),
        }
    }
}
