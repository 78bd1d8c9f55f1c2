use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::error::{PixaiError, Result};
use crate::graphql::{self, GraphqlRequest, GraphqlResponse};
use crate::types::{GenerationTask, PersonalEventEnvelope, PersonalEventsData, TaskStatus};
use crate::websocket::{
    RestartableSocket, SocketFailure, SocketOptions, SubscriptionEvent, SubscriptionHandle,
};
use crate::TaskParameters;

const DEFAULT_API_BASE_URL: &str = "https://api.pixai.art";
const DEFAULT_WEBSOCKET_BASE_URL: &str = "wss://gw.pixai.art";
const USER_AGENT: &str = concat!("pixai-rs/", env!("CARGO_PKG_VERSION"));

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// One item fanned out to personal-event listeners. Failures are carried
/// as cloneable descriptions so every listener sees the same terminal.
#[derive(Debug, Clone)]
enum EventStreamItem {
    Event(PersonalEventEnvelope),
    Failed(SocketFailure),
    Completed,
}

/// A live view of the account's personal-event feed.
///
/// Every attached view sees every envelope from attach time onward; there
/// is no replay for late attachers.
pub struct PersonalEvents {
    rx: broadcast::Receiver<EventStreamItem>,
}

impl PersonalEvents {
    /// Next envelope, a terminal error, or `None` once the feed ends.
    pub async fn next(&mut self) -> Option<Result<PersonalEventEnvelope>> {
        loop {
            match self.rx.recv().await {
                Ok(EventStreamItem::Event(envelope)) => return Some(Ok(envelope)),
                Ok(EventStreamItem::Failed(failure)) => return Some(Err(failure.into())),
                Ok(EventStreamItem::Completed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "pixai_rs::client",
                        "personal event listener lagged, skipped {} events",
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Async client for the PixAI API.
///
/// One client is one session: it owns every subscription channel it opens
/// and tears them all down on [`close`](PixaiClient::close).
///
/// # Example
/// ```no_run
/// use pixai_rs::{PixaiClient, TaskParameters};
///
/// # async fn example() -> pixai_rs::Result<()> {
/// let client = PixaiClient::new("YOUR_API_KEY");
/// let task = client
///     .generate_image(&TaskParameters::new().prompts("a cat").model_id("123"))
///     .await?;
/// println!("done: {}", task.id);
/// # Ok(())
/// # }
/// ```
pub struct PixaiClient {
    http: Client,
    api_key: String,
    api_base_url: String,
    websocket_base_url: String,
    sockets: Mutex<Vec<Arc<RestartableSocket>>>,
    personal_events: Mutex<Option<broadcast::Sender<EventStreamItem>>>,
}

impl PixaiClient {
    /// Create a client authenticated with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            websocket_base_url: DEFAULT_WEBSOCKET_BASE_URL.to_string(),
            sockets: Mutex::new(Vec::new()),
            personal_events: Mutex::new(None),
        }
    }

    /// Point the client at a different HTTP API endpoint.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = normalize(url.into());
        self
    }

    /// Point the client at a different WebSocket endpoint.
    pub fn with_websocket_base_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_base_url = normalize(url.into());
        self
    }

    /// Use a custom `reqwest::Client` (for connection pooling, timeouts, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Returns the configured HTTP API base URL.
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Returns the configured WebSocket base URL.
    pub fn websocket_base_url(&self) -> &str {
        &self.websocket_base_url
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    // ── Typed RPC gateway ───────────────────────────────────────────

    /// Execute a query or mutation document and deserialize its data
    /// payload. Subscription documents must go through the subscription
    /// channel instead.
    pub async fn send<R>(&self, document: &str, variables: Value) -> Result<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let request = GraphqlRequest::new(document, variables);
        if request.is_subscription() {
            return Err(PixaiError::Usage(
                "subscription documents cannot be sent over HTTP; use the event stream".into(),
            ));
        }

        let url = format!("{}/graphql", self.api_base_url);
        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(60))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("User-Agent", USER_AGENT)
            .json(&request)
            .send()
            .await
            .map_err(|e| PixaiError::Network {
                context: format!("Cannot reach PixAI API at {}", self.api_base_url),
                source: e,
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| PixaiError::Network {
            context: "Failed to read PixAI API response".into(),
            source: e,
        })?;

        let parsed: GraphqlResponse =
            serde_json::from_str(&body).map_err(|_| PixaiError::Api {
                message: format!("PixAI API returned a non-GraphQL response (HTTP {})", status),
                errors: Vec::new(),
                status: Some(status),
                body: Some(body.clone()),
            })?;

        let data = parsed.classify(Some(status), Some(&body))?;
        serde_json::from_value(data).map_err(PixaiError::Json)
    }

    // ── Personal event stream ───────────────────────────────────────

    /// Attach to the account's personal-event feed.
    ///
    /// The underlying subscription is created on first access and shared
    /// by every later attacher; it lives until [`close`](PixaiClient::close).
    pub fn personal_events(&self) -> PersonalEvents {
        let mut shared = self.personal_events.lock();
        if let Some(tx) = shared.as_ref() {
            return PersonalEvents { rx: tx.subscribe() };
        }

        let handle = self.open_subscription(GraphqlRequest::new(
            graphql::SUBSCRIBE_PERSONAL_EVENTS,
            Value::Null,
        ));
        let (tx, rx) = broadcast::channel(256);
        tokio::spawn(fan_out(handle, tx.clone()));
        *shared = Some(tx);
        PersonalEvents { rx }
    }

    fn open_subscription(&self, request: GraphqlRequest) -> SubscriptionHandle {
        let options = SocketOptions {
            url: format!("{}/graphql", self.websocket_base_url),
            token: self.api_key.clone(),
        };
        let (socket, handle) = RestartableSocket::connect(options, request);
        self.sockets.lock().push(Arc::new(socket));
        handle
    }

    /// Ask every owned subscription channel to re-establish its socket.
    /// Logical subscriptions survive the reconnect.
    pub fn restart_subscriptions(&self) {
        for socket in self.sockets.lock().iter() {
            socket.restart();
        }
    }

    /// Terminate every owned subscription channel.
    ///
    /// In-flight waits resolve with a terminal failure. The memoized
    /// personal-event subscription is reset and will be recreated on the
    /// next access.
    pub fn close(&self) {
        for socket in self.sockets.lock().drain(..) {
            socket.terminate();
        }
        *self.personal_events.lock() = None;
    }

    // ── Task orchestration ──────────────────────────────────────────

    /// Submit a generation task and wait for it to complete.
    ///
    /// Resolves with the terminal task snapshot once the server reports
    /// `completed`; fails with [`PixaiError::TaskFailed`] if the task ends
    /// `failed` or `cancelled`, and with the stream's failure if the
    /// subscription breaks first.
    pub async fn generate_image(&self, parameters: &TaskParameters) -> Result<GenerationTask> {
        self.generate_image_with_updates(parameters, |_| {}).await
    }

    /// Like [`generate_image`](PixaiClient::generate_image), additionally
    /// invoking `on_update` for every intermediate snapshot of this task,
    /// in the order the server emitted them. The observer is dropped as
    /// soon as the call resolves, successfully or not.
    pub async fn generate_image_with_updates<F>(
        &self,
        parameters: &TaskParameters,
        mut on_update: F,
    ) -> Result<GenerationTask>
    where
        F: FnMut(&GenerationTask),
    {
        let mut params = serde_json::to_value(parameters)?;
        params["priority"] = json!(1000);

        let created: CreateGenerationTaskData = self
            .send(
                graphql::CREATE_GENERATION_TASK,
                json!({ "parameters": params }),
            )
            .await?;
        let task = created
            .task
            .ok_or_else(|| PixaiError::api("Failed to create generation task with unknown error."))?;

        tracing::debug!(target: "pixai_rs::client", "created generation task {}", task.id);

        let mut events = self.personal_events();
        loop {
            match events.next().await {
                Some(Ok(envelope)) => {
                    let Some(update) = envelope.task_updated else {
                        continue;
                    };
                    if update.id != task.id {
                        continue;
                    }
                    on_update(&update);
                    match update.status {
                        TaskStatus::Completed => return Ok(update),
                        TaskStatus::Failed | TaskStatus::Cancelled => {
                            return Err(PixaiError::TaskFailed {
                                id: update.id,
                                status: update.status,
                            })
                        }
                        _ => {}
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(PixaiError::Socket(
                        "personal event stream ended before the task completed".into(),
                    ))
                }
            }
        }
    }
}

/// Pump one subscription into the shared broadcast channel.
async fn fan_out(mut handle: SubscriptionHandle, tx: broadcast::Sender<EventStreamItem>) {
    while let Some(event) = handle.next().await {
        let item = match event {
            SubscriptionEvent::Next(data) => {
                match serde_json::from_value::<PersonalEventsData>(data) {
                    Ok(parsed) => match parsed.personal_events {
                        Some(envelope) => EventStreamItem::Event(envelope),
                        None => continue,
                    },
                    Err(e) => {
                        tracing::warn!(
                            target: "pixai_rs::client",
                            "dropping malformed personal event: {}",
                            e
                        );
                        continue;
                    }
                }
            }
            SubscriptionEvent::Failed(failure) => EventStreamItem::Failed(failure),
            SubscriptionEvent::Completed => EventStreamItem::Completed,
        };
        let terminal = !matches!(item, EventStreamItem::Event(_));
        // Send failures only mean no listener is currently attached.
        let _ = tx.send(item);
        if terminal {
            return;
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateGenerationTaskData {
    #[serde(rename = "createGenerationTask")]
    task: Option<GenerationTask>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_urls() {
        let client = PixaiClient::new("key")
            .with_api_base_url("https://api.example.com/")
            .with_websocket_base_url("wss://gw.example.com///");
        assert_eq!(client.api_base_url(), "https://api.example.com");
        assert_eq!(client.websocket_base_url(), "wss://gw.example.com");
    }

    #[test]
    fn test_default_endpoints() {
        let client = PixaiClient::new("key");
        assert_eq!(client.api_base_url(), "https://api.pixai.art");
        assert_eq!(client.websocket_base_url(), "wss://gw.pixai.art");
    }

    #[test]
    fn test_parse_create_task_response() {
        let data: CreateGenerationTaskData = serde_json::from_value(json!({
            "createGenerationTask": {"id": "t-1", "status": "pending"}
        }))
        .unwrap();
        assert_eq!(data.task.unwrap().id, "t-1");

        let missing: CreateGenerationTaskData =
            serde_json::from_value(json!({ "createGenerationTask": null })).unwrap();
        assert!(missing.task.is_none());
    }

    #[tokio::test]
    async fn test_send_rejects_subscription_documents() {
        let client = PixaiClient::new("key");
        let result: Result<Value> = client
            .send(graphql::SUBSCRIBE_PERSONAL_EVENTS, Value::Null)
            .await;
        assert!(matches!(result, Err(PixaiError::Usage(_))));
    }
}
