//! Pub/Sub v1 REST API backend.
//!
//! Endpoints used:
//! - `POST /v1/{topic}:publish`
//! - `POST /v1/{subscription}:pull`
//! - `POST /v1/{subscription}:acknowledge`
//! - `POST /v1/{subscription}:modifyAckDeadline`

use crate::{
    backend::{Acker, AckerPtr, Backend, Session, SessionPtr, StreamingPull},
    config::ClientConfig,
    error::Result,
    flow_control::{FlowControl, FlowGate},
    message::PubsubMessage,
    Error, ReceivedMessage,
};
use reqwest::Client as HttpClient;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest<'a> {
    messages: &'a [PubsubMessage],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<WireReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceivedMessage {
    ack_id: String,
    message: PubsubMessage,
    #[serde(default)]
    delivery_attempt: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: [&'a str; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyAckDeadlineRequest<'a> {
    ack_ids: [&'a str; 1],
    ack_deadline_seconds: u32,
}

pub struct RestBackend {
    config: ClientConfig,
}

impl RestBackend {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Backend for RestBackend {
    async fn connect(&self) -> Result<SessionPtr> {
        if !self.config.has_credentials() {
            return Err(Error::Config(format!(
                "no access token configured for {} (set PUBSUB_ACCESS_TOKEN or PUBSUB_EMULATOR_HOST)",
                self.config.endpoint
            )));
        }

        let http_client = HttpClient::builder()
            .timeout(self.config.request_timeout)
            .build()?;

        debug!("Created HTTP session for {}", self.config.endpoint);

        Ok(Arc::new(RestSession {
            inner: Arc::new(RestInner {
                http_client,
                config: self.config.clone(),
            }),
        }))
    }
}

struct RestInner {
    http_client: HttpClient,
    config: ClientConfig,
}

impl RestInner {
    fn url(&self, resource: &str, method: &str) -> String {
        format!("{}/v1/{}:{}", self.config.endpoint, resource, method)
    }

    async fn post<B, R>(&self, resource: &str, method: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned + Default,
    {
        let mut request = self.http_client.post(self.url(resource, method)).json(body);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::Status { status, body: text });
        }
        if text.trim().is_empty() {
            return Ok(R::default());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

struct RestSession {
    inner: Arc<RestInner>,
}

#[async_trait::async_trait]
impl Session for RestSession {
    async fn publish(&self, topic_path: &str, message: PubsubMessage) -> Result<String> {
        let request = PublishRequest {
            messages: std::slice::from_ref(&message),
        };

        let response: PublishResponse = self.inner.post(topic_path, "publish", &request).await?;

        response
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend(format!("publish to {} returned no message id", topic_path)))
    }

    async fn subscribe(
        &self,
        subscription_path: &str,
        flow_control: Option<FlowControl>,
    ) -> Result<StreamingPull> {
        let (tx, rx) = mpsc::channel(self.inner.config.pull_batch_size.max(1));
        let acker: AckerPtr = Arc::new(RestAcker {
            inner: self.inner.clone(),
            subscription_path: subscription_path.to_string(),
        });

        let task = tokio::spawn(pull_loop(
            self.inner.clone(),
            subscription_path.to_string(),
            FlowGate::new(flow_control),
            acker,
            tx,
        ));

        Ok(StreamingPull::new(rx, task))
    }
}

async fn pull_loop(
    inner: Arc<RestInner>,
    subscription_path: String,
    gate: FlowGate,
    acker: AckerPtr,
    tx: mpsc::Sender<Result<ReceivedMessage>>,
) {
    info!("Streaming pull started on {}", subscription_path);
    let batch_size = inner.config.pull_batch_size.max(1);

    loop {
        let Some(first) = gate.acquire().await else {
            return;
        };

        let mut permits = Vec::new();
        let max_messages = if gate.is_capped() {
            permits.push(first);
            permits.extend(gate.try_acquire_many(batch_size - 1).into_iter().map(Some));
            permits.len()
        } else {
            batch_size
        };

        let request = PullRequest { max_messages };
        let response: PullResponse = match inner.post(&subscription_path, "pull", &request).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Pull on {} failed: {}", subscription_path, e);
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        if response.received_messages.is_empty() {
            drop(permits);
            tokio::time::sleep(inner.config.idle_pause).await;
            continue;
        }

        debug!(
            "Pulled {} message(s) from {}",
            response.received_messages.len(),
            subscription_path
        );

        let mut permits = permits.into_iter();
        for received in response.received_messages {
            let msg = ReceivedMessage::new(
                received.ack_id,
                received.message,
                received.delivery_attempt.unwrap_or(1),
                acker.clone(),
                permits.next().flatten(),
            );

            if tx.send(Ok(msg)).await.is_err() {
                warn!("Streaming pull on {} closed by consumer", subscription_path);
                return;
            }
        }
    }
}

struct RestAcker {
    inner: Arc<RestInner>,
    subscription_path: String,
}

#[async_trait::async_trait]
impl Acker for RestAcker {
    async fn ack(&self, ack_id: &str) -> Result<()> {
        let request = AcknowledgeRequest { ack_ids: [ack_id] };
        let _: serde_json::Value = self
            .inner
            .post(&self.subscription_path, "acknowledge", &request)
            .await?;
        Ok(())
    }

    async fn nack(&self, ack_id: &str) -> Result<()> {
        let request = ModifyAckDeadlineRequest {
            ack_ids: [ack_id],
            ack_deadline_seconds: 0,
        };
        let _: serde_json::Value = self
            .inner
            .post(&self.subscription_path, "modifyAckDeadline", &request)
            .await?;
        Ok(())
    }
}
