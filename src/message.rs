use crate::{backend::AckerPtr, error::Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

pub type Attributes = HashMap<String, String>;

/// A message as carried by the Pub/Sub v1 REST API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubsubMessage {
    #[serde(with = "base64_data", default)]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
}

impl PubsubMessage {
    pub fn new(data: impl Into<Vec<u8>>, attributes: Attributes) -> Self {
        Self {
            data: data.into(),
            attributes,
            message_id: None,
            publish_time: None,
        }
    }
}

mod base64_data {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

/// A message delivered by a streaming pull.
///
/// The handler decides what happens to it: `ack` removes it from the
/// subscription, `nack` asks for redelivery, and dropping it without either
/// leaves it to the backend's ack deadline. Either way the flow-control slot it
/// occupies is released.
pub struct ReceivedMessage {
    ack_id: String,
    message: PubsubMessage,
    delivery_attempt: u32,
    acker: AckerPtr,
    _permit: Option<OwnedSemaphorePermit>,
}

impl ReceivedMessage {
    pub(crate) fn new(
        ack_id: impl Into<String>,
        message: PubsubMessage,
        delivery_attempt: u32,
        acker: AckerPtr,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            ack_id: ack_id.into(),
            message,
            delivery_attempt,
            acker,
            _permit: permit,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.message.data
    }

    pub fn attributes(&self) -> &Attributes {
        &self.message.attributes
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message.message_id.as_deref()
    }

    pub fn publish_time(&self) -> Option<&str> {
        self.message.publish_time.as_deref()
    }

    pub fn ack_id(&self) -> &str {
        &self.ack_id
    }

    pub fn delivery_attempt(&self) -> u32 {
        self.delivery_attempt
    }

    pub fn into_message(self) -> PubsubMessage {
        self.message
    }

    pub async fn ack(self) -> Result<()> {
        debug!("Acknowledging {}", self.ack_id);
        self.acker.ack(&self.ack_id).await
    }

    pub async fn nack(self) -> Result<()> {
        debug!("Nacking {}", self.ack_id);
        self.acker.nack(&self.ack_id).await
    }
}

impl fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("ack_id", &self.ack_id)
            .field("message", &self.message)
            .field("delivery_attempt", &self.delivery_attempt)
            .finish()
    }
}
