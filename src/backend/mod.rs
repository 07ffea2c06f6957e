//! Backend abstractions.
//!
//! The façades never talk to the network themselves. A [`Backend`] creates a
//! [`Session`], and the session owns everything the managed service is
//! responsible for: publishing, streaming delivery, flow control and
//! acknowledgment.
//!
//! Concrete implementations live in [`rest`] (Pub/Sub v1 REST API) and
//! [`memory`] (in-process broker).

pub mod memory;
pub mod rest;

use crate::{error::Result, flow_control::FlowControl, message::PubsubMessage, ReceivedMessage};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};

pub use memory::MemoryBackend;
pub use rest::RestBackend;

pub type BackendPtr = Arc<dyn Backend>;
pub type SessionPtr = Arc<dyn Session>;
pub type AckerPtr = Arc<dyn Acker>;

#[async_trait::async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn connect(&self) -> Result<SessionPtr>;
}

#[async_trait::async_trait]
pub trait Session: Send + Sync + 'static {
    /// Resolves once the backend has accepted the message and returns its id.
    async fn publish(&self, topic_path: &str, message: PubsubMessage) -> Result<String>;

    async fn subscribe(
        &self,
        subscription_path: &str,
        flow_control: Option<FlowControl>,
    ) -> Result<StreamingPull>;
}

#[async_trait::async_trait]
pub trait Acker: Send + Sync + 'static {
    async fn ack(&self, ack_id: &str) -> Result<()>;
    async fn nack(&self, ack_id: &str) -> Result<()>;
}

/// A running delivery session.
///
/// Items are produced by a backend task. An `Err` item is terminal: the
/// producer stops after sending it. Dropping the handle cancels the producer.
pub struct StreamingPull {
    inbox: mpsc::Receiver<Result<ReceivedMessage>>,
    task: JoinHandle<()>,
}

impl StreamingPull {
    pub(crate) fn new(inbox: mpsc::Receiver<Result<ReceivedMessage>>, task: JoinHandle<()>) -> Self {
        Self { inbox, task }
    }

    pub async fn next(&mut self) -> Option<Result<ReceivedMessage>> {
        self.inbox.recv().await
    }

    pub fn cancel(&mut self) {
        self.task.abort();
        self.inbox.close();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StreamingPull {
    fn drop(&mut self) {
        self.task.abort();
    }
}
