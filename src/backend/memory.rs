//! In-process backend.
//!
//! Simulates the managed service without a network: topics fan out to the
//! subscriptions bound to them, each subscription keeps a queue of pending
//! messages and a table of outstanding (delivered, not yet acked) ones.
//!
//! ## Semantics
//!
//! - Publishing to an unknown topic fails with a backend error.
//! - A nack puts the message back at the front of the queue and bumps its
//!   delivery attempt.
//! - Messages dropped without ack stay outstanding until
//!   [`MemoryBackend::expire_outstanding`] simulates the ack deadline passing.
//!
//! The extra inspection methods exist for tests, demos and benchmarks.

use crate::{
    backend::{Acker, AckerPtr, Backend, Session, SessionPtr, StreamingPull},
    error::Result,
    flow_control::{FlowControl, FlowGate},
    message::PubsubMessage,
    Error, ReceivedMessage,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Default)]
struct SubscriptionQueue {
    topic_path: String,
    pending: Mutex<VecDeque<(PubsubMessage, u32)>>,
    outstanding: Mutex<HashMap<String, (PubsubMessage, u32)>>,
    faults: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl SubscriptionQueue {
    fn push_back(&self, message: PubsubMessage, attempt: u32) {
        self.pending.lock().push_back((message, attempt));
        self.notify.notify_one();
    }

    fn push_front(&self, message: PubsubMessage, attempt: u32) {
        self.pending.lock().push_front((message, attempt));
        self.notify.notify_one();
    }
}

#[derive(Default)]
struct MemoryBroker {
    topics: DashMap<String, Vec<String>>,
    subscriptions: DashMap<String, Arc<SubscriptionQueue>>,
    published: Mutex<Vec<(String, PubsubMessage)>>,
    connects: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryBroker {
    fn queue(&self, subscription_path: &str) -> Result<Arc<SubscriptionQueue>> {
        self.subscriptions
            .get(subscription_path)
            .map(|q| q.value().clone())
            .ok_or_else(|| Error::Backend(format!("subscription not found: {}", subscription_path)))
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    broker: Arc<MemoryBroker>,
    connect_failure: Option<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `connect` always fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            broker: Arc::default(),
            connect_failure: Some(reason.into()),
        }
    }

    pub fn create_topic(&self, topic_path: impl Into<String>) {
        self.broker.topics.entry(topic_path.into()).or_default();
    }

    pub fn create_subscription(
        &self,
        subscription_path: impl Into<String>,
        topic_path: &str,
    ) -> Result<()> {
        let subscription_path = subscription_path.into();
        let mut bound = self
            .broker
            .topics
            .get_mut(topic_path)
            .ok_or_else(|| Error::Backend(format!("topic not found: {}", topic_path)))?;

        self.broker.subscriptions.insert(
            subscription_path.clone(),
            Arc::new(SubscriptionQueue {
                topic_path: topic_path.to_string(),
                ..Default::default()
            }),
        );
        bound.push(subscription_path);
        Ok(())
    }

    /// Makes the next delivery on `subscription_path` fail with `reason`.
    pub fn inject_stream_error(&self, subscription_path: &str, reason: impl Into<String>) -> Result<()> {
        let queue = self.broker.queue(subscription_path)?;
        queue.faults.lock().push_back(reason.into());
        queue.notify.notify_one();
        Ok(())
    }

    /// Moves every outstanding message back to the queue, as if their ack
    /// deadlines had passed.
    pub fn expire_outstanding(&self, subscription_path: &str) -> Result<usize> {
        let queue = self.broker.queue(subscription_path)?;
        let expired: Vec<_> = queue.outstanding.lock().drain().map(|(_, v)| v).collect();
        let count = expired.len();
        for (message, attempt) in expired {
            queue.push_back(message, attempt + 1);
        }
        Ok(count)
    }

    pub fn published(&self, topic_path: &str) -> Vec<PubsubMessage> {
        self.broker
            .published
            .lock()
            .iter()
            .filter(|(path, _)| path == topic_path)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn pending(&self, subscription_path: &str) -> usize {
        self.broker
            .queue(subscription_path)
            .map(|q| q.pending.lock().len())
            .unwrap_or(0)
    }

    pub fn outstanding(&self, subscription_path: &str) -> usize {
        self.broker
            .queue(subscription_path)
            .map(|q| q.outstanding.lock().len())
            .unwrap_or(0)
    }

    pub fn topic_of(&self, subscription_path: &str) -> Option<String> {
        self.broker
            .queue(subscription_path)
            .ok()
            .map(|q| q.topic_path.clone())
    }

    pub fn connect_count(&self) -> usize {
        self.broker.connects.load(Ordering::SeqCst)
    }

    /// Number of publish and subscribe calls received by any session.
    pub fn call_count(&self) -> usize {
        self.broker.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn connect(&self) -> Result<SessionPtr> {
        self.broker.connects.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = &self.connect_failure {
            return Err(Error::Backend(reason.clone()));
        }

        Ok(Arc::new(MemorySession {
            broker: self.broker.clone(),
        }))
    }
}

struct MemorySession {
    broker: Arc<MemoryBroker>,
}

#[async_trait::async_trait]
impl Session for MemorySession {
    async fn publish(&self, topic_path: &str, mut message: PubsubMessage) -> Result<String> {
        self.broker.calls.fetch_add(1, Ordering::SeqCst);

        let bound = self
            .broker
            .topics
            .get(topic_path)
            .map(|subs| subs.value().clone())
            .ok_or_else(|| Error::Backend(format!("topic not found: {}", topic_path)))?;

        let message_id = Uuid::new_v4().to_string();
        message.message_id = Some(message_id.clone());

        self.broker
            .published
            .lock()
            .push((topic_path.to_string(), message.clone()));

        for subscription_path in bound {
            if let Ok(queue) = self.broker.queue(&subscription_path) {
                queue.push_back(message.clone(), 1);
            }
        }

        debug!("Stored message {} on {}", message_id, topic_path);
        Ok(message_id)
    }

    async fn subscribe(
        &self,
        subscription_path: &str,
        flow_control: Option<FlowControl>,
    ) -> Result<StreamingPull> {
        self.broker.calls.fetch_add(1, Ordering::SeqCst);

        let queue = self.broker.queue(subscription_path)?;
        let (tx, rx) = mpsc::channel(16);
        let acker: AckerPtr = Arc::new(MemoryAcker {
            queue: queue.clone(),
        });

        let task = tokio::spawn(deliver_loop(queue, FlowGate::new(flow_control), acker, tx));

        Ok(StreamingPull::new(rx, task))
    }
}

async fn deliver_loop(
    queue: Arc<SubscriptionQueue>,
    gate: FlowGate,
    acker: AckerPtr,
    tx: mpsc::Sender<Result<ReceivedMessage>>,
) {
    loop {
        let Some(permit) = gate.acquire().await else {
            return;
        };

        loop {
            let fault = queue.faults.lock().pop_front();
            if let Some(reason) = fault {
                let _ = tx.send(Err(Error::Backend(reason))).await;
                return;
            }

            let next = queue.pending.lock().pop_front();
            if let Some((message, attempt)) = next {
                let ack_id = Uuid::new_v4().to_string();
                queue
                    .outstanding
                    .lock()
                    .insert(ack_id.clone(), (message.clone(), attempt));

                let msg = ReceivedMessage::new(ack_id, message, attempt, acker.clone(), permit);
                if tx.send(Ok(msg)).await.is_err() {
                    return;
                }
                break;
            }

            queue.notify.notified().await;
        }
    }
}

struct MemoryAcker {
    queue: Arc<SubscriptionQueue>,
}

#[async_trait::async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self, ack_id: &str) -> Result<()> {
        if self.queue.outstanding.lock().remove(ack_id).is_none() {
            warn!("Ignoring ack for unknown ack id {}", ack_id);
        }
        Ok(())
    }

    async fn nack(&self, ack_id: &str) -> Result<()> {
        let entry = self.queue.outstanding.lock().remove(ack_id);
        match entry {
            Some((message, attempt)) => self.queue.push_front(message, attempt + 1),
            None => warn!("Ignoring nack for unknown ack id {}", ack_id),
        }
        Ok(())
    }
}
