use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Upper bound on delivered messages that have not been acked or nacked yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControl {
    pub max_messages: usize,
}

impl FlowControl {
    /// Counts above what a semaphore can hold are clamped to that limit.
    pub fn new(max_messages: usize) -> Option<Self> {
        (max_messages > 0).then_some(Self {
            max_messages: max_messages.min(Semaphore::MAX_PERMITS),
        })
    }

    /// Only a positive count enables the cap.
    pub fn from_max_in_flight(max_in_flight: Option<i64>) -> Option<Self> {
        max_in_flight
            .filter(|n| *n > 0)
            .and_then(|n| usize::try_from(n).ok())
            .and_then(Self::new)
    }
}

/// Semaphore shared by a backend delivery task and the messages it hands out.
#[derive(Clone)]
pub(crate) struct FlowGate {
    permits: Option<Arc<Semaphore>>,
}

impl FlowGate {
    pub(crate) fn new(flow_control: Option<FlowControl>) -> Self {
        Self {
            permits: flow_control.map(|fc| Arc::new(Semaphore::new(fc.max_messages))),
        }
    }

    /// Waits for one free slot. `Some(None)` means no cap is configured,
    /// `None` that the semaphore was closed.
    pub(crate) async fn acquire(&self) -> Option<Option<OwnedSemaphorePermit>> {
        match &self.permits {
            Some(sem) => sem.clone().acquire_owned().await.ok().map(Some),
            None => Some(None),
        }
    }

    /// Grabs up to `n` more slots without waiting.
    pub(crate) fn try_acquire_many(&self, n: usize) -> Vec<OwnedSemaphorePermit> {
        let Some(sem) = &self.permits else {
            return Vec::new();
        };

        let mut permits = Vec::with_capacity(n);
        while permits.len() < n {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => permits.push(permit),
                Err(_) => break,
            }
        }
        permits
    }

    pub(crate) fn is_capped(&self) -> bool {
        self.permits.is_some()
    }
}
