use crate::{
    backend::{BackendPtr, RestBackend, StreamingPull},
    connection::Connection,
    error::Result,
    flow_control::FlowControl,
    path::subscription_path,
    Error, ReceivedMessage,
};
use futures::future::BoxFuture;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, info};

type HandlerFn = Arc<dyn Fn(ReceivedMessage) -> BoxFuture<'static, ()> + Send + Sync>;

const ROLE: &str = "subscriber";

pub struct Subscriber {
    project_id: String,
    subscription_id: String,
    backend: BackendPtr,
    connection: Connection,
}

impl Subscriber {
    /// Subscriber backed by the REST API, configured from the environment.
    pub fn new(project_id: impl Into<String>, subscription_id: impl Into<String>) -> Self {
        Self::with_backend(Arc::new(RestBackend::from_env()), project_id, subscription_id)
    }

    pub fn with_backend(
        backend: BackendPtr,
        project_id: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            subscription_id: subscription_id.into(),
            backend,
            connection: Connection::Unconnected,
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        let session = match self.backend.connect().await {
            Ok(session) => session,
            Err(e) => {
                error!("could not connect to pub/sub subscriber client: {}", e);
                return Err(Error::connection(ROLE, e));
            }
        };

        let path = subscription_path(&self.project_id, &self.subscription_id);
        info!("Connected to pub/sub subscriber client for {}", path);
        self.connection = Connection::Connected { session, path };

        Ok(())
    }

    /// Delivers messages from the subscription to `handler` until `timeout`
    /// elapses or the stream ends.
    ///
    /// Every message is handled on its own task and stays unacknowledged
    /// until the handler calls [`ReceivedMessage::ack`]. `max_in_flight` caps
    /// the number of unacknowledged messages; only a positive value enables
    /// the cap.
    ///
    /// Only a missing connection is reported as an error. Failures of the
    /// stream itself are logged, the stream is cancelled and the call returns
    /// `Ok(())`.
    pub async fn pull<F, Fut>(
        &self,
        handler: F,
        timeout: Option<Duration>,
        max_in_flight: Option<i64>,
    ) -> Result<()>
    where
        F: Fn(ReceivedMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (session, path) = self.connection.get()?;

        let flow_control = FlowControl::from_max_in_flight(max_in_flight);
        debug!("Flow control for {}: {:?}", path, flow_control);

        let mut stream = match session.subscribe(path, flow_control).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Could not open streaming pull on {}: {}", path, e);
                return Ok(());
            }
        };

        info!("Listening for messages on {} ...", path);

        let handler: HandlerFn =
            Arc::new(move |msg| -> BoxFuture<'static, ()> { Box::pin(handler(msg)) });

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, dispatch(&mut stream, handler)).await {
                Ok(result) => result,
                Err(_) => {
                    stream.cancel();
                    info!("Stopped listening on {} after {:?}", path, limit);
                    return Ok(());
                }
            },
            None => dispatch(&mut stream, handler).await,
        };

        match result {
            Ok(()) => info!("Streaming pull on {} ended", path),
            Err(e) => {
                stream.cancel();
                error!("Streaming pull on {} failed: {}", path, e);
            }
        }

        Ok(())
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn subscription_path(&self) -> Option<&str> {
        self.connection.path()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }
}

async fn dispatch(stream: &mut StreamingPull, handler: HandlerFn) -> Result<()> {
    while let Some(item) = stream.next().await {
        let msg = item?;
        let handler = handler.clone();
        tokio::spawn(async move {
            handler(msg).await;
        });
    }
    Ok(())
}

/// Example handler: logs the payload and attributes, then acks.
pub async fn log_and_ack(message: ReceivedMessage) {
    info!("received message: {}", String::from_utf8_lossy(message.data()));

    if !message.attributes().is_empty() {
        info!("attributes:");
        for (key, value) in message.attributes() {
            info!("- {}: {}", key, value);
        }
    }

    if let Err(e) = message.ack().await {
        error!("Failed to ack message: {}", e);
    }
}
