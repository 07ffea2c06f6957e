use crate::{
    backend::{BackendPtr, RestBackend},
    connection::Connection,
    error::Result,
    message::{Attributes, PubsubMessage},
    path::topic_path,
    Error,
};
use std::sync::Arc;
use tracing::{debug, error, info};

const ROLE: &str = "publisher";

pub struct Publisher {
    project_id: String,
    topic_id: String,
    backend: BackendPtr,
    connection: Connection,
}

impl Publisher {
    /// Publisher backed by the REST API, configured from the environment.
    pub fn new(project_id: impl Into<String>, topic_id: impl Into<String>) -> Self {
        Self::with_backend(Arc::new(RestBackend::from_env()), project_id, topic_id)
    }

    pub fn with_backend(
        backend: BackendPtr,
        project_id: impl Into<String>,
        topic_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            topic_id: topic_id.into(),
            backend,
            connection: Connection::Unconnected,
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        let session = match self.backend.connect().await {
            Ok(session) => session,
            Err(e) => {
                error!("could not connect to pub/sub publisher client: {}", e);
                return Err(Error::connection(ROLE, e));
            }
        };

        let path = topic_path(&self.project_id, &self.topic_id);
        info!("Connected to pub/sub publisher client for {}", path);
        self.connection = Connection::Connected { session, path };

        Ok(())
    }

    /// Retargets subsequent publishes. The session is kept as is.
    pub fn rebind(&mut self, project_id: impl Into<String>, topic_id: impl Into<String>) -> Result<()> {
        let project_id = project_id.into();
        let topic_id = topic_id.into();

        self.connection.rebind(topic_path(&project_id, &topic_id))?;
        self.project_id = project_id;
        self.topic_id = topic_id;

        debug!("Publisher rebound to {:?}", self.connection.path());
        Ok(())
    }

    pub async fn publish(&self, message: impl AsRef<[u8]>, attributes: Attributes) -> Result<String> {
        let (session, path) = self.connection.get()?;

        let message_id = session
            .publish(path, PubsubMessage::new(message.as_ref(), attributes))
            .await?;

        info!("Published message {} to {}", message_id, path);
        Ok(message_id)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    pub fn topic_path(&self) -> Option<&str> {
        self.connection.path()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }
}
