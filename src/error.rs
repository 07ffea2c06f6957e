use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not connect to pub/sub {role} client: {source}")]
    Connection {
        role: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("No PubSub connection")]
    NotConnected,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn connection(role: &'static str, source: Error) -> Self {
        Self::Connection {
            role,
            source: Box::new(source),
        }
    }

    /// True for failures surfaced by the messaging backend during publish or pull.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Error::Backend(_) | Error::Status { .. } | Error::Http(_) | Error::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
