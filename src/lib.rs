pub mod backend;
pub mod config;
mod connection;
pub mod error;
pub mod flow_control;
pub mod message;
pub mod path;
pub mod publisher;
pub mod subscriber;

pub use backend::{Backend, MemoryBackend, RestBackend};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use flow_control::FlowControl;
pub use message::{Attributes, PubsubMessage, ReceivedMessage};
pub use publisher::Publisher;
pub use subscriber::{log_and_ack, Subscriber};
