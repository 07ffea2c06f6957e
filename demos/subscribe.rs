//! Listens on a subscription for 30 seconds, logging and acking every message.
//!
//! ```bash
//! PUBSUB_EMULATOR_HOST=localhost:8085 RUST_LOG=info \
//!     cargo run --example subscribe -- my-project my-subscription
//! ```

use cloud_pubsub_client::{log_and_ack, Subscriber};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let project_id = args.next().unwrap_or_else(|| "local-project".to_string());
    let subscription_id = args.next().unwrap_or_else(|| "test-subscription".to_string());

    let mut subscriber = Subscriber::new(project_id, subscription_id);
    subscriber.connect().await?;

    subscriber
        .pull(log_and_ack, Some(Duration::from_secs(30)), Some(10))
        .await?;

    Ok(())
}
