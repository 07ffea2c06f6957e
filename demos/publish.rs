//! Publishes a few messages through the REST API.
//!
//! ```bash
//! PUBSUB_EMULATOR_HOST=localhost:8085 RUST_LOG=info \
//!     cargo run --example publish -- my-project my-topic
//! ```

use cloud_pubsub_client::Publisher;
use std::collections::HashMap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let project_id = args.next().unwrap_or_else(|| "local-project".to_string());
    let topic_id = args.next().unwrap_or_else(|| "test-topic".to_string());

    let mut publisher = Publisher::new(project_id, topic_id);
    publisher.connect().await?;

    for i in 0..5 {
        let attributes = HashMap::from([
            ("index".to_string(), i.to_string()),
            ("producer".to_string(), "publish-demo".to_string()),
        ]);
        let message_id = publisher
            .publish(format!("Hello from Rust #{}", i), attributes)
            .await?;
        println!("Published {}", message_id);
    }

    Ok(())
}
