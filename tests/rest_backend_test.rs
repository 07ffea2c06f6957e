use cloud_pubsub_client::{ClientConfig, Error, Publisher, ReceivedMessage, RestBackend, Subscriber};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    time::{timeout, Duration, Instant},
};

const TOKEN: &str = "test-token";

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    authorization: Option<String>,
    body: Value,
}

type Route = Arc<dyn Fn(&str) -> (u16, String) + Send + Sync>;

/// Minimal HTTP/1.1 server: one request per connection, answered by `route`.
struct FakePubsub {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakePubsub {
    async fn start(route: Route) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let route = route.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, route, recorded).await;
                });
            }
        });

        Self { addr, requests }
    }

    fn backend(&self) -> Arc<RestBackend> {
        let config = ClientConfig::default()
            .with_emulator(self.addr.to_string())
            .with_access_token(TOKEN)
            .with_request_timeout(Duration::from_secs(2))
            .with_idle_pause(Duration::from_millis(20));
        Arc::new(RestBackend::new(config))
    }

    async fn requests_to(&self, suffix: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.path.ends_with(suffix))
            .cloned()
            .collect()
    }
}

async fn serve(
    mut socket: TcpStream,
    route: Route,
    recorded: Arc<Mutex<Vec<Recorded>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();

    let mut content_length = 0;
    let mut authorization = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = serde_json::from_slice(&buf[header_end..]).unwrap_or(Value::Null);
    recorded.lock().await.push(Recorded {
        path: path.clone(),
        authorization,
        body,
    });

    let (status, payload) = route(&path);
    let response = format!(
        "HTTP/1.1 {} Fake\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        payload.len(),
        payload
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

fn received(ack_id: &str, data: &str) -> Value {
    json!({"ackId": ack_id, "message": {"data": data, "messageId": ack_id}})
}

#[tokio::test]
async fn test_publish_round_trip() {
    let server = FakePubsub::start(Arc::new(|_path: &str| {
        (200, json!({"messageIds": ["mid-1"]}).to_string())
    }))
    .await;

    let mut publisher = Publisher::with_backend(server.backend(), "proj1", "topicA");
    publisher.connect().await.unwrap();

    let message_id = publisher
        .publish("hello", HashMap::from([("k".to_string(), "v".to_string())]))
        .await
        .unwrap();
    assert_eq!(message_id, "mid-1");

    let requests = server.requests_to(":publish").await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/v1/projects/proj1/topics/topicA:publish");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer test-token"));
    assert_eq!(
        requests[0].body,
        json!({"messages": [{"data": "aGVsbG8=", "attributes": {"k": "v"}}]})
    );
}

#[tokio::test]
async fn test_publish_server_error_propagates() {
    let server = FakePubsub::start(Arc::new(|_path: &str| {
        (500, json!({"error": {"message": "internal"}}).to_string())
    }))
    .await;

    let mut publisher = Publisher::with_backend(server.backend(), "proj1", "topicA");
    publisher.connect().await.unwrap();

    let err = publisher.publish("hello", HashMap::new()).await.err().unwrap();

    match err {
        Error::Status { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert!(body.contains("internal"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_publish_without_message_id_is_backend_error() {
    let server = FakePubsub::start(Arc::new(|_path: &str| (200, String::new()))).await;

    let mut publisher = Publisher::with_backend(server.backend(), "proj1", "topicA");
    publisher.connect().await.unwrap();

    let err = publisher.publish("hello", HashMap::new()).await.err().unwrap();
    assert!(matches!(err, Error::Backend(_)));
}

#[tokio::test]
async fn test_pull_server_error_is_swallowed() {
    let server = FakePubsub::start(Arc::new(|_path: &str| (500, "{}".to_string()))).await;

    let mut subscriber = Subscriber::with_backend(server.backend(), "proj1", "sub");
    subscriber.connect().await.unwrap();

    let started = Instant::now();
    let result = timeout(
        Duration::from_secs(3),
        subscriber.pull(|_msg| async {}, Some(Duration::from_secs(10)), None),
    )
    .await
    .expect("pull should return once the pull request fails");

    assert!(result.is_ok());
    assert!(started.elapsed() < Duration::from_secs(10));

    let pulls = server.requests_to(":pull").await;
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].path, "/v1/projects/proj1/subscriptions/sub:pull");
}

#[tokio::test]
async fn test_capped_pull_requests_at_most_the_cap() {
    let server = FakePubsub::start(Arc::new(|_path: &str| (200, "{}".to_string()))).await;

    let mut subscriber = Subscriber::with_backend(server.backend(), "proj1", "sub");
    subscriber.connect().await.unwrap();

    subscriber
        .pull(|_msg| async {}, Some(Duration::from_millis(200)), Some(3))
        .await
        .unwrap();

    let pulls = server.requests_to(":pull").await;
    assert!(!pulls.is_empty());
    for pull in pulls {
        assert_eq!(pull.body, json!({"maxMessages": 3}));
        assert_eq!(pull.authorization.as_deref(), Some("Bearer test-token"));
    }
}

#[tokio::test]
async fn test_unacked_messages_shrink_next_pull() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let counter = pulls.clone();
    let server = FakePubsub::start(Arc::new(move |path: &str| {
        if path.ends_with(":pull") && counter.fetch_add(1, Ordering::SeqCst) == 0 {
            let body = json!({"receivedMessages": [received("a1", "b25l"), received("a2", "dHdv")]});
            (200, body.to_string())
        } else {
            (200, "{}".to_string())
        }
    }))
    .await;

    let mut subscriber = Subscriber::with_backend(server.backend(), "proj1", "sub");
    subscriber.connect().await.unwrap();

    let held = Arc::new(Mutex::new(Vec::new()));
    let held_clone = held.clone();
    subscriber
        .pull(
            move |msg: ReceivedMessage| {
                let held = held_clone.clone();
                async move {
                    held.lock().await.push(msg);
                }
            },
            Some(Duration::from_millis(300)),
            Some(3),
        )
        .await
        .unwrap();

    assert_eq!(held.lock().await.len(), 2);

    let requests = server.requests_to(":pull").await;
    assert!(requests.len() >= 2);
    assert_eq!(requests[0].body, json!({"maxMessages": 3}));
    assert_eq!(requests[1].body, json!({"maxMessages": 1}));
}

#[tokio::test]
async fn test_ack_and_nack_reach_server() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let counter = pulls.clone();
    let server = FakePubsub::start(Arc::new(move |path: &str| {
        if path.ends_with(":pull") {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                let body = json!({"receivedMessages": [received("keep", "b2s="), received("retry", "bm8=")]});
                return (200, body.to_string());
            }
            return (200, "{}".to_string());
        }
        // Acknowledge and modifyAckDeadline answer with an empty body.
        (200, String::new())
    }))
    .await;

    let mut subscriber = Subscriber::with_backend(server.backend(), "proj1", "sub");
    subscriber.connect().await.unwrap();

    let results = Arc::new(Mutex::new(Vec::new()));
    let results_clone = results.clone();
    subscriber
        .pull(
            move |msg: ReceivedMessage| {
                let results = results_clone.clone();
                async move {
                    let outcome = if msg.ack_id() == "keep" {
                        msg.ack().await
                    } else {
                        msg.nack().await
                    };
                    results.lock().await.push(outcome.is_ok());
                }
            },
            Some(Duration::from_millis(300)),
            None,
        )
        .await
        .unwrap();

    assert_eq!(*results.lock().await, vec![true, true]);

    let acks = server.requests_to(":acknowledge").await;
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].path, "/v1/projects/proj1/subscriptions/sub:acknowledge");
    assert_eq!(acks[0].body, json!({"ackIds": ["keep"]}));

    let nacks = server.requests_to(":modifyAckDeadline").await;
    assert_eq!(nacks.len(), 1);
    assert_eq!(
        nacks[0].body,
        json!({"ackIds": ["retry"], "ackDeadlineSeconds": 0})
    );
}
