use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://pubsub.googleapis.com";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub emulator: bool,
    pub access_token: Option<String>,
    pub request_timeout: Duration,
    pub pull_batch_size: usize,
    pub idle_pause: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let emulator_host = std::env::var("PUBSUB_EMULATOR_HOST")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let endpoint = match &emulator_host {
            Some(host) => format!("http://{}", host.trim()),
            None => std::env::var("PUBSUB_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
        };

        let access_token = std::env::var("PUBSUB_ACCESS_TOKEN")
            .or_else(|_| std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN"))
            .ok()
            .filter(|s| !s.is_empty());

        let request_timeout = std::env::var("PUBSUB_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(10000));

        let pull_batch_size = std::env::var("PUBSUB_PULL_MAX_MESSAGES")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(100);

        let idle_pause = std::env::var("PUBSUB_IDLE_PAUSE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(500));

        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            emulator: emulator_host.is_some(),
            access_token,
            request_timeout,
            pull_batch_size,
            idle_pause,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_emulator(mut self, host: impl AsRef<str>) -> Self {
        self.endpoint = format!("http://{}", host.as_ref().trim_end_matches('/'));
        self.emulator = true;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_pull_batch_size(mut self, size: usize) -> Self {
        self.pull_batch_size = size.max(1);
        self
    }

    pub fn with_idle_pause(mut self, pause: Duration) -> Self {
        self.idle_pause = pause;
        self
    }

    /// Real endpoints need a bearer token; emulators accept anonymous requests.
    pub fn has_credentials(&self) -> bool {
        self.emulator || self.access_token.is_some()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            emulator: false,
            access_token: None,
            request_timeout: Duration::from_millis(10000),
            pull_batch_size: 100,
            idle_pause: Duration::from_millis(500),
        }
    }
}
