use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for the WhatsApp Web client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnConfig {
    /// WebSocket endpoint.
    pub endpoint: String,
    /// `Origin` header sent with the WebSocket upgrade.
    pub origin: String,
    /// How long a request waits for its reply, in milliseconds.
    pub request_timeout_ms: u64,
    /// Whether the keepalive loop runs while connected.
    pub keepalive: bool,
    /// Lower bound of the keepalive interval, in milliseconds.
    pub keepalive_min_ms: u64,
    /// Upper bound (exclusive) of the keepalive interval, in milliseconds.
    pub keepalive_max_ms: u64,
    /// Client name shown in the phone's list of web sessions.
    pub long_client_name: String,
    pub short_client_name: String,
    pub client_version: String,
    /// WhatsApp Web version announced in `admin init`.
    pub wa_version: [u32; 3],
    /// Number of workers running asynchronous handlers.
    pub handler_workers: usize,
    /// Events that may wait for a handler worker before dispatch blocks.
    pub handler_queue_capacity: usize,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://web.whatsapp.com/ws".into(),
            origin: "https://web.whatsapp.com".into(),
            request_timeout_ms: 20_000,
            keepalive: true,
            keepalive_min_ms: 20_000,
            keepalive_max_ms: 60_000,
            long_client_name: "waweb-rust".into(),
            short_client_name: "waweb".into(),
            client_version: env!("CARGO_PKG_VERSION").into(),
            wa_version: [2, 2142, 12],
            handler_workers: 4,
            handler_queue_capacity: 256,
        }
    }
}

impl ConnConfig {
    /// Override the WebSocket endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the `Origin` header.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Override the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enable or disable the keepalive loop.
    pub fn with_keepalive(mut self, enabled: bool) -> Self {
        self.keepalive = enabled;
        self
    }

    /// Override the keepalive interval bounds.
    pub fn with_keepalive_interval(mut self, min: Duration, max: Duration) -> Self {
        self.keepalive_min_ms = min.as_millis() as u64;
        self.keepalive_max_ms = max.as_millis() as u64;
        self
    }

    /// Override the client names announced at login.
    pub fn with_client_name(
        mut self,
        long: impl Into<String>,
        short: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.long_client_name = long.into();
        self.short_client_name = short.into();
        self.client_version = version.into();
        self
    }

    /// Override the announced WhatsApp Web version.
    pub fn with_wa_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.wa_version = [major, minor, patch];
        self
    }

    /// Override the handler worker pool size and queue capacity.
    pub fn with_handler_workers(mut self, workers: usize, queue_capacity: usize) -> Self {
        self.handler_workers = workers;
        self.handler_queue_capacity = queue_capacity;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Draw a keepalive interval from `[min, max)`.
    pub fn keepalive_interval(&self) -> Duration {
        use rand::Rng;

        let millis = if self.keepalive_max_ms > self.keepalive_min_ms {
            rand::thread_rng().gen_range(self.keepalive_min_ms..self.keepalive_max_ms)
        } else {
            self.keepalive_min_ms
        };
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnConfig::default();
        assert_eq!(config.endpoint, "wss://web.whatsapp.com/ws");
        assert_eq!(config.wa_version, [2, 2142, 12]);
        assert_eq!(config.request_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_keepalive_interval_in_bounds() {
        let config = ConnConfig::default()
            .with_keepalive_interval(Duration::from_millis(100), Duration::from_millis(200));
        for _ in 0..100 {
            let interval = config.keepalive_interval();
            assert!(interval >= Duration::from_millis(100));
            assert!(interval < Duration::from_millis(200));
        }

        let fixed = config.with_keepalive_interval(Duration::from_millis(50), Duration::from_millis(50));
        assert_eq!(fixed.keepalive_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ConnConfig = serde_json::from_str(r#"{"keepalive": false}"#).unwrap();
        assert!(!config.keepalive);
        assert_eq!(config.origin, "https://web.whatsapp.com");
    }
}
