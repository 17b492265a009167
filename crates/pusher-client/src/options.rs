//! Configuration types for the Pusher client.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// Protocol version announced in the connection URL.
pub const PROTOCOL_VERSION: u8 = 5;
/// Client name announced in the connection URL.
pub const CLIENT_NAME: &str = "pusher-client-rust";
/// Client version announced in the connection URL.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Channel authentication settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PusherAuth {
    /// URL of the auth endpoint that signs private/presence subscriptions.
    pub endpoint: String,
    /// Headers sent with every auth request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl PusherAuth {
    /// Create auth settings for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header sent with every auth request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Connection options.
///
/// The serialized form covers the endpoint and auth fields; timeouts and
/// reconnect tuning keep their defaults when loaded from a file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PusherOptions {
    /// Auth settings. Required for private and presence channels.
    pub auth: Option<PusherAuth>,
    /// Cluster identifier, used to derive the default host.
    pub cluster: String,
    /// Host override. Defaults to `ws-{cluster}.pusher.com`.
    pub host: Option<String>,
    /// Port to connect to.
    pub port: u16,
    /// Use `wss://` when true, `ws://` otherwise.
    pub encrypted: bool,
    /// Timeout for opening the socket.
    #[serde(skip)]
    pub connect_timeout: Duration,
    /// Backoff policy for connect failures and protocol-driven reconnects.
    #[serde(skip)]
    pub reconnect: ReconnectConfig,
}

impl Default for PusherOptions {
    fn default() -> Self {
        Self {
            auth: None,
            cluster: "mt1".to_string(),
            host: None,
            port: 443,
            encrypted: true,
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl PusherOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a TOML document.
    ///
    /// ```
    /// use pusher_client::PusherOptions;
    ///
    /// let options = PusherOptions::from_toml_str(r#"
    ///     cluster = "eu"
    ///     port = 8443
    ///
    ///     [auth]
    ///     endpoint = "https://example.com/broadcasting/auth"
    ///     headers = { Authorization = "Bearer token" }
    /// "#).unwrap();
    /// assert_eq!(options.cluster, "eu");
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Set the auth settings.
    pub fn auth(mut self, auth: PusherAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the cluster.
    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Override the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Choose between `wss://` and `ws://`.
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Set the socket open timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reconnect policy.
    pub fn reconnect_config(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    /// Host the socket connects to.
    pub fn effective_host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| format!("ws-{}.pusher.com", self.cluster))
    }

    /// Build the socket URL for `api_key`.
    pub fn endpoint(&self, api_key: &str) -> Result<Url> {
        let scheme = if self.encrypted { "wss" } else { "ws" };
        let mut url = Url::parse(&format!(
            "{scheme}://{}:{}/app/{api_key}",
            self.effective_host(),
            self.port
        ))?;
        url.query_pairs_mut()
            .append_pair("protocol", &PROTOCOL_VERSION.to_string())
            .append_pair("client", CLIENT_NAME)
            .append_pair("version", CLIENT_VERSION);
        Ok(url)
    }
}

/// Backoff policy for reconnection.
///
/// The retry counter starts at 1. The delay before attempt `n` is
/// `initial_delay * multiplier^(n - 1)`, capped at `max_delay`, with
/// `jitter` as a fraction of random spread. Retrying stops once the total
/// time spent waiting would exceed `max_elapsed`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction (0.1 = ±10%).
    pub jitter: f64,
    /// Total waiting time after which automatic retries stop.
    pub max_elapsed: Duration,
    /// Delay before reconnecting after a 4100-4199 protocol error.
    pub protocol_error_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
            max_elapsed: Duration::from_secs(60 * 60),
            protocol_error_delay: Duration::from_secs(1),
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnect configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter fraction. Zero makes delays deterministic.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    /// Set the total waiting budget.
    pub fn max_elapsed(mut self, budget: Duration) -> Self {
        self.max_elapsed = budget;
        self
    }

    /// Set the delay used for 4100-4199 protocol errors.
    pub fn protocol_error_delay(mut self, delay: Duration) -> Self {
        self.protocol_error_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let delay_ms = base_ms.min(self.max_delay.as_millis() as f64);

        let spread = delay_ms * self.jitter;
        let jittered = if spread > 0.0 {
            delay_ms + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            delay_ms
        };

        Duration::from_millis(jittered.max(0.0) as u64)
    }
}
