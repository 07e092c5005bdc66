use crate::error::BrokerError;
use crate::types::DEFAULT_MAX_NOTIFICATIONS;
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default delay before a single reconnect attempt after an unexpected close.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default interval of the expiration sweeper.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default lifetime of a non-persistent toast in the in-app list.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(5);

/// Callback receiving transport errors.
#[derive(Clone)]
pub struct ErrorHook(Arc<dyn Fn(&BrokerError) + Send + Sync>);

impl ErrorHook {
    pub fn new(f: impl Fn(&BrokerError) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, error: &BrokerError) {
        (self.0)(error)
    }
}

impl fmt::Debug for ErrorHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHook")
    }
}

/// Broker configuration, resolved once at construction.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// WebSocket URL of the push server (ws:// or wss://).
    pub endpoint_url: String,
    /// API key sent in the auth handshake.
    pub api_key: Option<String>,
    /// User identifier sent in the auth handshake.
    pub user_id: Option<String>,
    /// Tenant identifier sent in the auth handshake.
    pub tenant_id: Option<String>,
    /// Initial bound on the in-app list.
    pub max_notifications: usize,
    /// Lifetime of non-persistent toasts.
    pub default_duration: Duration,
    /// Delay before reconnecting after an unexpected close.
    pub reconnect_delay: Duration,
    /// Expiration sweeper interval.
    pub sweep_interval: Duration,
    /// Receives transport errors.
    pub on_error: Option<ErrorHook>,
}

impl BrokerConfig {
    /// Configuration with defaults for everything but the endpoint.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            api_key: None,
            user_id: None,
            tenant_id: None,
            max_notifications: DEFAULT_MAX_NOTIFICATIONS,
            default_duration: DEFAULT_DURATION,
            reconnect_delay: RECONNECT_DELAY,
            sweep_interval: SWEEP_INTERVAL,
            on_error: None,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let millis = |name: &str, default: Duration| {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            endpoint_url: env::var("NOTIFY_WS_URL")
                .unwrap_or_else(|_| "ws://127.0.0.1:3001/ws".to_string()),
            api_key: env::var("NOTIFY_API_KEY").ok().filter(|v| !v.is_empty()),
            user_id: env::var("NOTIFY_USER_ID").ok().filter(|v| !v.is_empty()),
            tenant_id: env::var("NOTIFY_TENANT_ID").ok().filter(|v| !v.is_empty()),
            max_notifications: env::var("NOTIFY_MAX_NOTIFICATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_NOTIFICATIONS),
            default_duration: millis("NOTIFY_DEFAULT_DURATION_MS", DEFAULT_DURATION),
            reconnect_delay: millis("NOTIFY_RECONNECT_DELAY_MS", RECONNECT_DELAY),
            sweep_interval: millis("NOTIFY_SWEEP_INTERVAL_MS", SWEEP_INTERVAL),
            on_error: None,
        }
    }

    pub fn with_credentials(
        mut self,
        api_key: Option<String>,
        user_id: Option<String>,
        tenant_id: Option<String>,
    ) -> Self {
        self.api_key = api_key;
        self.user_id = user_id;
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_error_hook(mut self, f: impl Fn(&BrokerError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(ErrorHook::new(f));
        self
    }

    /// Whether any handshake credential is configured.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() || self.user_id.is_some() || self.tenant_id.is_some()
    }

    /// Check the endpoint scheme.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.endpoint_url.starts_with("ws://") || self.endpoint_url.starts_with("wss://") {
            Ok(())
        } else {
            Err(BrokerError::Config(format!(
                "endpoint must be a ws:// or wss:// URL, got {}",
                self.endpoint_url
            )))
        }
    }
}
