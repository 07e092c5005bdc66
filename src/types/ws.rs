use super::{Channel, Notification, NotificationAction, NotificationType, Priority};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incoming push frame from the notification server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Notification {
        notification: InboundNotification,
    },
    /// Any other frame type; ignored by the broker
    #[serde(other)]
    Other,
}

/// Outgoing frame to the notification server.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Handshake sent right after the connection opens
    Auth {
        #[serde(rename = "apiKey", skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(rename = "tenantId", skip_serializing_if = "Option::is_none")]
        tenant_id: Option<String>,
    },
}

/// Notification payload as the server sends it. Loosely typed; see [`InboundNotification::normalize`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundNotification {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub notification_type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    /// A single channel name or a list of them
    #[serde(default)]
    pub channel: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub expires_at: Option<Value>,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl InboundNotification {
    /// Build a full record: fresh id, coerced timestamp, unread.
    pub fn normalize(self, now: i64) -> Notification {
        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(coerce_timestamp)
            .unwrap_or(now);

        let mut record = Notification {
            id: super::generate_id(now),
            title: self.title,
            message: self.message,
            notification_type: self
                .notification_type
                .as_deref()
                .map(NotificationType::from)
                .unwrap_or_default(),
            priority: self
                .priority
                .as_deref()
                .map(Priority::from)
                .unwrap_or_default(),
            channel: parse_channels(self.channel.as_ref()),
            persistent: self.persistent.unwrap_or(false),
            read: false,
            timestamp,
            expires_at: self.expires_at.as_ref().and_then(coerce_timestamp),
            actions: self.actions,
            data: self.data,
        };

        if record.channel.is_empty() {
            record.channel.push(Channel::Websocket);
        }
        record
    }
}

/// Values below this are treated as epoch seconds rather than milliseconds.
const SECONDS_CUTOFF: i64 = 1_000_000_000_000;

/// Coerce a loosely-typed timestamp (epoch ms, epoch seconds, RFC 3339, numeric string) into ms.
/// Values that cannot be represented as i64 milliseconds yield `None`.
pub fn coerce_timestamp(value: &Value) -> Option<i64> {
    let raw = match value {
        Value::Number(n) => match n.as_i64() {
            Some(raw) => raw,
            None => float_to_i64(n.as_f64()?)?,
        },
        Value::String(s) => {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp_millis());
            }
            s.trim().parse::<i64>().ok()?
        }
        _ => return None,
    };

    if raw > -SECONDS_CUTOFF && raw < SECONDS_CUTOFF {
        raw.checked_mul(1000)
    } else {
        Some(raw)
    }
}

// `as` saturates, so out-of-range floats are rejected before the cast.
fn float_to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f > i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_channels(value: Option<&Value>) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut push = |name: &str| {
        if let Some(ch) = Channel::parse(name) {
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    };

    match value {
        Some(Value::String(s)) => push(s),
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(s) = item.as_str() {
                    push(s);
                }
            }
        }
        _ => {}
    }
    channels
}
