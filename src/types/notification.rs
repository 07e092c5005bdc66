//! Notification records and delivery settings.

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Notification type categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Success,
    Error,
    Warning,
    #[default]
    Info,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::Success => "success",
            NotificationType::Error => "error",
            NotificationType::Warning => "warning",
            NotificationType::Info => "info",
            NotificationType::System => "system",
        }
    }
}

/// Lenient parse used for inbound frames; unknown values become `Info`.
impl From<&str> for NotificationType {
    fn from(s: &str) -> Self {
        match s {
            "success" => NotificationType::Success,
            "error" => NotificationType::Error,
            "warning" => NotificationType::Warning,
            "system" => NotificationType::System,
            _ => NotificationType::Info,
        }
    }
}

/// Severity ranking. Variants are declared in ascending order so `Ord` follows severity.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

/// Unknown values become `Medium`.
impl From<&str> for Priority {
    fn from(s: &str) -> Self {
        match s {
            "low" => Priority::Low,
            "high" => Priority::High,
            "critical" => Priority::Critical,
            _ => Priority::Medium,
        }
    }
}

/// Delivery target. Only `Browser` (and the in-app list) is acted on client-side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Browser,
    Websocket,
    Email,
    Sms,
    Push,
}

impl Channel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "browser" => Some(Channel::Browser),
            "websocket" => Some(Channel::Websocket),
            "email" => Some(Channel::Email),
            "sms" => Some(Channel::Sms),
            "push" => Some(Channel::Push),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Channel::Browser => "browser",
            Channel::Websocket => "websocket",
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        };
        write!(f, "{}", s)
    }
}

/// Visual style of a notification action button.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionStyle {
    #[default]
    Primary,
    Secondary,
    Danger,
}

/// A UI affordance attached to a notification. Opaque to the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAction {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub style: ActionStyle,
    /// Key the rendering layer resolves to a callback
    #[serde(default)]
    pub handler: String,
}

/// A single notification held in the in-app list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique notification ID (time-based with random suffix)
    pub id: String,
    /// Short title
    pub title: String,
    /// Body text
    pub message: String,
    /// Notification type (success, error, warning, info, system)
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: Priority,
    /// Delivery targets this notification was addressed to
    pub channel: Vec<Channel>,
    /// Survives being seen; only explicit removal or expiry drops it
    #[serde(default)]
    pub persistent: bool,
    /// Whether the notification has been read
    #[serde(default)]
    pub read: bool,
    /// Creation time in milliseconds
    pub timestamp: i64,
    /// Eviction deadline in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    /// Opaque payload carried through from the push frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Notification {
    /// Whether the record is eligible for eviction at `now` (ms).
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        self.channel.contains(&channel)
    }
}

/// Generate a notification id from a millisecond timestamp and a random suffix.
pub fn generate_id(timestamp_ms: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("{}-{}", timestamp_ms, suffix.to_lowercase())
}

/// Caller-supplied notification data. The broker fills in id, timestamp and read state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_channels")]
    pub channel: Vec<Channel>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

fn default_channels() -> Vec<Channel> {
    vec![Channel::Browser]
}

impl Default for NewNotification {
    fn default() -> Self {
        Self {
            title: String::new(),
            message: String::new(),
            notification_type: NotificationType::Info,
            priority: Priority::Medium,
            channel: default_channels(),
            persistent: false,
            expires_at: None,
            actions: Vec::new(),
            data: None,
        }
    }
}

impl NewNotification {
    /// Build a new notification with the given title and message.
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Turn into a full record, unread, stamped at `timestamp`.
    pub fn into_record(self, timestamp: i64) -> Notification {
        Notification {
            id: generate_id(timestamp),
            title: self.title,
            message: self.message,
            notification_type: self.notification_type,
            priority: self.priority,
            channel: self.channel,
            persistent: self.persistent,
            read: false,
            timestamp,
            expires_at: self.expires_at,
            actions: self.actions,
            data: self.data,
        }
    }
}

/// Options for the toast shorthand.
#[derive(Debug, Clone, Default)]
pub struct ToastOptions {
    pub title: Option<String>,
    pub notification_type: Option<NotificationType>,
    pub priority: Option<Priority>,
    pub channel: Option<Vec<Channel>>,
    pub persistent: bool,
    /// How long the toast stays in the list; falls back to the broker's default duration
    pub duration: Option<Duration>,
    pub actions: Vec<NotificationAction>,
}

/// Per-priority visibility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityVisibility {
    pub low: bool,
    pub medium: bool,
    pub high: bool,
    pub critical: bool,
}

impl PriorityVisibility {
    pub fn get(&self, priority: Priority) -> bool {
        match priority {
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
            Priority::Critical => self.critical,
        }
    }
}

impl Default for PriorityVisibility {
    fn default() -> Self {
        Self {
            low: true,
            medium: true,
            high: true,
            critical: true,
        }
    }
}

/// Per-channel visibility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelVisibility {
    pub browser: bool,
    pub websocket: bool,
    pub email: bool,
    pub sms: bool,
    pub push: bool,
}

impl ChannelVisibility {
    pub fn get(&self, channel: Channel) -> bool {
        match channel {
            Channel::Browser => self.browser,
            Channel::Websocket => self.websocket,
            Channel::Email => self.email,
            Channel::Sms => self.sms,
            Channel::Push => self.push,
        }
    }
}

impl Default for ChannelVisibility {
    fn default() -> Self {
        Self {
            browser: true,
            websocket: true,
            email: false,
            sms: false,
            push: false,
        }
    }
}

/// Default bound on the in-app list.
pub const DEFAULT_MAX_NOTIFICATIONS: usize = 50;

/// Default popup auto-hide delay in milliseconds.
pub const DEFAULT_AUTO_HIDE_DELAY_MS: u64 = 5000;

/// Per-user delivery preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enable_browser: bool,
    #[serde(rename = "enableWebSocket")]
    pub enable_websocket: bool,
    pub enable_email: bool,
    #[serde(rename = "enableSMS")]
    pub enable_sms: bool,
    pub enable_push: bool,
    pub sound_enabled: bool,
    /// Bound on the in-app list; oldest entries are dropped beyond it
    pub max_notifications: usize,
    /// Popup auto-hide delay in milliseconds
    pub auto_hide_delay: u64,
    pub priorities: PriorityVisibility,
    pub channels: ChannelVisibility,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enable_browser: true,
            enable_websocket: true,
            enable_email: false,
            enable_sms: false,
            enable_push: false,
            sound_enabled: true,
            max_notifications: DEFAULT_MAX_NOTIFICATIONS,
            auto_hide_delay: DEFAULT_AUTO_HIDE_DELAY_MS,
            priorities: PriorityVisibility::default(),
            channels: ChannelVisibility::default(),
        }
    }
}

/// Partial settings for updates.
/// All fields are optional - only provided fields will be updated.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartialSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_browser: Option<bool>,

    #[serde(rename = "enableWebSocket", skip_serializing_if = "Option::is_none")]
    pub enable_websocket: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_email: Option<bool>,

    #[serde(rename = "enableSMS", skip_serializing_if = "Option::is_none")]
    pub enable_sms: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_push: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_notifications: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_hide_delay: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priorities: Option<PriorityVisibility>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<ChannelVisibility>,
}

impl PartialSettings {
    /// Shallow-merge into full settings. Nested maps are replaced whole.
    pub fn apply_to(&self, settings: &mut NotificationSettings) {
        if let Some(v) = self.enable_browser {
            settings.enable_browser = v;
        }
        if let Some(v) = self.enable_websocket {
            settings.enable_websocket = v;
        }
        if let Some(v) = self.enable_email {
            settings.enable_email = v;
        }
        if let Some(v) = self.enable_sms {
            settings.enable_sms = v;
        }
        if let Some(v) = self.enable_push {
            settings.enable_push = v;
        }
        if let Some(v) = self.sound_enabled {
            settings.sound_enabled = v;
        }
        if let Some(v) = self.max_notifications {
            settings.max_notifications = v;
        }
        if let Some(v) = self.auto_hide_delay {
            settings.auto_hide_delay = v;
        }
        if let Some(v) = self.priorities {
            settings.priorities = v;
        }
        if let Some(v) = self.channels {
            settings.channels = v;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
