//! Delivery filter.
//!
//! Pure predicates deciding which side effects a notification may trigger.
//! Storage in the in-app list is decided by the ingestion path, not here.

use crate::services::dispatch::Permission;
use crate::types::{Channel, Notification, NotificationSettings, Priority};

/// Whether a notification is visible under the current settings: its priority is
/// enabled and at least one of its channels is enabled.
pub fn should_surface(notification: &Notification, settings: &NotificationSettings) -> bool {
    settings.priorities.get(notification.priority)
        && notification
            .channel
            .iter()
            .any(|&channel| settings.channels.get(channel))
}

/// Audio cues fire only for surfaced high and critical notifications.
pub fn should_play_sound(notification: &Notification, settings: &NotificationSettings) -> bool {
    settings.sound_enabled
        && notification.priority >= Priority::High
        && should_surface(notification, settings)
}

/// Platform popups need the browser toggle, a browser channel and granted permission.
pub fn should_show_platform(
    notification: &Notification,
    settings: &NotificationSettings,
    permission: Permission,
) -> bool {
    settings.enable_browser
        && permission == Permission::Granted
        && notification.has_channel(Channel::Browser)
        && should_surface(notification, settings)
}
