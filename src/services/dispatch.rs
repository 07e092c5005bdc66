//! Side-effect dispatchers.
//!
//! Thin adapters over the platform notification and audio capabilities. The
//! capabilities themselves are external; the broker only invokes them. All
//! capability failures are swallowed here.

use crate::error::Result;
use crate::services::filter::{should_play_sound, should_show_platform};
use crate::services::scheduler::Scheduler;
use crate::types::{Notification, NotificationSettings, NotificationType, Priority};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Fixed playback volume for audio cues.
pub const CUE_VOLUME: f32 = 0.5;

/// Icon attached to every platform popup.
pub const DEFAULT_ICON: &str = "/favicon.ico";

/// Platform notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Not asked yet
    #[default]
    Default,
    Granted,
    Denied,
}

impl Permission {
    fn as_u8(self) -> u8 {
        match self {
            Permission::Default => 0,
            Permission::Granted => 1,
            Permission::Denied => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Permission::Granted,
            2 => Permission::Denied,
            _ => Permission::Default,
        }
    }
}

/// Payload handed to the platform notification capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformNotification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// Notification id; used to dismiss the popup later
    pub tag: String,
    pub require_interaction: bool,
}

impl PlatformNotification {
    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            title: notification.title.clone(),
            body: notification.message.clone(),
            icon: Some(DEFAULT_ICON.to_string()),
            tag: notification.id.clone(),
            require_interaction: notification.priority == Priority::Critical,
        }
    }
}

/// Platform notification capability (desktop/browser popups).
#[async_trait]
pub trait PlatformNotifier: Send + Sync {
    /// Current permission state.
    fn permission(&self) -> Permission;

    /// Ask the user for permission. May wait on user interaction.
    async fn request_permission(&self) -> Permission;

    fn show(&self, popup: &PlatformNotification) -> Result<()>;

    fn dismiss(&self, tag: &str);
}

/// Audio cue capability.
pub trait AudioPlayer: Send + Sync {
    fn play(&self, cue: &str, volume: f32) -> Result<()>;
}

/// Cue file for a notification type.
pub fn sound_cue(notification_type: NotificationType) -> String {
    format!("/sounds/{}.mp3", notification_type.as_str())
}

/// Platform without popup support.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl PlatformNotifier for NoopNotifier {
    fn permission(&self) -> Permission {
        Permission::Denied
    }

    async fn request_permission(&self) -> Permission {
        Permission::Denied
    }

    fn show(&self, _popup: &PlatformNotification) -> Result<()> {
        Ok(())
    }

    fn dismiss(&self, _tag: &str) {}
}

/// Reports popups through the log. Always granted.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl PlatformNotifier for LogNotifier {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, popup: &PlatformNotification) -> Result<()> {
        info!(
            "[popup {}] {}: {}{}",
            popup.tag,
            popup.title,
            popup.body,
            if popup.require_interaction { " (sticky)" } else { "" }
        );
        Ok(())
    }

    fn dismiss(&self, tag: &str) {
        debug!("[popup {}] dismissed", tag);
    }
}

/// Audio device that plays nothing.
#[derive(Debug, Default)]
pub struct SilentAudio;

impl AudioPlayer for SilentAudio {
    fn play(&self, _cue: &str, _volume: f32) -> Result<()> {
        Ok(())
    }
}

/// Reports cues through the log.
#[derive(Debug, Default)]
pub struct LogAudio;

impl AudioPlayer for LogAudio {
    fn play(&self, cue: &str, volume: f32) -> Result<()> {
        info!("[sound] {} at volume {:.1}", cue, volume);
        Ok(())
    }
}

/// Fires platform popups and audio cues for eligible notifications.
pub struct Dispatcher {
    notifier: Arc<dyn PlatformNotifier>,
    audio: Arc<dyn AudioPlayer>,
    scheduler: Scheduler,
    permission: AtomicU8,
    alive: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        notifier: Arc<dyn PlatformNotifier>,
        audio: Arc<dyn AudioPlayer>,
        scheduler: Scheduler,
        alive: Arc<AtomicBool>,
    ) -> Self {
        let permission = AtomicU8::new(notifier.permission().as_u8());
        Self {
            notifier,
            audio,
            scheduler,
            permission,
            alive,
        }
    }

    pub fn permission(&self) -> Permission {
        Permission::from_u8(self.permission.load(Ordering::SeqCst))
    }

    /// Ask for popup permission if it was never asked. A result arriving after
    /// teardown is discarded.
    pub async fn request_permission(&self) -> Permission {
        if self.permission() != Permission::Default {
            return self.permission();
        }

        let result = self.notifier.request_permission().await;
        if !self.alive.load(Ordering::SeqCst) {
            debug!("Broker torn down, discarding permission result {:?}", result);
            return self.permission();
        }

        self.permission.store(result.as_u8(), Ordering::SeqCst);
        info!("Platform notification permission: {:?}", result);
        result
    }

    /// Fire every side effect the settings allow for this notification.
    pub fn fire(&self, notification: &Notification, settings: &NotificationSettings) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }

        if should_show_platform(notification, settings, self.permission()) {
            self.show_platform(notification, settings.auto_hide_delay);
        }

        if should_play_sound(notification, settings) {
            let cue = sound_cue(notification.notification_type);
            if let Err(e) = self.audio.play(&cue, CUE_VOLUME) {
                debug!("Audio cue {} failed: {}", cue, e);
            }
        }
    }

    fn show_platform(&self, notification: &Notification, auto_hide_delay: u64) {
        let popup = PlatformNotification::from_notification(notification);
        if let Err(e) = self.notifier.show(&popup) {
            debug!("Platform notification {} failed: {}", popup.tag, e);
            return;
        }

        if popup.require_interaction {
            return;
        }

        let notifier = self.notifier.clone();
        let tag = popup.tag;
        self.scheduler
            .schedule_once(Duration::from_millis(auto_hide_delay), async move {
                notifier.dismiss(&tag);
            });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("permission", &self.permission())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrokerError;
    use crate::types::{Channel, NewNotification};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        shown: Mutex<Vec<PlatformNotification>>,
        dismissed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlatformNotifier for RecordingNotifier {
        fn permission(&self) -> Permission {
            Permission::Granted
        }

        async fn request_permission(&self) -> Permission {
            Permission::Granted
        }

        fn show(&self, popup: &PlatformNotification) -> Result<()> {
            self.shown.lock().unwrap().push(popup.clone());
            Ok(())
        }

        fn dismiss(&self, tag: &str) {
            self.dismissed.lock().unwrap().push(tag.to_string());
        }
    }

    #[derive(Default)]
    struct BrokenAudio {
        attempts: Mutex<Vec<(String, f32)>>,
    }

    impl AudioPlayer for BrokenAudio {
        fn play(&self, cue: &str, volume: f32) -> Result<()> {
            self.attempts.lock().unwrap().push((cue.to_string(), volume));
            Err(BrokerError::Capability("no output device".to_string()))
        }
    }

    fn notification(priority: Priority) -> Notification {
        NewNotification {
            priority,
            channel: vec![Channel::Browser],
            ..NewNotification::new("Build", "finished")
        }
        .into_record(0)
    }

    #[test]
    fn test_sound_cues_per_type() {
        assert_eq!(sound_cue(NotificationType::Success), "/sounds/success.mp3");
        assert_eq!(sound_cue(NotificationType::System), "/sounds/system.mp3");
    }

    #[test]
    fn test_popup_sticky_only_for_critical() {
        let popup = PlatformNotification::from_notification(&notification(Priority::Critical));
        assert!(popup.require_interaction);
        let popup = PlatformNotification::from_notification(&notification(Priority::High));
        assert!(!popup.require_interaction);
        assert_eq!(popup.body, "finished");
    }

    #[tokio::test(start_paused = true)]
    async fn test_popup_auto_dismissed() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(
            notifier.clone(),
            Arc::new(SilentAudio),
            Scheduler::new(),
            Arc::new(AtomicBool::new(true)),
        );
        let settings = NotificationSettings::default();

        let normal = notification(Priority::Medium);
        let critical = notification(Priority::Critical);
        dispatcher.fire(&normal, &settings);
        dispatcher.fire(&critical, &settings);
        assert_eq!(notifier.shown.lock().unwrap().len(), 2);

        tokio::time::sleep(Duration::from_millis(settings.auto_hide_delay + 10)).await;
        let dismissed = notifier.dismissed.lock().unwrap().clone();
        assert_eq!(dismissed, vec![normal.id]);
    }

    #[tokio::test]
    async fn test_audio_failure_swallowed() {
        let audio = Arc::new(BrokenAudio::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(
            notifier.clone(),
            audio.clone(),
            Scheduler::new(),
            Arc::new(AtomicBool::new(true)),
        );
        let critical = notification(Priority::Critical);
        dispatcher.fire(&critical, &NotificationSettings::default());

        let attempts = audio.attempts.lock().unwrap().clone();
        assert_eq!(attempts, vec![("/sounds/info.mp3".to_string(), CUE_VOLUME)]);
        // The popup still went out
        assert_eq!(notifier.shown.lock().unwrap().len(), 1);

        // A second notification still reaches the audio player
        dispatcher.fire(&notification(Priority::High), &NotificationSettings::default());
        assert_eq!(audio.attempts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_fires_after_teardown() {
        let notifier = Arc::new(RecordingNotifier::default());
        let alive = Arc::new(AtomicBool::new(true));
        let dispatcher = Dispatcher::new(
            notifier.clone(),
            Arc::new(SilentAudio),
            Scheduler::new(),
            alive.clone(),
        );

        alive.store(false, Ordering::SeqCst);
        dispatcher.fire(&notification(Priority::High), &NotificationSettings::default());
        assert!(notifier.shown.lock().unwrap().is_empty());
    }
}
