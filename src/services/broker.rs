//! Notification broker facade.
//!
//! Composes the store, delivery filter, side-effect dispatchers, connection
//! manager and expiration sweeper behind one service object. The rendering
//! layer holds an `Arc<NotificationBroker>` and observes state through
//! [`NotificationBroker::subscribe`].
//!
//! Two ingestion paths exist. Locally originated notifications
//! ([`NotificationBroker::add_notification`] and the toast helpers) are dropped
//! entirely when the delivery filter rejects them. Notifications arriving over
//! the push channel are always stored; the filter only gates their popup and
//! sound.

use crate::config::BrokerConfig;
use crate::services::connection::{ConnectionManager, ConnectionState, InboundHandler};
use crate::services::dispatch::{
    AudioPlayer, Dispatcher, NoopNotifier, Permission, PlatformNotifier, SilentAudio,
};
use crate::services::filter::should_surface;
use crate::services::scheduler::{Scheduler, TimerHandle};
use crate::services::store::{Action, BrokerState, Store};
use crate::services::sweeper::start_sweeper;
use crate::types::{
    Channel, NewNotification, Notification, NotificationSettings, NotificationType,
    PartialSettings, Priority, ToastOptions,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// External capabilities the broker drives.
#[derive(Clone)]
pub struct Capabilities {
    pub notifier: Arc<dyn PlatformNotifier>,
    pub audio: Arc<dyn AudioPlayer>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            notifier: Arc::new(NoopNotifier),
            audio: Arc::new(SilentAudio),
        }
    }
}

/// Real-time notification broker.
pub struct NotificationBroker {
    config: BrokerConfig,
    store: Arc<Store>,
    scheduler: Scheduler,
    dispatcher: Arc<Dispatcher>,
    connection: Arc<ConnectionManager>,
    sweeper: Option<TimerHandle>,
    alive: Arc<AtomicBool>,
}

impl NotificationBroker {
    /// Create a broker and start its sweeper. Must be called inside a tokio runtime.
    /// The push channel stays closed until [`NotificationBroker::connect`].
    pub fn create(config: BrokerConfig, capabilities: Capabilities) -> Arc<Self> {
        let settings = NotificationSettings {
            max_notifications: config.max_notifications,
            ..Default::default()
        };
        let store = Arc::new(Store::new(settings));
        let scheduler = Scheduler::new();
        let alive = Arc::new(AtomicBool::new(true));

        let dispatcher = Arc::new(Dispatcher::new(
            capabilities.notifier,
            capabilities.audio,
            scheduler.clone(),
            alive.clone(),
        ));

        let inbound: InboundHandler = {
            let store = store.clone();
            let dispatcher = dispatcher.clone();
            Arc::new(move |record: Notification| ingest_push(&store, &dispatcher, record))
        };
        let connection =
            ConnectionManager::new(config.clone(), store.clone(), scheduler.clone(), inbound);

        let sweeper = start_sweeper(store.clone(), &scheduler, config.sweep_interval);

        if store.state().settings.enable_browser && dispatcher.permission() == Permission::Default
        {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.request_permission().await;
            });
        }

        info!("Notification broker created for {}", config.endpoint_url);

        Arc::new(Self {
            config,
            store,
            scheduler,
            dispatcher,
            connection,
            sweeper,
            alive,
        })
    }

    /// Add a locally originated notification. Returns its id, or `None` when the
    /// delivery filter rejected it (nothing is stored or fired in that case).
    pub fn add_notification(&self, data: NewNotification) -> Option<String> {
        if !self.is_alive() {
            return None;
        }

        let record = data.into_record(chrono::Utc::now().timestamp_millis());
        let state = self.store.state();
        if !should_surface(&record, &state.settings) {
            debug!(
                "Filtered {} notification '{}'",
                record.priority.as_str(),
                record.title
            );
            return None;
        }

        let id = record.id.clone();
        if self.store.dispatch(Action::AddNotification(record.clone())) {
            self.dispatcher.fire(&record, &state.settings);
        }
        Some(id)
    }

    pub fn remove_notification(&self, id: &str) {
        self.store.dispatch(Action::RemoveNotification(id.to_string()));
    }

    pub fn mark_as_read(&self, id: &str) {
        self.store.dispatch(Action::MarkRead(id.to_string()));
    }

    pub fn mark_all_as_read(&self) {
        self.store.dispatch(Action::MarkAllRead);
    }

    pub fn clear_all(&self) {
        self.store.dispatch(Action::ClearAll);
    }

    /// Shallow-merge settings. Turning WebSocket delivery off closes the push channel.
    pub fn update_settings(&self, partial: PartialSettings) {
        if partial.is_empty() {
            debug!("Ignoring empty settings update");
            return;
        }

        let disable_websocket = partial.enable_websocket == Some(false);
        self.store.dispatch(Action::UpdateSettings(partial));
        if disable_websocket {
            self.connection.disconnect();
        }
    }

    pub fn connect(&self) {
        if self.is_alive() {
            self.connection.connect();
        }
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Add a toast: medium priority on the browser channel unless overridden.
    /// Non-persistent toasts expire after `options.duration` or the configured default.
    pub fn toast(&self, message: impl Into<String>, options: ToastOptions) -> Option<String> {
        let notification_type = options.notification_type.unwrap_or_default();
        let expires_at = if options.persistent {
            None
        } else {
            let duration = options.duration.unwrap_or(self.config.default_duration);
            let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
            Some(chrono::Utc::now().timestamp_millis().saturating_add(millis))
        };

        self.add_notification(NewNotification {
            title: options
                .title
                .unwrap_or_else(|| default_title(notification_type).to_string()),
            message: message.into(),
            notification_type,
            priority: options.priority.unwrap_or(Priority::Medium),
            channel: options.channel.unwrap_or_else(|| vec![Channel::Browser]),
            persistent: options.persistent,
            expires_at,
            actions: options.actions,
            data: None,
        })
    }

    pub fn success(&self, title: &str, message: &str) -> Option<String> {
        self.typed_toast(NotificationType::Success, title, message)
    }

    pub fn error(&self, title: &str, message: &str) -> Option<String> {
        self.typed_toast(NotificationType::Error, title, message)
    }

    pub fn warning(&self, title: &str, message: &str) -> Option<String> {
        self.typed_toast(NotificationType::Warning, title, message)
    }

    pub fn info(&self, title: &str, message: &str) -> Option<String> {
        self.typed_toast(NotificationType::Info, title, message)
    }

    fn typed_toast(
        &self,
        notification_type: NotificationType,
        title: &str,
        message: &str,
    ) -> Option<String> {
        self.toast(
            message,
            ToastOptions {
                title: Some(title.to_string()),
                notification_type: Some(notification_type),
                ..Default::default()
            },
        )
    }

    /// Current state snapshot.
    pub fn state(&self) -> Arc<BrokerState> {
        self.store.state()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<BrokerState>> {
        self.store.subscribe()
    }

    pub fn unread_count(&self) -> usize {
        self.store.state().unread_count
    }

    pub fn is_connected(&self) -> bool {
        self.store.state().is_connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn permission(&self) -> Permission {
        self.dispatcher.permission()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// End the broker's lifecycle: close the push channel without reconnect,
    /// cancel every timer and discard late permission results. Idempotent.
    pub fn teardown(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }

        self.connection.disconnect();
        if let Some(sweeper) = &self.sweeper {
            sweeper.cancel();
        }
        self.scheduler.cancel_all();
        info!("Notification broker torn down");
    }
}

impl Drop for NotificationBroker {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for NotificationBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBroker")
            .field("endpoint_url", &self.config.endpoint_url)
            .field("alive", &self.is_alive())
            .field("connection", &self.connection.state())
            .finish_non_exhaustive()
    }
}

/// Push-channel ingestion: always stored, side effects only when surfaced.
fn ingest_push(store: &Store, dispatcher: &Dispatcher, record: Notification) {
    let settings = store.state().settings.clone();
    let surfaced = should_surface(&record, &settings);
    if store.dispatch(Action::AddNotification(record.clone())) && surfaced {
        dispatcher.fire(&record, &settings);
    }
}

fn default_title(notification_type: NotificationType) -> &'static str {
    match notification_type {
        NotificationType::Success => "Success",
        NotificationType::Error => "Error",
        NotificationType::Warning => "Warning",
        NotificationType::Info => "Info",
        NotificationType::System => "System",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dispatch::PlatformNotification;
    use crate::types::PriorityVisibility;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingNotifier {
        shown: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlatformNotifier for RecordingNotifier {
        fn permission(&self) -> Permission {
            Permission::Granted
        }

        async fn request_permission(&self) -> Permission {
            Permission::Granted
        }

        fn show(&self, popup: &PlatformNotification) -> crate::error::Result<()> {
            self.shown.lock().unwrap().push(popup.title.clone());
            Ok(())
        }

        fn dismiss(&self, _tag: &str) {}
    }

    #[derive(Default)]
    struct RecordingAudio {
        played: Mutex<Vec<String>>,
    }

    impl AudioPlayer for RecordingAudio {
        fn play(&self, cue: &str, _volume: f32) -> crate::error::Result<()> {
            self.played.lock().unwrap().push(cue.to_string());
            Ok(())
        }
    }

    fn broker() -> Arc<NotificationBroker> {
        NotificationBroker::create(
            BrokerConfig::new("ws://127.0.0.1:9/ws"),
            Capabilities::default(),
        )
    }

    fn recording_broker() -> (Arc<NotificationBroker>, Arc<RecordingNotifier>, Arc<RecordingAudio>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let audio = Arc::new(RecordingAudio::default());
        let broker = NotificationBroker::create(
            BrokerConfig::new("ws://127.0.0.1:9/ws"),
            Capabilities {
                notifier: notifier.clone(),
                audio: audio.clone(),
            },
        );
        (broker, notifier, audio)
    }

    fn low_muted() -> PartialSettings {
        PartialSettings {
            priorities: Some(PriorityVisibility {
                low: false,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn recording_dispatcher() -> (Dispatcher, Arc<RecordingNotifier>, Arc<RecordingAudio>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let audio = Arc::new(RecordingAudio::default());
        let dispatcher = Dispatcher::new(
            notifier.clone(),
            audio.clone(),
            Scheduler::new(),
            Arc::new(AtomicBool::new(true)),
        );
        (dispatcher, notifier, audio)
    }

    fn record(priority: Priority) -> Notification {
        NewNotification {
            priority,
            ..NewNotification::new("Build", "push")
        }
        .into_record(0)
    }

    #[tokio::test]
    async fn test_push_path_stores_filtered_notification_silently() {
        let store = Store::new(NotificationSettings::default());
        store.dispatch(Action::UpdateSettings(low_muted()));
        let (dispatcher, notifier, audio) = recording_dispatcher();

        ingest_push(&store, &dispatcher, record(Priority::Low));

        assert_eq!(store.state().len(), 1);
        assert_eq!(store.state().unread_count, 1);
        assert!(notifier.shown.lock().unwrap().is_empty());
        assert!(audio.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_path_fires_for_surfaced_notification() {
        let store = Store::new(NotificationSettings::default());
        let (dispatcher, notifier, audio) = recording_dispatcher();

        ingest_push(&store, &dispatcher, record(Priority::High));

        assert_eq!(store.state().len(), 1);
        assert_eq!(*notifier.shown.lock().unwrap(), vec!["Build".to_string()]);
        assert_eq!(*audio.played.lock().unwrap(), vec!["/sounds/info.mp3".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_push_fires_once() {
        let store = Store::new(NotificationSettings::default());
        let (dispatcher, notifier, audio) = recording_dispatcher();
        let n = record(Priority::Critical);

        ingest_push(&store, &dispatcher, n.clone());
        ingest_push(&store, &dispatcher, n);

        assert_eq!(store.state().len(), 1);
        assert_eq!(notifier.shown.lock().unwrap().len(), 1);
        assert_eq!(audio.played.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_filtered_local_notification_is_dropped_silently() {
        let (broker, notifier, audio) = recording_broker();
        broker.update_settings(low_muted());

        let id = broker.add_notification(NewNotification {
            priority: Priority::Low,
            ..NewNotification::new("Low noise", "local")
        });

        assert!(id.is_none());
        assert!(broker.state().is_empty());
        assert!(notifier.shown.lock().unwrap().is_empty());
        assert!(audio.played.lock().unwrap().is_empty());
        broker.teardown();
    }

    #[tokio::test]
    async fn test_surfaced_local_notification_fires_once() {
        let (broker, notifier, audio) = recording_broker();

        let id = broker.add_notification(NewNotification {
            priority: Priority::High,
            notification_type: NotificationType::Warning,
            ..NewNotification::new("Disk almost full", "92% used")
        });

        assert!(id.is_some());
        assert_eq!(broker.unread_count(), 1);
        assert_eq!(
            *notifier.shown.lock().unwrap(),
            vec!["Disk almost full".to_string()]
        );
        assert_eq!(
            *audio.played.lock().unwrap(),
            vec!["/sounds/warning.mp3".to_string()]
        );

        // Medium priority: popup only
        broker.info("Saved", "draft stored");
        assert_eq!(notifier.shown.lock().unwrap().len(), 2);
        assert_eq!(audio.played.lock().unwrap().len(), 1);
        broker.teardown();
    }

    #[tokio::test]
    async fn test_toast_defaults() {
        let broker = broker();
        let id = broker.toast("Saved", ToastOptions::default()).unwrap();

        let state = broker.state();
        let n = state.find(&id).unwrap();
        assert_eq!(n.title, "Info");
        assert_eq!(n.priority, Priority::Medium);
        assert_eq!(n.channel, vec![Channel::Browser]);
        let expires_at = n.expires_at.unwrap();
        assert!(expires_at >= n.timestamp + 5000);
        assert!(expires_at <= n.timestamp + 6000);
        broker.teardown();
    }

    #[tokio::test]
    async fn test_persistent_toast_has_no_expiry() {
        let broker = broker();
        let id = broker
            .toast(
                "Keep me",
                ToastOptions {
                    persistent: true,
                    duration: Some(Duration::from_millis(1)),
                    ..Default::default()
                },
            )
            .unwrap();

        let state = broker.state();
        let n = state.find(&id).unwrap();
        assert!(n.persistent);
        assert!(n.expires_at.is_none());
        broker.teardown();
    }

    #[tokio::test]
    async fn test_typed_shorthands() {
        let broker = broker();
        let ok = broker.success("Deployed", "v1.2.3 is live").unwrap();
        let err = broker.error("Build failed", "see logs").unwrap();

        let state = broker.state();
        assert_eq!(state.find(&ok).unwrap().notification_type, NotificationType::Success);
        assert_eq!(state.find(&err).unwrap().notification_type, NotificationType::Error);
        assert_eq!(state.find(&err).unwrap().title, "Build failed");
        assert_eq!(broker.unread_count(), 2);
        broker.teardown();
    }

    #[tokio::test]
    async fn test_empty_settings_update_keeps_state() {
        let broker = broker();
        let before = broker.state();
        broker.update_settings(PartialSettings::default());
        assert!(Arc::ptr_eq(&before, &broker.state()));

        broker.update_settings(PartialSettings {
            sound_enabled: Some(false),
            ..Default::default()
        });
        assert!(!broker.state().settings.sound_enabled);
        broker.teardown();
    }

    #[tokio::test]
    async fn test_huge_toast_duration_saturates() {
        let broker = broker();
        let id = broker
            .toast(
                "Forever-ish",
                ToastOptions {
                    duration: Some(Duration::MAX),
                    ..Default::default()
                },
            )
            .unwrap();

        let state = broker.state();
        assert_eq!(state.find(&id).unwrap().expires_at, Some(i64::MAX));
        broker.teardown();
    }

    #[tokio::test]
    async fn test_nothing_added_after_teardown() {
        let broker = broker();
        broker.teardown();
        assert!(!broker.is_alive());
        assert!(broker.info("late", "ignored").is_none());
        assert!(broker.state().is_empty());
        broker.teardown();
    }
}
