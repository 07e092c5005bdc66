//! Notification state store.
//!
//! The state tree is immutable: [`reduce`] maps `(state, action)` to a new
//! `Arc<BrokerState>`, or hands back the same `Arc` when the action changes
//! nothing, so observers can skip work with `Arc::ptr_eq`. [`Store`] holds the
//! current tree in a `watch` channel, which serializes dispatches and wakes
//! subscribers only on real changes.

use crate::types::{Notification, NotificationSettings, PartialSettings};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Complete broker state observed by the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerState {
    /// Newest first, bounded by `settings.max_notifications`.
    pub notifications: Vec<Notification>,
    /// Number of entries in `notifications` with `read == false`.
    pub unread_count: usize,
    pub is_connected: bool,
    pub settings: NotificationSettings,
}

impl BrokerState {
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            notifications: Vec::new(),
            unread_count: 0,
            is_connected: false,
            settings,
        }
    }

    pub fn find(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// State transitions.
#[derive(Debug, Clone)]
pub enum Action {
    AddNotification(Notification),
    RemoveNotification(String),
    MarkRead(String),
    MarkAllRead,
    ClearAll,
    UpdateSettings(PartialSettings),
    SetConnectionStatus(bool),
    /// Evict records whose `expires_at <= now` (ms)
    CleanupExpired { now: i64 },
}

/// Apply an action. Total: every action on every state yields a state.
pub fn reduce(state: &Arc<BrokerState>, action: Action) -> Arc<BrokerState> {
    match action {
        Action::AddNotification(record) => {
            if state.find(&record.id).is_some() {
                return Arc::clone(state);
            }

            let max = state.settings.max_notifications;
            let added_unread = usize::from(!record.read);

            let mut notifications = Vec::with_capacity((state.notifications.len() + 1).min(max));
            notifications.push(record);
            notifications.extend(state.notifications.iter().cloned());

            // Only the overflow tail is inspected; the rest of the count carries over.
            let dropped_unread = if notifications.len() > max {
                notifications.drain(max..).filter(|n| !n.read).count()
            } else {
                0
            };

            Arc::new(BrokerState {
                notifications,
                unread_count: state.unread_count + added_unread - dropped_unread,
                is_connected: state.is_connected,
                settings: state.settings.clone(),
            })
        }
        Action::RemoveNotification(id) => {
            let Some(pos) = state.notifications.iter().position(|n| n.id == id) else {
                return Arc::clone(state);
            };

            let mut next = (**state).clone();
            let removed = next.notifications.remove(pos);
            if !removed.read {
                next.unread_count -= 1;
            }
            Arc::new(next)
        }
        Action::MarkRead(id) => {
            let Some(pos) = state
                .notifications
                .iter()
                .position(|n| n.id == id && !n.read)
            else {
                return Arc::clone(state);
            };

            let mut next = (**state).clone();
            next.notifications[pos].read = true;
            next.unread_count -= 1;
            Arc::new(next)
        }
        Action::MarkAllRead => {
            if state.unread_count == 0 {
                return Arc::clone(state);
            }

            let mut next = (**state).clone();
            for n in next.notifications.iter_mut() {
                n.read = true;
            }
            next.unread_count = 0;
            Arc::new(next)
        }
        Action::ClearAll => {
            if state.notifications.is_empty() && state.unread_count == 0 {
                return Arc::clone(state);
            }

            Arc::new(BrokerState {
                notifications: Vec::new(),
                unread_count: 0,
                is_connected: state.is_connected,
                settings: state.settings.clone(),
            })
        }
        Action::UpdateSettings(partial) => {
            let mut settings = state.settings.clone();
            partial.apply_to(&mut settings);
            if settings == state.settings {
                return Arc::clone(state);
            }

            Arc::new(BrokerState {
                notifications: state.notifications.clone(),
                unread_count: state.unread_count,
                is_connected: state.is_connected,
                settings,
            })
        }
        Action::SetConnectionStatus(connected) => {
            if state.is_connected == connected {
                return Arc::clone(state);
            }

            let mut next = (**state).clone();
            next.is_connected = connected;
            Arc::new(next)
        }
        Action::CleanupExpired { now } => {
            if !state.notifications.iter().any(|n| n.is_expired(now)) {
                return Arc::clone(state);
            }

            let mut removed_unread = 0;
            let notifications: Vec<Notification> = state
                .notifications
                .iter()
                .filter(|n| {
                    let expired = n.is_expired(now);
                    if expired && !n.read {
                        removed_unread += 1;
                    }
                    !expired
                })
                .cloned()
                .collect();

            Arc::new(BrokerState {
                notifications,
                unread_count: state.unread_count - removed_unread,
                is_connected: state.is_connected,
                settings: state.settings.clone(),
            })
        }
    }
}

/// Single source of truth for broker state.
#[derive(Debug)]
pub struct Store {
    tx: watch::Sender<Arc<BrokerState>>,
}

impl Store {
    pub fn new(settings: NotificationSettings) -> Self {
        let (tx, _) = watch::channel(Arc::new(BrokerState::new(settings)));
        Self { tx }
    }

    /// Apply an action. Returns whether the state changed.
    pub fn dispatch(&self, action: Action) -> bool {
        self.tx.send_if_modified(|current| {
            let next = reduce(current, action);
            if Arc::ptr_eq(&next, current) {
                false
            } else {
                debug!(
                    "State updated: {} notifications, {} unread",
                    next.notifications.len(),
                    next.unread_count
                );
                *current = next;
                true
            }
        })
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> Arc<BrokerState> {
        Arc::clone(&self.tx.borrow())
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<BrokerState>> {
        self.tx.subscribe()
    }
}
