use crate::services::scheduler::{Scheduler, TimerHandle};
use crate::services::store::{Action, Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Start the periodic expiration sweep. Each tick dispatches `CleanupExpired`
/// with the current time; nothing else happens.
pub fn start_sweeper(
    store: Arc<Store>,
    scheduler: &Scheduler,
    interval: Duration,
) -> Option<TimerHandle> {
    debug!("Starting expiration sweeper every {:?}", interval);
    scheduler.schedule_repeating(interval, move || {
        let now = chrono::Utc::now().timestamp_millis();
        if store.dispatch(Action::CleanupExpired { now }) {
            debug!("Expired notifications evicted");
        }
    })
}
