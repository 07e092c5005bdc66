use notify_broker::services::{LogAudio, LogNotifier};
use notify_broker::{BrokerConfig, Capabilities, NotificationBroker};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notify_broker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = BrokerConfig::from_env()
        .with_error_hook(|e| error!("Notification broker error: {}", e));
    config.validate()?;
    info!("Starting notification broker against {}", config.endpoint_url);

    let broker = NotificationBroker::create(
        config,
        Capabilities {
            notifier: Arc::new(LogNotifier),
            audio: Arc::new(LogAudio),
        },
    );
    broker.connect();

    let mut updates = broker.subscribe();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                info!(
                    "{} notifications, {} unread, connected: {}",
                    state.len(),
                    state.unread_count,
                    state.is_connected
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    broker.teardown();
    Ok(())
}
