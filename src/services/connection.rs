//! Push connection manager.
//!
//! Owns the WebSocket to the notification server. Lifecycle:
//! `Idle -> Connecting -> Open -> Closed`, and from `Closed` back to
//! `Connecting` once the reconnect delay elapses. Only unexpected closures
//! schedule a reconnect; [`ConnectionManager::disconnect`] never does.
//!
//! Every connection attempt carries a generation number. `connect` and
//! `disconnect` bump it, so a task belonging to an older attempt can still
//! finish but can no longer touch the manager's state.

use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::services::scheduler::{Scheduler, TimerHandle};
use crate::services::store::{Action, Store};
use crate::types::{ClientFrame, Notification, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Receives normalized notifications from the push channel.
pub type InboundHandler = Arc<dyn Fn(Notification) + Send + Sync>;

/// How a connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Closure {
    /// `disconnect` was called, or the attempt was superseded
    Deliberate,
    /// The server closed the stream
    Remote,
}

struct ConnectionInner {
    state: ConnectionState,
    generation: u64,
    shutdown: Option<oneshot::Sender<()>>,
    reconnect: Option<TimerHandle>,
}

/// Owner of the push channel and its reconnect policy.
pub struct ConnectionManager {
    config: BrokerConfig,
    store: Arc<Store>,
    scheduler: Scheduler,
    on_notification: InboundHandler,
    inner: Mutex<ConnectionInner>,
}

impl ConnectionManager {
    pub fn new(
        config: BrokerConfig,
        store: Arc<Store>,
        scheduler: Scheduler,
        on_notification: InboundHandler,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            scheduler,
            on_notification,
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Idle,
                generation: 0,
                shutdown: None,
                reconnect: None,
            }),
        })
    }

    fn inner(&self) -> MutexGuard<'_, ConnectionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.inner().state
    }

    /// Open the push channel. No-op while connecting or open.
    pub fn connect(self: &Arc<Self>) {
        if !self.store.state().settings.enable_websocket {
            warn!("WebSocket delivery disabled, not connecting");
            return;
        }
        if self.scheduler.is_closed() {
            debug!("Broker torn down, not connecting");
            return;
        }

        let mut inner = self.inner();
        if matches!(inner.state, ConnectionState::Connecting | ConnectionState::Open) {
            return;
        }

        if let Some(timer) = inner.reconnect.take() {
            timer.cancel();
        }

        inner.generation += 1;
        inner.state = ConnectionState::Connecting;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        inner.shutdown = Some(shutdown_tx);
        let generation = inner.generation;
        drop(inner);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run(generation, shutdown_rx).await;
        });
    }

    /// Close the push channel deliberately. Never triggers a reconnect.
    pub fn disconnect(&self) {
        let mut inner = self.inner();
        inner.generation += 1;
        if let Some(timer) = inner.reconnect.take() {
            timer.cancel();
        }
        if let Some(shutdown) = inner.shutdown.take() {
            let _ = shutdown.send(());
        }
        if inner.state != ConnectionState::Idle {
            inner.state = ConnectionState::Closed;
        }
        drop(inner);

        self.store.dispatch(Action::SetConnectionStatus(false));
        info!("Disconnected from notification server");
    }

    async fn run(self: Arc<Self>, generation: u64, shutdown: oneshot::Receiver<()>) {
        match self.run_connection(generation, shutdown).await {
            Ok(Closure::Deliberate) => return,
            Ok(Closure::Remote) => {
                warn!("Notification WebSocket closed by server");
            }
            Err(e) => {
                error!("Notification WebSocket error: {}", e);
                self.report(&e);
            }
        }
        self.handle_unexpected_close(generation);
    }

    async fn run_connection(
        &self,
        generation: u64,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<Closure> {
        info!("Connecting to notification server at {}", self.config.endpoint_url);

        let ws_stream = tokio::select! {
            result = connect_async(self.config.endpoint_url.as_str()) => result?.0,
            _ = &mut shutdown => return Ok(Closure::Deliberate),
        };
        let (mut write, mut read) = ws_stream.split();

        if self.config.has_credentials() {
            let auth = ClientFrame::Auth {
                api_key: self.config.api_key.clone(),
                user_id: self.config.user_id.clone(),
                tenant_id: self.config.tenant_id.clone(),
            };
            write.send(Message::Text(serde_json::to_string(&auth)?)).await?;
        }

        {
            let mut inner = self.inner();
            if inner.generation != generation {
                return Ok(Closure::Deliberate);
            }
            inner.state = ConnectionState::Open;
        }
        self.store.dispatch(Action::SetConnectionStatus(true));
        info!("Connected to notification server");

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_message(&text, generation);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(Closure::Remote);
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        _ => {}
                    }
                }
                _ = &mut shutdown => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(Closure::Deliberate);
                }
            }
        }
    }

    fn handle_message(&self, text: &str, generation: u64) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(ServerFrame::Notification { notification }) => {
                // Frames read after disconnect() belong to a superseded connection.
                if self.inner().generation != generation {
                    debug!("Dropping frame from superseded connection");
                    return;
                }
                let record = notification.normalize(chrono::Utc::now().timestamp_millis());
                debug!("Received notification {} ({})", record.id, record.title);
                (self.on_notification)(record);
            }
            Ok(ServerFrame::Other) => {
                debug!("Ignoring non-notification frame");
            }
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                self.report(&BrokerError::Json(e));
            }
        }
    }

    fn handle_unexpected_close(self: &Arc<Self>, generation: u64) {
        {
            let mut inner = self.inner();
            if inner.generation != generation {
                return;
            }
            inner.state = ConnectionState::Closed;
            inner.shutdown = None;
        }
        self.store.dispatch(Action::SetConnectionStatus(false));

        if !self.store.state().settings.enable_websocket {
            info!("WebSocket delivery disabled, not reconnecting");
            return;
        }

        let delay = self.config.reconnect_delay;
        let manager = Arc::downgrade(self);
        let timer = self.scheduler.schedule_once(delay, async move {
            if let Some(manager) = manager.upgrade() {
                manager.reconnect(generation);
            }
        });

        let mut inner = self.inner();
        if inner.generation == generation {
            inner.reconnect = timer;
            info!("Reconnecting in {:?}", delay);
        } else if let Some(timer) = timer {
            // disconnect() raced us between the two locks
            timer.cancel();
        }
    }

    fn reconnect(self: &Arc<Self>, generation: u64) {
        {
            let mut inner = self.inner();
            if inner.generation != generation {
                return;
            }
            inner.reconnect = None;
        }
        info!("Reconnecting to notification server");
        self.connect();
    }

    fn report(&self, error: &BrokerError) {
        if let Some(hook) = &self.config.on_error {
            hook.call(error);
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint_url", &self.config.endpoint_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
