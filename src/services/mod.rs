pub mod broker;
pub mod connection;
pub mod dispatch;
pub mod filter;
pub mod scheduler;
pub mod store;
pub mod sweeper;

pub use broker::{Capabilities, NotificationBroker};
pub use connection::{ConnectionManager, ConnectionState, InboundHandler};
pub use dispatch::{
    AudioPlayer, Dispatcher, LogAudio, LogNotifier, NoopNotifier, Permission,
    PlatformNotification, PlatformNotifier, SilentAudio,
};
pub use filter::{should_play_sound, should_show_platform, should_surface};
pub use scheduler::{Scheduler, TimerHandle};
pub use store::{reduce, Action, BrokerState, Store};
pub use sweeper::start_sweeper;
