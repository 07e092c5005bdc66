//! Notify Broker - client-side real-time notification broker

pub mod config;
pub mod error;
pub mod services;
pub mod types;

// Re-export commonly used types
pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use services::{Capabilities, NotificationBroker};
pub use types::*;
