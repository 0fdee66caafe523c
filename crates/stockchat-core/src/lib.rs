pub mod config;
pub mod history;
pub mod message;

pub use config::{BrokerConfig, ConfigError};
pub use history::History;
pub use message::ChatMessage;
