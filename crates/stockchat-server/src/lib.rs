pub mod bridge;
pub mod client;
pub mod hub;
pub mod server;

pub use hub::{ClientId, ClientSession, HubHandle, Outbound};
pub use server::{start, ServerConfig, ServerHandle};
