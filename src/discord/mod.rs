//! Discord Module
//!
//! REST client and gateway connection backing the [`ChatPlatform`](crate::platform::ChatPlatform) seam.

pub mod gateway;
pub mod rest;
pub mod types;

pub use gateway::{GatewayClient, DEFAULT_INTENTS};
pub use rest::{DiscordClient, DEFAULT_API_BASE};
