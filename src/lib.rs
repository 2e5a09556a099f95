//! RelayBot Library
//!
//! Discord bot that mirrors one channel into another through a webhook,
//! driven by an administrator-only `relay` command.

pub mod command;
pub mod config;
pub mod discord;
pub mod metrics;
pub mod platform;
pub mod relay;
pub mod shutdown;

pub use command::CommandDispatcher;
pub use config::Config;
pub use relay::RelayController;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the relay bot
pub type Result<T> = anyhow::Result<T>;
