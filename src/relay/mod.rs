//! Channel Relay Module
//!
//! Mirrors messages from a source channel into a target channel through a
//! webhook until the relay is stopped.

pub mod controller;
pub mod provisioner;
pub mod registry;
pub mod rewriter;
pub mod session;

pub use controller::{compose_payload, RelayController, RelayOutcome};
pub use provisioner::{WebhookProvisioner, DEFAULT_WEBHOOK_NAME};
pub use registry::RelayRegistry;
pub use session::{ListenerHandle, RelaySession, RelayStats, SessionActivity, StopSignal};
