//! # bgloc-service - Location Service Orchestration
//!
//! Owns the tracking session, the permission gate and event delivery, and
//! drives them with a TEA-style loop:
//!
//! - [`Message`] - everything the service reacts to (host commands, lifecycle
//!   hooks, provider callbacks, timers)
//! - [`handler::update`] - applies one message to the [`ServiceRegistry`]
//! - [`actions::handle_action`] - runs the resulting provider work on tokio tasks
//! - [`Engine`] - single owner of the registry; hosts use a [`ServiceHandle`]
//!
//! ## Components
//! - [`PermissionGate`] - cached permission state and token-correlated prompts
//! - [`TrackingSession`] - session state machine, fix ordering and retry policy
//! - [`EventChannel`] - at-most-once delivery to the host listener
//! - [`ServiceRegistry`] - host binding plus the current session
//!
//! ## Configuration
//! - [`config::Settings`] - `config.toml` (retry, permission timeout, listener capacity)

pub mod actions;
pub mod config;
pub mod engine;
pub mod event_channel;
pub mod handler;
pub mod message;
pub mod permission;
pub mod registry;
pub mod session;

// Re-export primary types
pub use config::Settings;
pub use engine::{Engine, ServiceHandle};
pub use event_channel::{listener_channel, EventChannel};
pub use handler::{UpdateAction, UpdateResult};
pub use message::Message;
pub use permission::{
    PermissionGate, PermissionOutcome, PermissionPrompt, PermissionRequest, PermissionToken,
};
pub use registry::{HostBinding, ServiceRegistry, ServiceStatus};
pub use session::{ProviderCommand, TrackingSession};
