//! Tracewire Alerts
//!
//! Unified alert dispatch: one [`AlertPayload`] fanned out concurrently to every configured
//! [`NotificationProvider`], with per-provider failure isolation.

pub mod dispatcher;
pub mod payload;
pub mod provider;
pub mod providers;

pub use dispatcher::{
    Alert, AlertDispatcher, AlertDispatcherBuilder, AlertKind, DispatchFailure, DispatchReport,
};
pub use payload::{AlertPayload, ErrorDetails};
pub use provider::{AlertError, AlertResult, Delivery, NotificationProvider};
pub use providers::{DiscordProvider, SlackProvider, TeamsProvider};
