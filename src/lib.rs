//! Client for Apple's legacy binary push gateway and its companion
//! feedback service.
//!
//! The gateway (port 2195) accepts "enhanced format" binary frames and
//! never acknowledges success; rejections arrive asynchronously as a
//! 6-byte error packet followed by a connection close that silently
//! discards everything sent after the offending notification. [`Client`]
//! hides that protocol behind fire-and-forget sends: it tracks the recent
//! send window, reconnects, replays the discarded survivors and reports
//! failures on a channel. [`FeedbackClient`] drains the feedback service
//! (port 2196) as a lazy sequence of rejected device tokens.

// Infrastructure layer (shared components)
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;

// Delivery layer
pub mod client;
pub mod feedback;
pub mod notification;
pub mod payload;

// Re-export the common surface
pub use client::{Client, ClientOptions, ClientStats};
pub use config::Settings;
pub use connection::{Connection, Endpoint, TlsConnection};
pub use error::{ApnsStatus, PushError, Result};
pub use feedback::{FeedbackClient, FeedbackStream};
pub use notification::wire::{ErrorResponse, FeedbackRecord};
pub use notification::{
    FailedNotification, Notification, NotificationBuilder, PRIORITY_CONSERVE_POWER,
    PRIORITY_IMMEDIATE,
};
pub use payload::{Alert, AlertBody, Badge, Payload};
