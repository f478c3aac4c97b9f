//! The transmission unit handed to the gateway client.

pub mod wire;

use crate::error::PushError;
use crate::payload::Payload;

/// Deliver immediately.
pub const PRIORITY_IMMEDIATE: u8 = 10;
/// Deliver at a time that conserves the device's power.
pub const PRIORITY_CONSERVE_POWER: u8 = 5;

/// A single push notification.
///
/// `identifier` is the 32-bit id the gateway echoes back in error responses;
/// leave it at 0 to have the client assign the next counter value on
/// submission. `id` is an opaque caller-side correlation handle that is never
/// sent to Apple.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// 64 hex characters identifying the target device.
    pub device_token: String,
    /// Wire identifier; 0 means "assign on submission".
    pub identifier: u32,
    /// Caller correlation id, echoed back on failure reports only.
    pub id: Option<String>,
    /// Seconds since epoch after which the gateway discards the
    /// notification; 0 means "do not store".
    pub expiration: u32,
    /// 10 (immediate) or 5 (conserve power); anything else is rejected
    /// locally.
    pub priority: u8,
    pub payload: Payload,
}

impl Notification {
    /// Start building a notification for the given device.
    pub fn builder(device_token: impl Into<String>) -> NotificationBuilder {
        NotificationBuilder::new(device_token)
    }
}

/// Builder for [`Notification`].
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    device_token: String,
    identifier: u32,
    id: Option<String>,
    expiration: u32,
    priority: u8,
    payload: Payload,
}

impl NotificationBuilder {
    pub fn new(device_token: impl Into<String>) -> Self {
        Self {
            device_token: device_token.into(),
            identifier: 0,
            id: None,
            expiration: 0,
            priority: PRIORITY_IMMEDIATE,
            payload: Payload::default(),
        }
    }

    /// Use a caller-chosen wire identifier instead of the assigned counter.
    pub fn identifier(mut self, identifier: u32) -> Self {
        self.identifier = identifier;
        self
    }

    /// Attach an opaque correlation id for failure reports.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Expiration as seconds since epoch; 0 disables store-and-forward.
    pub fn expiration(mut self, expiration: u32) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Notification {
        Notification {
            device_token: self.device_token,
            identifier: self.identifier,
            id: self.id,
            expiration: self.expiration,
            priority: self.priority,
            payload: self.payload,
        }
    }
}

/// A notification the gateway rejected or the client could not encode,
/// paired with the reason. Delivered on the client's failure channel.
#[derive(Debug)]
pub struct FailedNotification {
    pub notification: Notification,
    pub error: PushError,
}
