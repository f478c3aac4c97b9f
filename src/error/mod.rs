//! Error taxonomy for the gateway and feedback clients.
//!
//! Two layers: `ApnsStatus` mirrors the status byte of the gateway's 6-byte
//! error-response packet, and `PushError` is the error type surfaced to
//! callers. Statuses 2-8 mark the notification itself as malformed
//! (permanent); everything else means the connection died but the
//! notification may still be deliverable (transient).

use thiserror::Error;

/// Maximum serialized payload size accepted by the legacy gateway.
pub const MAX_PAYLOAD_BYTES: usize = 2048;

/// Status byte of an error-response packet, decoded to its symbolic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApnsStatus {
    #[error("no errors encountered")]
    NoErrors,
    #[error("processing error")]
    ProcessingError,
    #[error("missing device token")]
    MissingDeviceToken,
    #[error("missing topic")]
    MissingTopic,
    #[error("missing payload")]
    MissingPayload,
    #[error("invalid token size")]
    InvalidTokenSize,
    #[error("invalid topic size")]
    InvalidTopicSize,
    #[error("invalid payload size")]
    InvalidPayloadSize,
    #[error("invalid token")]
    InvalidToken,
    #[error("gateway shutdown")]
    Shutdown,
    #[error("unknown error")]
    Unknown,
}

impl ApnsStatus {
    /// Map a raw status byte to its kind. Unlisted codes collapse to
    /// `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ApnsStatus::NoErrors,
            1 => ApnsStatus::ProcessingError,
            2 => ApnsStatus::MissingDeviceToken,
            3 => ApnsStatus::MissingTopic,
            4 => ApnsStatus::MissingPayload,
            5 => ApnsStatus::InvalidTokenSize,
            6 => ApnsStatus::InvalidTopicSize,
            7 => ApnsStatus::InvalidPayloadSize,
            8 => ApnsStatus::InvalidToken,
            10 => ApnsStatus::Shutdown,
            _ => ApnsStatus::Unknown,
        }
    }

    /// The wire code this kind maps back to.
    pub fn code(&self) -> u8 {
        match self {
            ApnsStatus::NoErrors => 0,
            ApnsStatus::ProcessingError => 1,
            ApnsStatus::MissingDeviceToken => 2,
            ApnsStatus::MissingTopic => 3,
            ApnsStatus::MissingPayload => 4,
            ApnsStatus::InvalidTokenSize => 5,
            ApnsStatus::InvalidTopicSize => 6,
            ApnsStatus::InvalidPayloadSize => 7,
            ApnsStatus::InvalidToken => 8,
            ApnsStatus::Shutdown => 10,
            ApnsStatus::Unknown => 255,
        }
    }

    /// Whether the status marks the notification itself as malformed.
    /// Resending a permanent failure is pointless; a transient one must be
    /// replayed on the next connection.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ApnsStatus::MissingDeviceToken
                | ApnsStatus::MissingTopic
                | ApnsStatus::MissingPayload
                | ApnsStatus::InvalidTokenSize
                | ApnsStatus::InvalidTopicSize
                | ApnsStatus::InvalidPayloadSize
                | ApnsStatus::InvalidToken
        )
    }
}

/// Errors surfaced by the gateway and feedback clients.
///
/// Transport and serialization causes are carried as messages rather than
/// source errors so that failure reports can own a copy while `send` returns
/// another to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PushError {
    #[error("device token must be 64 hex characters")]
    InvalidDeviceToken,

    #[error("payload is {0} bytes, limit is {MAX_PAYLOAD_BYTES}")]
    PayloadTooLarge(usize),

    #[error("priority must be 5 or 10, got {0}")]
    InvalidPriority(u8),

    #[error("custom payload key {0:?} is reserved")]
    ReservedPayloadKey(String),

    #[error("gateway rejected notification: {0}")]
    Apns(ApnsStatus),

    #[error("malformed frame: {0}")]
    FrameDecode(String),

    #[error("payload serialization failed: {0}")]
    PayloadSerialize(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection is not established")]
    NotConnected,

    #[error("client is closed")]
    ClientClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("TLS setup error: {0}")]
    Tls(String),
}

impl From<std::io::Error> for PushError {
    fn from(e: std::io::Error) -> Self {
        PushError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for PushError {
    fn from(e: serde_json::Error) -> Self {
        PushError::PayloadSerialize(e.to_string())
    }
}

impl From<config::ConfigError> for PushError {
    fn from(e: config::ConfigError) -> Self {
        PushError::Config(e.to_string())
    }
}

impl PushError {
    /// Permanent failures are per-notification and must not trigger a
    /// reconnect or a replay.
    pub fn is_permanent(&self) -> bool {
        match self {
            PushError::InvalidDeviceToken
            | PushError::PayloadTooLarge(_)
            | PushError::InvalidPriority(_)
            | PushError::ReservedPayloadKey(_)
            | PushError::PayloadSerialize(_) => true,
            PushError::Apns(status) => status.is_permanent(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PushError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_round_trip() {
        for code in [0u8, 1, 2, 3, 4, 5, 6, 7, 8, 10, 255] {
            let status = ApnsStatus::from_code(code);
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn test_unlisted_codes_collapse_to_unknown() {
        assert_eq!(ApnsStatus::from_code(9), ApnsStatus::Unknown);
        assert_eq!(ApnsStatus::from_code(42), ApnsStatus::Unknown);
        assert_eq!(ApnsStatus::from_code(254), ApnsStatus::Unknown);
    }

    #[test]
    fn test_permanent_statuses() {
        for code in 2u8..=8 {
            assert!(ApnsStatus::from_code(code).is_permanent(), "code {code}");
        }
        assert!(!ApnsStatus::ProcessingError.is_permanent());
        assert!(!ApnsStatus::Shutdown.is_permanent());
        assert!(!ApnsStatus::Unknown.is_permanent());
        assert!(!ApnsStatus::NoErrors.is_permanent());
    }

    #[test]
    fn test_push_error_permanence() {
        assert!(PushError::InvalidDeviceToken.is_permanent());
        assert!(PushError::PayloadTooLarge(3000).is_permanent());
        assert!(PushError::InvalidPriority(7).is_permanent());
        assert!(PushError::Apns(ApnsStatus::InvalidToken).is_permanent());
        assert!(!PushError::Apns(ApnsStatus::Shutdown).is_permanent());
        assert!(!PushError::ClientClosed.is_permanent());
        assert!(!PushError::NotConnected.is_permanent());
    }

    #[test]
    fn test_error_display() {
        let err = PushError::PayloadTooLarge(2049);
        assert!(err.to_string().contains("2049"));
        assert!(err.to_string().contains("2048"));

        let err = PushError::Apns(ApnsStatus::InvalidToken);
        assert_eq!(
            err.to_string(),
            "gateway rejected notification: invalid token"
        );
    }
}
