//! Transport capability consumed by the gateway and feedback clients.
//!
//! The clients only ever see the [`Connection`] trait: connect, write a
//! frame, read bytes, close. TLS, certificates and socket details live
//! behind it in [`TlsConnection`]; tests substitute scripted in-memory
//! implementations.

mod backoff;
mod tls;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use tls::TlsConnection;

use async_trait::async_trait;

use crate::error::Result;

/// Gateway and feedback endpoint catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Production,
    Sandbox,
}

impl Endpoint {
    /// Address of the binary push gateway.
    pub fn gateway(&self) -> &'static str {
        match self {
            Endpoint::Production => "gateway.push.apple.com:2195",
            Endpoint::Sandbox => "gateway.sandbox.push.apple.com:2195",
        }
    }

    /// Address of the feedback service.
    pub fn feedback(&self) -> &'static str {
        match self {
            Endpoint::Production => "feedback.push.apple.com:2196",
            Endpoint::Sandbox => "feedback.sandbox.push.apple.com:2196",
        }
    }
}

/// A byte-stream transport to one remote endpoint.
///
/// Contract the clients rely on:
/// - `connect` establishes a fresh stream, tearing down any previous one.
/// - `write` transmits one whole frame; implementations serialize concurrent
///   callers internally so bytes of different frames never interleave.
/// - `read` is used by a single reader task at a time and returns the number
///   of bytes read, 0 meaning the remote half-closed.
/// - `close` tears the stream down; later `write`/`read` calls fail until
///   the next `connect`.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    async fn connect(&self) -> Result<()>;

    async fn write(&self, frame: &[u8]) -> Result<()>;

    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_catalogue() {
        assert_eq!(Endpoint::Production.gateway(), "gateway.push.apple.com:2195");
        assert_eq!(
            Endpoint::Sandbox.gateway(),
            "gateway.sandbox.push.apple.com:2195"
        );
        assert_eq!(
            Endpoint::Production.feedback(),
            "feedback.push.apple.com:2196"
        );
        assert_eq!(
            Endpoint::Sandbox.feedback(),
            "feedback.sandbox.push.apple.com:2196"
        );
    }
}
