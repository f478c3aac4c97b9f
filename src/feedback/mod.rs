//! Feedback service client.
//!
//! Apple's feedback service streams 38-byte records naming device tokens
//! that rejected recent pushes, then half-closes. One poll is one pass:
//! connect lazily, drain records until EOF, done. There is no reconnect;
//! callers poll again later with a fresh stream.

use std::sync::Arc;

use futures::Stream;

use crate::config::Settings;
use crate::connection::{Connection, TlsConnection};
use crate::error::{PushError, Result};
use crate::metrics;
use crate::notification::wire::{FeedbackRecord, FEEDBACK_RECORD_BYTES};

/// One-shot client for the feedback service.
pub struct FeedbackClient {
    connection: Arc<dyn Connection>,
}

impl FeedbackClient {
    /// Build over an arbitrary transport.
    pub fn with_connection(connection: Arc<dyn Connection>) -> Self {
        Self { connection }
    }

    /// Build a TLS client from PEM certificate and key bytes.
    pub fn with_certificate_pem(
        address: impl Into<String>,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<Self> {
        let connection = TlsConnection::with_certificate_pem(address, cert_pem, key_pem)?;
        Ok(Self::with_connection(Arc::new(connection)))
    }

    /// Build a TLS client by reading PEM certificate and key files.
    pub fn with_certificate_files(
        address: impl Into<String>,
        cert_path: impl AsRef<std::path::Path>,
        key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self> {
        let connection = TlsConnection::with_certificate_files(address, cert_path, key_path)?;
        Ok(Self::with_connection(Arc::new(connection)))
    }

    /// Build from the configuration layer.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::with_certificate_files(
            settings.feedback_address(),
            &settings.tls.cert_path,
            &settings.tls.key_path,
        )
    }

    /// Start one drain pass. The connection is opened on the first pull,
    /// and the stream ends for good at EOF or on the first transport error.
    pub fn receive(&self) -> FeedbackStream {
        FeedbackStream {
            connection: self.connection.clone(),
            connected: false,
            done: false,
            error: None,
        }
    }
}

/// Lazy, single-pass sequence of feedback records.
pub struct FeedbackStream {
    connection: Arc<dyn Connection>,
    connected: bool,
    done: bool,
    error: Option<PushError>,
}

impl FeedbackStream {
    /// Pull the next record. Returns `None` when the remote half-closed or
    /// an error ended the pass; check [`error`](Self::error) to tell the
    /// two apart.
    pub async fn next(&mut self) -> Option<FeedbackRecord> {
        if self.done {
            return None;
        }

        if !self.connected {
            if let Err(error) = self.connection.connect().await {
                return self.fail(error).await;
            }
            self.connected = true;
        }

        let mut record = [0u8; FEEDBACK_RECORD_BYTES];
        let mut filled = 0;
        while filled < FEEDBACK_RECORD_BYTES {
            match self.connection.read(&mut record[filled..]).await {
                Ok(0) if filled == 0 => {
                    // Clean EOF on a record boundary: the drain is complete.
                    self.done = true;
                    self.connection.close().await;
                    return None;
                }
                Ok(0) => {
                    return self
                        .fail(PushError::Transport(format!(
                            "feedback stream truncated mid-record after {filled} bytes"
                        )))
                        .await;
                }
                Ok(n) => filled += n,
                Err(error) => return self.fail(error).await,
            }
        }

        match FeedbackRecord::decode(&record) {
            Ok(record) => {
                metrics::FEEDBACK_RECORDS_TOTAL.inc();
                Some(record)
            }
            Err(error) => self.fail(error).await,
        }
    }

    /// The error that ended the pass, if it did not end with a clean EOF.
    pub fn error(&self) -> Option<&PushError> {
        self.error.as_ref()
    }

    /// Adapt into a [`futures::Stream`]. The terminating error, if any, is
    /// logged but no longer retrievable; use [`next`](Self::next) directly
    /// when it matters.
    pub fn into_stream(self) -> impl Stream<Item = FeedbackRecord> {
        futures::stream::unfold(self, |mut pass| async move {
            let record = pass.next().await;
            if record.is_none() {
                if let Some(error) = pass.error() {
                    tracing::warn!(error = %error, "feedback drain ended with an error");
                }
            }
            record.map(|record| (record, pass))
        })
    }

    async fn fail(&mut self, error: PushError) -> Option<FeedbackRecord> {
        tracing::warn!(error = %error, "feedback drain failed");
        self.done = true;
        self.error = Some(error);
        self.connection.close().await;
        None
    }
}
