//! Send-side gateway client.
//!
//! The gateway never acknowledges success. It reports a rejection
//! asynchronously: a 6-byte error-response packet naming the offending
//! notification's identifier, after which it closes the connection and
//! silently discards every frame written after that notification. The
//! client therefore keeps a bounded window of recently written
//! notifications, runs a background reader for the error packet, and on
//! rejection reconnects and replays the discarded survivors while new
//! submissions keep arriving.
//!
//! Lifecycle: `Connecting` -> `Connected` -> (write failure or error
//! packet) -> reconnect -> `Connected` -> ... A single-flight latch
//! collapses concurrent reconnect triggers; submitters block on the latch
//! until the connection is restored.

mod sent_window;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use tokio::sync::{mpsc, watch, Notify};

use crate::config::Settings;
use crate::connection::{BackoffConfig, Connection, ExponentialBackoff, TlsConnection};
use crate::error::{PushError, Result};
use crate::metrics;
use crate::notification::wire::{ErrorResponse, PreparedFrame, ERROR_RESPONSE_BYTES};
use crate::notification::{FailedNotification, Notification};

use sent_window::SentWindow;

/// Tunables for a gateway client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How many recently written notifications are retained for replay.
    pub sent_window_size: usize,
    /// Capacity of the failure-report channel; reports beyond it are
    /// dropped rather than blocking the send path.
    pub failed_channel_capacity: usize,
    /// Reconnect backoff parameters.
    pub backoff: BackoffConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            sent_window_size: 1000,
            failed_channel_capacity: 32,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Counters for [`Client::stats`].
#[derive(Debug, Default)]
struct ClientCounters {
    total_sent: AtomicU64,
    total_replayed: AtomicU64,
    total_failed: AtomicU64,
    reports_dropped: AtomicU64,
    reconnects: AtomicU64,
}

/// Snapshot of client activity.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub total_sent: u64,
    pub total_replayed: u64,
    pub total_failed: u64,
    pub reports_dropped: u64,
    pub reconnects: u64,
    pub sent_window_len: usize,
}

/// Cancellation handle for one connection generation's error reader.
#[derive(Default)]
struct CancelToken {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn cancelled(&self) {
        // Register interest before checking the flag so a concurrent
        // `cancel` cannot slip between the two.
        let notified = self.notify.notified();
        if self.flag.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

struct ClientInner {
    connection: Arc<dyn Connection>,
    options: ClientOptions,
    window: SentWindow,
    /// Next identifier to assign. Wraps after 2^32 sends on one client;
    /// long-lived processes should be restarted before that point.
    id_counter: StdMutex<u32>,
    reconnecting_tx: watch::Sender<bool>,
    reconnecting_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    failed_tx: mpsc::Sender<FailedNotification>,
    failed_rx: StdMutex<Option<mpsc::Receiver<FailedNotification>>>,
    /// Cancel token of the current connection generation's reader.
    read_cancel: StdMutex<Arc<CancelToken>>,
    counters: ClientCounters,
}

/// Long-lived client for the binary push gateway.
///
/// Cheap to clone; all clones share one connection, window and identifier
/// counter. `send` may be called from any number of tasks concurrently.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Build over an arbitrary transport. Blocks until the first connection
    /// is established, retrying with backoff like any later reconnect.
    pub async fn with_connection(
        connection: Arc<dyn Connection>,
        options: ClientOptions,
    ) -> Result<Self> {
        let (failed_tx, failed_rx) = mpsc::channel(options.failed_channel_capacity.max(1));
        // The client starts in `Connecting`; the latch is released once the
        // first connection is up.
        let (reconnecting_tx, reconnecting_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let window = SentWindow::new(options.sent_window_size.max(1));
        let inner = Arc::new(ClientInner {
            connection,
            options,
            window,
            id_counter: StdMutex::new(1),
            reconnecting_tx,
            reconnecting_rx,
            shutdown_tx,
            shutdown_rx,
            failed_tx,
            failed_rx: StdMutex::new(Some(failed_rx)),
            read_cancel: StdMutex::new(Arc::new(CancelToken::default())),
            counters: ClientCounters::default(),
        });

        establish(&inner).await?;
        inner.reconnecting_tx.send_replace(false);

        Ok(Self { inner })
    }

    /// Build a TLS client from PEM certificate and key bytes.
    pub async fn with_certificate_pem(
        gateway: impl Into<String>,
        cert_pem: &[u8],
        key_pem: &[u8],
        options: ClientOptions,
    ) -> Result<Self> {
        let connection = TlsConnection::with_certificate_pem(gateway, cert_pem, key_pem)?;
        Self::with_connection(Arc::new(connection), options).await
    }

    /// Build a TLS client by reading PEM certificate and key files.
    pub async fn with_certificate_files(
        gateway: impl Into<String>,
        cert_path: impl AsRef<std::path::Path>,
        key_path: impl AsRef<std::path::Path>,
        options: ClientOptions,
    ) -> Result<Self> {
        let connection = TlsConnection::with_certificate_files(gateway, cert_path, key_path)?;
        Self::with_connection(Arc::new(connection), options).await
    }

    /// Build from the configuration layer.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let connection = TlsConnection::with_certificate_files(
            settings.gateway_address(),
            &settings.tls.cert_path,
            &settings.tls.key_path,
        )?;
        Self::with_connection(Arc::new(connection), settings.client_options()).await
    }

    /// Submit a notification for delivery. Fire-and-forget: success is the
    /// absence of a failure report, because the gateway never acknowledges.
    ///
    /// An identifier of 0 is replaced with the next counter value; a
    /// caller-supplied identifier advances the counter past itself.
    /// Permanent validation failures are returned and also announced on the
    /// failure channel, so replayed submissions (which have no caller)
    /// report the same way.
    pub async fn send(&self, notification: Notification) -> Result<()> {
        submit(&self.inner, notification).await
    }

    /// Take the failure-report stream. Yields `{notification, error}` pairs
    /// for gateway rejections and validation failures. Can be taken once;
    /// reports are dropped (and counted) while nobody holds or drains it.
    pub fn failed_notifications(&self) -> Option<mpsc::Receiver<FailedNotification>> {
        self.inner
            .failed_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Snapshot of activity counters.
    pub fn stats(&self) -> ClientStats {
        let c = &self.inner.counters;
        ClientStats {
            total_sent: c.total_sent.load(Ordering::Relaxed),
            total_replayed: c.total_replayed.load(Ordering::Relaxed),
            total_failed: c.total_failed.load(Ordering::Relaxed),
            reports_dropped: c.reports_dropped.load(Ordering::Relaxed),
            reconnects: c.reconnects.load(Ordering::Relaxed),
            sent_window_len: self.inner.window.len(),
        }
    }

    /// Shut the client down. Pending and subsequent `send` calls fail with
    /// [`PushError::ClientClosed`]; the reconnect loop and the error reader
    /// stop. Without an explicit close the client runs for the life of the
    /// process, which is the intended deployment.
    pub async fn close(&self) {
        if self.inner.shutdown_tx.send_replace(true) {
            return;
        }
        current_cancel(&self.inner).cancel();
        self.inner.connection.close().await;
        tracing::info!("gateway client closed");
    }
}

fn current_cancel(inner: &ClientInner) -> Arc<CancelToken> {
    inner
        .read_cancel
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// Assign or adopt the wire identifier under the counter lock.
fn acquire_identifier(counter: &StdMutex<u32>, requested: u32) -> u32 {
    let mut next = counter.lock().unwrap_or_else(|e| e.into_inner());
    if requested == 0 {
        let assigned = *next;
        *next = next.wrapping_add(1);
        assigned
    } else {
        if *next <= requested {
            *next = requested.wrapping_add(1);
        }
        requested
    }
}

/// The shared submission path for fresh sends and replays.
async fn submit(inner: &Arc<ClientInner>, mut notification: Notification) -> Result<()> {
    if *inner.shutdown_rx.borrow() {
        return Err(PushError::ClientClosed);
    }

    // Validate and serialize before an identifier is consumed: a
    // notification that cannot be encoded was never submitted.
    let prepared = match PreparedFrame::new(&notification) {
        Ok(prepared) => prepared,
        Err(error) => {
            report_failure(inner, notification, error.clone());
            return Err(error);
        }
    };

    notification.identifier = acquire_identifier(&inner.id_counter, notification.identifier);
    let frame = prepared.encode(notification.identifier, notification.expiration);

    loop {
        wait_until_connected(inner).await?;
        match inner.connection.write(&frame).await {
            Ok(()) => break,
            Err(error) => {
                // The frame was never durably sent; reconnect and retry the
                // same notification on the new connection.
                tracing::warn!(
                    identifier = notification.identifier,
                    error = %error,
                    "write failed; reconnecting"
                );
                reconnect(inner.clone()).await;
            }
        }
    }

    // Only frames that were fully written enter the window.
    inner.window.record(notification);
    inner.counters.total_sent.fetch_add(1, Ordering::Relaxed);
    metrics::NOTIFICATIONS_SENT_TOTAL.inc();
    Ok(())
}

/// Block until the reconnection latch is clear, or fail on shutdown.
async fn wait_until_connected(inner: &ClientInner) -> Result<()> {
    let mut reconnecting = inner.reconnecting_rx.clone();
    let mut shutdown = inner.shutdown_rx.clone();
    loop {
        if *shutdown.borrow_and_update() {
            return Err(PushError::ClientClosed);
        }
        if !*reconnecting.borrow_and_update() {
            return Ok(());
        }
        tokio::select! {
            changed = reconnecting.changed() => {
                if changed.is_err() {
                    return Err(PushError::ClientClosed);
                }
            }
            _ = shutdown.changed() => {}
        }
    }
}

/// Connect with backoff until success, then install a fresh error reader.
/// Fails only when the client shuts down mid-loop.
async fn establish(inner: &Arc<ClientInner>) -> Result<()> {
    let mut backoff = ExponentialBackoff::new(inner.options.backoff.clone());
    let mut shutdown = inner.shutdown_rx.clone();
    loop {
        if *shutdown.borrow_and_update() {
            return Err(PushError::ClientClosed);
        }
        match inner.connection.connect().await {
            Ok(()) => break,
            Err(error) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %error,
                    attempt = backoff.attempt(),
                    retry_in_ms = delay.as_millis() as u64,
                    "gateway connect failed, will retry"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => return Err(PushError::ClientClosed),
                }
            }
        }
    }

    if *shutdown.borrow_and_update() {
        inner.connection.close().await;
        return Err(PushError::ClientClosed);
    }

    let cancel = Arc::new(CancelToken::default());
    *inner
        .read_cancel
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = cancel.clone();

    let reader_inner = inner.clone();
    tokio::spawn(run_error_reader(reader_inner, cancel));
    Ok(())
}

fn trigger_reconnect(inner: &Arc<ClientInner>) {
    let inner = inner.clone();
    tokio::spawn(async move {
        reconnect(inner).await;
    });
}

/// Single-flight reconnection. The first caller wins and performs the
/// episode; concurrent triggers collapse and return immediately, leaving
/// their callers to wait on the latch.
async fn reconnect(inner: Arc<ClientInner>) {
    if inner.reconnecting_tx.send_replace(true) {
        return;
    }

    inner.counters.reconnects.fetch_add(1, Ordering::Relaxed);
    metrics::RECONNECTS_TOTAL.inc();
    tracing::info!("reconnecting to gateway");

    // The previous generation's reader must not observe the replacement
    // connection.
    current_cancel(&inner).cancel();
    inner.connection.close().await;

    match establish(&inner).await {
        Ok(()) => {
            tracing::info!("gateway connection restored");
        }
        Err(_) => {
            tracing::debug!("reconnect abandoned, client closed");
        }
    }
    // Release the latch either way; blocked senders observe shutdown
    // themselves when the client closed.
    inner.reconnecting_tx.send_replace(false);
}

/// One connection generation's reader: a single 6-byte read, then exit.
///
/// Three outcomes: the packet arrives (handle it, reconnect concurrently),
/// the read fails or hits EOF (reconnect; the window is untouched because
/// no identifier was observed), or the generation is cancelled.
async fn run_error_reader(inner: Arc<ClientInner>, cancel: Arc<CancelToken>) {
    let mut packet = [0u8; ERROR_RESPONSE_BYTES];
    let mut filled = 0;

    let outcome = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            read = inner.connection.read(&mut packet[filled..]) => match read {
                Ok(0) => break Err(PushError::Transport(
                    "gateway closed the connection".into(),
                )),
                Ok(n) => {
                    filled += n;
                    if filled == ERROR_RESPONSE_BYTES {
                        break Ok(());
                    }
                }
                Err(error) => break Err(error),
            }
        }
    };

    trigger_reconnect(&inner);

    match outcome {
        Ok(()) => handle_error_response(&inner, &packet),
        Err(error) => {
            // An EOF straight after connecting usually means the certificate
            // does not match the gateway environment.
            tracing::warn!(error = %error, "gateway connection lost");
        }
    }
}

/// Process a decoded error-response packet: report the rejected
/// notification and resubmit the survivors written after it.
fn handle_error_response(inner: &Arc<ClientInner>, packet: &[u8; ERROR_RESPONSE_BYTES]) {
    let response = match ErrorResponse::decode(packet) {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(error = %error, "unreadable error-response packet");
            return;
        }
    };

    tracing::warn!(
        status = %response.status,
        identifier = response.identifier,
        "gateway rejected notification"
    );

    let Some((failed, survivors)) = inner.window.split_at_failure(response.identifier) else {
        // Already evicted from the window (or identifier 0 after a
        // shutdown packet): nothing to report, nothing to replay.
        tracing::debug!(
            identifier = response.identifier,
            "rejected identifier not in sent window"
        );
        return;
    };

    report_failure(inner, failed, PushError::Apns(response.status));

    if survivors.is_empty() {
        return;
    }

    tracing::info!(count = survivors.len(), "replaying notifications after rejection");
    let replay_inner = inner.clone();
    tokio::spawn(async move {
        // Sequential resubmission keeps the survivors' relative order;
        // interleaving with concurrent fresh sends is accepted.
        for notification in survivors {
            replay_inner
                .counters
                .total_replayed
                .fetch_add(1, Ordering::Relaxed);
            metrics::NOTIFICATIONS_REPLAYED_TOTAL.inc();
            match submit(&replay_inner, notification).await {
                Ok(()) => {}
                Err(PushError::ClientClosed) => break,
                // Permanent failures were already announced by submit.
                Err(_) => {}
            }
        }
    });
}

/// Non-blocking failure report. The consumer is advisory: if nobody is
/// draining the channel the report is dropped and counted, never letting
/// the send path stall.
fn report_failure(inner: &ClientInner, notification: Notification, error: PushError) {
    inner.counters.total_failed.fetch_add(1, Ordering::Relaxed);
    metrics::NOTIFICATIONS_FAILED_TOTAL
        .with_label_values(&[failure_label(&error)])
        .inc();

    let report = FailedNotification {
        notification,
        error,
    };
    if let Err(err) = inner.failed_tx.try_send(report) {
        inner
            .counters
            .reports_dropped
            .fetch_add(1, Ordering::Relaxed);
        metrics::FAILURE_REPORTS_DROPPED_TOTAL.inc();
        tracing::debug!(error = %err, "failure report dropped, no consumer ready");
    }
}

fn failure_label(error: &PushError) -> &'static str {
    match error {
        PushError::InvalidDeviceToken => "invalid_device_token",
        PushError::PayloadTooLarge(_) => "payload_too_large",
        PushError::InvalidPriority(_) => "invalid_priority",
        PushError::ReservedPayloadKey(_) => "reserved_payload_key",
        PushError::PayloadSerialize(_) => "payload_serialize",
        PushError::Apns(_) => "gateway_rejected",
        _ => "other",
    }
}
