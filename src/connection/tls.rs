//! TLS transport to the gateway, authenticated with a client certificate.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use super::Connection;
use crate::error::{PushError, Result};

/// TLS byte stream to one endpoint.
///
/// The stream is split after the handshake: the write half sits behind a
/// mutex that doubles as the frame-write lock, the read half is taken by
/// whichever single reader the owning client runs.
pub struct TlsConnection {
    address: String,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    write_half: Mutex<Option<WriteHalf<TlsStream<TcpStream>>>>,
    read_half: Mutex<Option<ReadHalf<TlsStream<TcpStream>>>>,
}

impl std::fmt::Debug for TlsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnection")
            .field("address", &self.address)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl TlsConnection {
    /// Build from a ready-made rustls client config.
    pub fn new(address: impl Into<String>, config: Arc<ClientConfig>) -> Result<Self> {
        let address = address.into();
        let host = address.split(':').next().unwrap_or(&address);
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| PushError::Tls(format!("invalid server name {host:?}: {e}")))?;
        Ok(Self {
            address,
            server_name,
            connector: TlsConnector::from(config),
            write_half: Mutex::new(None),
            read_half: Mutex::new(None),
        })
    }

    /// Build from PEM-encoded certificate chain and private key bytes.
    pub fn with_certificate_pem(
        address: impl Into<String>,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<Self> {
        let config = client_config(cert_pem, key_pem)?;
        Self::new(address, Arc::new(config))
    }

    /// Build by reading PEM certificate and key files.
    pub fn with_certificate_files(
        address: impl Into<String>,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;
        Self::with_certificate_pem(address, &cert_pem, &key_pem)
    }

    /// The remote address this connection dials.
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// rustls client config with the platform web roots and the caller's
/// client certificate.
fn client_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<ClientConfig> {
    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<std::io::Result<Vec<CertificateDer<'static>>>>()
        .map_err(|e| PushError::Tls(format!("failed to parse certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(PushError::Tls("no certificates found in PEM".into()));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| PushError::Tls(format!("failed to parse key PEM: {e}")))?
        .ok_or_else(|| PushError::Tls("no private key found in PEM".into()))?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| PushError::Tls(format!("client certificate rejected: {e}")))
}

#[async_trait::async_trait]
impl Connection for TlsConnection {
    async fn connect(&self) -> Result<()> {
        // Tear down any previous stream so a half-dead socket cannot linger
        // behind a fresh one.
        self.close().await;

        let tcp = TcpStream::connect(&self.address).await?;
        tcp.set_nodelay(true)?;
        let stream = self.connector.connect(self.server_name.clone(), tcp).await?;
        let (read, write) = tokio::io::split(stream);

        *self.read_half.lock().await = Some(read);
        *self.write_half.lock().await = Some(write);

        tracing::debug!(address = %self.address, "TLS connection established");
        Ok(())
    }

    async fn write(&self, frame: &[u8]) -> Result<()> {
        // Holding the half across the whole write keeps concurrent frames
        // from interleaving.
        let mut guard = self.write_half.lock().await;
        let write = guard.as_mut().ok_or(PushError::NotConnected)?;
        write.write_all(frame).await?;
        write.flush().await?;
        Ok(())
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.read_half.lock().await;
        let read = guard.as_mut().ok_or(PushError::NotConnected)?;
        Ok(read.read(buf).await?)
    }

    async fn close(&self) {
        if let Some(mut write) = self.write_half.lock().await.take() {
            let _ = write.shutdown().await;
        }
        // The read half may be pinned by a reader mid-read; it is dropped
        // when that reader is cancelled and releases the lock.
        if let Ok(mut guard) = self.read_half.try_lock() {
            guard.take();
        }
    }
}
