//! Listener TLS.
//!
//! The provisioning channel drops the bootstrap CA certificate and key on
//! the host. At start-up the agent issues itself a leaf certificate from that
//! CA, so clients holding the CA certificate can verify it.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::sync::watch;
use tracing::info;

use ocpd_pki::CertificateAuthority;

/// Install the process-wide rustls crypto provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Issue a leaf certificate for `server_names` from the CA files on disk.
pub async fn server_tls_config(
    ca_cert_file: &Path,
    ca_key_file: &Path,
    server_names: &[String],
) -> Result<RustlsConfig> {
    let ca_cert = tokio::fs::read_to_string(ca_cert_file)
        .await
        .with_context(|| format!("reading CA certificate {}", ca_cert_file.display()))?;
    let ca_key = tokio::fs::read_to_string(ca_key_file)
        .await
        .with_context(|| format!("reading CA key {}", ca_key_file.display()))?;

    let ca = CertificateAuthority::from_pem(&ca_cert, &ca_key)?;
    let names: Vec<&str> = server_names.iter().map(String::as_str).collect();
    let leaf = ca.issue_server_cert(&names)?;
    info!(sans = ?server_names, "Issued agent server certificate");

    RustlsConfig::from_pem(leaf.cert_pem.into_bytes(), leaf.key_pem.into_bytes())
        .await
        .context("building TLS config")
}

/// Serve the router over TLS until shutdown is signalled.
///
/// `bound` receives the actual listening address, which differs from `addr`
/// when binding port 0.
pub async fn serve(
    addr: SocketAddr,
    tls: RustlsConfig,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
    bound: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
) -> Result<()> {
    let handle = Handle::new();

    tokio::spawn({
        let handle = handle.clone();
        async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("HTTPS server shutting down");
            handle.graceful_shutdown(Some(Duration::from_secs(5)));
        }
    });

    if let Some(bound) = bound {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Some(addr) = handle.listening().await {
                let _ = bound.send(addr);
            }
        });
    }

    info!(addr = %addr, "Listening for connections");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("HTTPS server error")
}
