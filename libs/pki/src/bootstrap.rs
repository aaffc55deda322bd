//! Trust bootstrap: everything minted once per deployment lifecycle.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::ca::CertificateAuthority;
use crate::error::{PkiError, Result};
use crate::token::generate_token;

/// Common name of the per-deployment CA.
pub const CA_COMMON_NAME: &str = "ocpd bootstrap CA";

/// Trust material handed to the remote host through the provisioning channel.
///
/// The CA key and token never appear in `Debug` output.
#[derive(Clone)]
pub struct BootstrapBundle {
    pub ca_cert_pem: String,
    pub ca_key_pem: String,
    pub token: String,
}

impl std::fmt::Debug for BootstrapBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapBundle")
            .field("ca_cert_pem", &self.ca_cert_pem)
            .field("ca_key_pem", &"<redacted>")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl BootstrapBundle {
    /// Mint a fresh CA and shared token.
    pub fn mint() -> Result<Self> {
        let ca = CertificateAuthority::new(CA_COMMON_NAME)?;
        info!("Minted bootstrap CA and agent token");

        Ok(Self {
            ca_cert_pem: ca.ca_cert_pem().to_string(),
            ca_key_pem: ca.ca_key_pem().to_string(),
            token: generate_token(),
        })
    }

    /// Persist the CA certificate for later client-side verification.
    pub fn persist_ca_cert(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PkiError::io(parent, e))?;
            }
        }
        fs::write(path, &self.ca_cert_pem).map_err(|e| PkiError::io(path, e))?;
        debug!(path = %path.display(), "Wrote CA certificate");
        Ok(())
    }
}

/// Load the locally persisted CA certificate.
pub fn load_ca_cert(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| PkiError::io(path, e))
}

/// Remove the locally persisted CA certificate. A missing file is not an error.
pub fn remove_ca_cert(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed CA certificate");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PkiError::io(path, e)),
    }
}
