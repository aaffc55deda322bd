//! # ocpd-pki
//!
//! Trust material for the authenticated agent channel.
//!
//! - [`CertificateAuthority`]: an ephemeral self-signed CA, minted by the
//!   client at install time, used by the agent to issue its server certificate
//! - [`generate_token`] / [`tokens_match`]: the shared secret checked on every
//!   agent request
//! - [`BootstrapBundle`]: CA certificate, CA key and token, handed to the
//!   registry host through the provisioning layer

mod bootstrap;
mod ca;
mod error;
mod token;

pub use bootstrap::{load_ca_cert, remove_ca_cert, BootstrapBundle, CA_COMMON_NAME};
pub use ca::{
    parse_pem, CertificateAuthority, CertificateInfo, ServerCert, CA_PATH_LEN,
    CA_VALIDITY_YEARS, SERVER_CERT_VALIDITY_YEARS,
};
pub use error::{PkiError, Result};
pub use token::{generate_token, tokens_match};
