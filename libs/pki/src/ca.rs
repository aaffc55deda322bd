//! Ephemeral certificate authority for the agent control channel.
//!
//! The client mints the CA once per deployment. The CA certificate is kept
//! locally to verify the agent; the CA certificate and key travel to the
//! registry host, where the agent issues its own leaf before listening.

use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use x509_parser::prelude::*;

use crate::error::{PkiError, Result};

/// Validity period for the CA certificate (10 years).
pub const CA_VALIDITY_YEARS: i64 = 10;

/// Validity period for agent server certificates (1 year).
pub const SERVER_CERT_VALIDITY_YEARS: i64 = 1;

/// Path length constraint on the CA.
pub const CA_PATH_LEN: u8 = 1;

const ORGANIZATION: &str = "ocpd";

fn compute_validity(years: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    let not_after = now + ::time::Duration::days(years * 365);
    (now, not_after)
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(ORGANIZATION.to_string()),
    );
    dn
}

/// Parse PEM-encoded data and return the DER bytes.
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// A server certificate and its private key, both PEM encoded.
#[derive(Clone)]
pub struct ServerCert {
    pub cert_pem: String,
    pub key_pem: String,
}

impl std::fmt::Debug for ServerCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCert")
            .field("cert_pem", &self.cert_pem)
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Self-signed CA used to sign the agent's server certificate.
#[derive(Clone)]
pub struct CertificateAuthority {
    ca_key_pem: String,
    ca_cert_pem: String,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("ca_cert_pem", &self.ca_cert_pem)
            .field("ca_key_pem", &"<redacted>")
            .finish()
    }
}

impl CertificateAuthority {
    /// Create a new self-signed CA.
    ///
    /// ECDSA P-256 key, `keyCertSign` + `cRLSign`, `isCA` with a path length
    /// of 1, valid for ten years from now.
    pub fn new(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(CA_PATH_LEN));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let (not_before, not_after) = compute_validity(CA_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = KeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate CA key: {}", e))
        })?;

        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
        })?;

        Ok(Self {
            ca_key_pem: key_pair.serialize_pem().trim().to_string(),
            ca_cert_pem: cert.pem().trim().to_string(),
        })
    }

    /// Load a CA from PEM material delivered by the provisioning channel.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let _ = KeyPair::from_pem(key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CA key: {}", e)))?;
        let _ = parse_pem(cert_pem)?;

        Ok(Self {
            ca_key_pem: key_pem.to_string(),
            ca_cert_pem: cert_pem.to_string(),
        })
    }

    /// CA certificate in PEM format.
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// CA private key in PEM format.
    pub fn ca_key_pem(&self) -> &str {
        &self.ca_key_pem
    }

    /// Validity and constraint details of the CA certificate.
    pub fn cert_info(&self) -> Result<CertificateInfo> {
        CertificateInfo::from_pem(&self.ca_cert_pem)
    }

    /// Issue a TLS server certificate for the given SANs, signed by this CA.
    ///
    /// SANs that parse as IP addresses become IP SANs; everything else is a
    /// DNS name.
    pub fn issue_server_cert(&self, sans: &[&str]) -> Result<ServerCert> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name("ocpd agent");
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let (not_before, not_after) = compute_validity(SERVER_CERT_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        params.subject_alt_names = sans
            .iter()
            .map(|san| {
                if let Ok(ip) = san.parse::<std::net::IpAddr>() {
                    Ok(SanType::IpAddress(ip))
                } else {
                    Ia5String::try_from(san.to_string())
                        .map(SanType::DnsName)
                        .map_err(|e| {
                            PkiError::CertificateGenerationFailed(format!(
                                "invalid DNS name '{}': {}",
                                san, e
                            ))
                        })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let server_key = KeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate server key: {}", e))
        })?;

        let ca_key = KeyPair::from_pem(&self.ca_key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to load CA key: {}", e)))?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

        let server_cert = params.signed_by(&server_key, &issuer).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to sign server cert: {}", e))
        })?;

        Ok(ServerCert {
            cert_pem: server_cert.pem(),
            key_pem: server_key.serialize_pem(),
        })
    }
}

/// Information about a certificate's validity and constraints.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp).
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp).
    pub not_after: i64,
    /// Subject common name.
    pub common_name: String,
    /// Whether basic constraints mark this as a CA.
    pub is_ca: bool,
    /// Path length constraint, if any.
    pub path_len: Option<u32>,
    /// Whether the key may sign certificates.
    pub can_sign_certs: bool,
    /// Whether the key may sign CRLs.
    pub can_sign_crls: bool,
}

impl CertificateInfo {
    /// Parse certificate info from a PEM-encoded certificate.
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        let constraints = cert
            .basic_constraints()
            .map_err(|e| PkiError::ParseError(format!("bad basic constraints: {}", e)))?;
        let (is_ca, path_len) = match constraints {
            Some(ext) => (ext.value.ca, ext.value.path_len_constraint),
            None => (false, None),
        };

        let key_usage = cert
            .key_usage()
            .map_err(|e| PkiError::ParseError(format!("bad key usage: {}", e)))?;
        let (can_sign_certs, can_sign_crls) = match key_usage {
            Some(ext) => (ext.value.key_cert_sign(), ext.value.crl_sign()),
            None => (false, false),
        };

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
            is_ca,
            path_len,
            can_sign_certs,
            can_sign_crls,
        })
    }

    /// Total lifetime of the certificate in seconds.
    pub fn lifetime_secs(&self) -> i64 {
        self.not_after - self.not_before
    }
}
