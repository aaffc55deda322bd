//! Operator inputs for the registry host.
//!
//! `ocpdctl init` records where the pull secret and SSH public key live;
//! `install` reads them back, strips the telemetry registry from the pull
//! secret and hands both to provisioning together with the region's image.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Paths recorded by `ocpdctl init`, relative to the work directory.
pub const INIT_FILE: &str = "initData.json";

/// Registry excluded from the mirrored pull secret so the insights operator
/// stays off in a disconnected cluster.
pub const TELEMETRY_REGISTRY: &str = "cloud.openshift.com";

/// RHEL 9 images for the registry host, per region.
pub const REGION_IMAGES: &[(&str, &str)] = &[
    ("eu-west-1", "ami-07d4917b6f95f5c2a"),
    ("eu-west-2", "ami-07d1e0a32156d0d21"),
    ("eu-west-3", "ami-0574a94188d1b84a1"),
    ("eu-central-1", "ami-007c3072df8eb6584"),
    ("eu-south-2", "ami-05cdcc0c8c82bd18e"),
    ("eu-north-1", "ami-064983766e6ab3419"),
    ("us-east-1", "ami-0583d8c7a9c35822c"),
    ("us-east-2", "ami-0aa8fc2422063977a"),
    ("us-west-1", "ami-0c5ebd68eb61ff68d"),
    ("us-west-2", "ami-0423fca164888b941"),
    ("ap-south-1", "ami-022ce6f32988af5fa"),
    ("ap-northeast-3", "ami-033c6909beae3b794"),
    ("ap-northeast-2", "ami-012e764b9ddef07c2"),
    ("ap-southeast-1", "ami-0b748249d064044e8"),
    ("ap-southeast-2", "ami-086918d8178bfe266"),
    ("ap-northeast-1", "ami-04d3ba818c434b384"),
    ("ca-central-1", "ami-0775d166d9bde92c8"),
    ("sa-east-1", "ami-06dec7e27b4abea7b"),
];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("no init data at {path}")]
    NotInitialized { path: String },

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid init data: {0}")]
    InvalidInitData(#[source] serde_json::Error),

    #[error("invalid pull secret: {0}")]
    InvalidPullSecret(String),

    #[error("{path} is empty")]
    EmptyPublicKey { path: String },

    #[error("region {0} is not supported")]
    UnsupportedRegion(String),
}

/// Image for the registry host in `region`.
pub fn image_for_region(region: &str) -> Result<&'static str, InputError> {
    REGION_IMAGES
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, image)| *image)
        .ok_or_else(|| InputError::UnsupportedRegion(region.to_string()))
}

/// Contents of [`INIT_FILE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitData {
    #[serde(rename = "PullSecretPath")]
    pub pull_secret_path: PathBuf,

    #[serde(rename = "PublicKeyPath")]
    pub public_key_path: PathBuf,
}

impl InitData {
    pub fn save(&self, work_dir: &Path) -> Result<(), InputError> {
        let path = work_dir.join(INIT_FILE);
        let body = serde_json::to_vec_pretty(self).map_err(InputError::InvalidInitData)?;
        std::fs::write(&path, body).map_err(|source| InputError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(work_dir: &Path) -> Result<Self, InputError> {
        let path = work_dir.join(INIT_FILE);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InputError::NotInitialized {
                    path: path.display().to_string(),
                })
            }
            Err(source) => {
                return Err(InputError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        serde_json::from_slice(&raw).map_err(InputError::InvalidInitData)
    }
}

/// Drop [`TELEMETRY_REGISTRY`] from a pull secret's `auths`.
pub fn sanitize_pull_secret(raw: &str) -> Result<String, InputError> {
    let mut secret: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| InputError::InvalidPullSecret(e.to_string()))?;

    let auths = secret
        .get_mut("auths")
        .and_then(|a| a.as_object_mut())
        .ok_or_else(|| InputError::InvalidPullSecret("missing `auths` object".into()))?;
    auths.remove(TELEMETRY_REGISTRY);

    serde_json::to_string(&secret).map_err(|e| InputError::InvalidPullSecret(e.to_string()))
}

fn read(path: &Path) -> Result<String, InputError> {
    std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Everything provisioning needs besides the trust bundle.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryInputs {
    pub region: String,
    pub image_id: String,
    /// Sanitised pull secret JSON.
    pub pull_secret: String,
    pub ssh_public_key: String,
}

impl std::fmt::Debug for RegistryInputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryInputs")
            .field("region", &self.region)
            .field("image_id", &self.image_id)
            .field("pull_secret", &"<redacted>")
            .field("ssh_public_key", &self.ssh_public_key)
            .finish()
    }
}

impl RegistryInputs {
    /// Read the files named in `init` for a deployment in `region`.
    pub fn load(init: &InitData, region: &str) -> Result<Self, InputError> {
        let image_id = image_for_region(region)?;
        let pull_secret = sanitize_pull_secret(&read(&init.pull_secret_path)?)?;

        let ssh_public_key = read(&init.public_key_path)?.trim().to_string();
        if ssh_public_key.is_empty() {
            return Err(InputError::EmptyPublicKey {
                path: init.public_key_path.display().to_string(),
            });
        }

        Ok(Self {
            region: region.to_string(),
            image_id: image_id.to_string(),
            pull_secret,
            ssh_public_key,
        })
    }
}

/// Region names, for help and error hints.
pub fn supported_regions() -> Vec<&'static str> {
    let mut regions: Vec<_> = REGION_IMAGES.iter().map(|(name, _)| *name).collect();
    regions.sort_unstable();
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PULL_SECRET: &str = r#"{"auths":{"cloud.openshift.com":{"auth":"YQ=="},"quay.io":{"auth":"Yg=="}}}"#;

    fn init_in(dir: &TempDir, pull_secret: &str, public_key: &str) -> InitData {
        let pull_secret_path = dir.path().join("pull-secret.json");
        let public_key_path = dir.path().join("id_ed25519.pub");
        std::fs::write(&pull_secret_path, pull_secret).unwrap();
        std::fs::write(&public_key_path, public_key).unwrap();
        InitData {
            pull_secret_path,
            public_key_path,
        }
    }

    #[test]
    fn test_sanitize_drops_telemetry_registry() {
        let sanitized: serde_json::Value =
            serde_json::from_str(&sanitize_pull_secret(PULL_SECRET).unwrap()).unwrap();

        let auths = sanitized["auths"].as_object().unwrap();
        assert!(!auths.contains_key(TELEMETRY_REGISTRY));
        assert_eq!(auths["quay.io"]["auth"], "Yg==");
    }

    #[test]
    fn test_sanitize_rejects_bad_secrets() {
        assert!(matches!(
            sanitize_pull_secret("not json"),
            Err(InputError::InvalidPullSecret(_))
        ));
        assert!(matches!(
            sanitize_pull_secret(r#"{"registries":{}}"#),
            Err(InputError::InvalidPullSecret(_))
        ));
    }

    #[test]
    fn test_init_data_round_trip_and_missing() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            InitData::load(dir.path()),
            Err(InputError::NotInitialized { .. })
        ));

        let init = init_in(&dir, PULL_SECRET, "ssh-ed25519 AAAA");
        init.save(dir.path()).unwrap();
        assert_eq!(InitData::load(dir.path()).unwrap(), init);

        let raw = std::fs::read_to_string(dir.path().join(INIT_FILE)).unwrap();
        assert!(raw.contains("PullSecretPath"));
    }

    #[test]
    fn test_registry_inputs_load() {
        let dir = TempDir::new().unwrap();
        let init = init_in(&dir, PULL_SECRET, "ssh-ed25519 AAAA operator@lab\n");

        let inputs = RegistryInputs::load(&init, "eu-west-1").unwrap();
        assert_eq!(inputs.image_id, "ami-07d4917b6f95f5c2a");
        assert_eq!(inputs.ssh_public_key, "ssh-ed25519 AAAA operator@lab");
        assert!(!inputs.pull_secret.contains(TELEMETRY_REGISTRY));
        assert!(format!("{inputs:?}").contains("<redacted>"));
    }

    #[test]
    fn test_registry_inputs_reject_region_and_empty_key() {
        let dir = TempDir::new().unwrap();
        let init = init_in(&dir, PULL_SECRET, "  \n");

        assert!(matches!(
            RegistryInputs::load(&init, "mars-north-1"),
            Err(InputError::UnsupportedRegion(_))
        ));
        assert!(matches!(
            RegistryInputs::load(&init, "us-east-1"),
            Err(InputError::EmptyPublicKey { .. })
        ));
        assert!(supported_regions().contains(&"sa-east-1"));
    }
}
