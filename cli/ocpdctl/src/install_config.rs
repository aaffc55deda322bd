//! Installer configuration document.
//!
//! The document is either the operator's own `install-config.yaml` or a
//! built-in default for a private, mirror-backed AWS install. Placeholders
//! inside string values are replaced by walking the parsed document, so
//! substituted values can never change its structure.

use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use serde_json::{json, Value};

use crate::provision::InfraAddress;

/// File name of a custom configuration in the work directory.
pub const CUSTOM_INSTALL_CONFIG: &str = "install-config.yaml";

/// Cluster network plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    OvnKubernetes,
    OpenShiftSdn,
}

impl NetworkType {
    pub fn from_sdn_flag(sdn: bool) -> Self {
        if sdn {
            Self::OpenShiftSdn
        } else {
            Self::OvnKubernetes
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::OvnKubernetes => "OVNKubernetes",
            NetworkType::OpenShiftSdn => "OpenShiftSDN",
        }
    }
}

/// Values substituted into the document.
#[derive(Debug, Clone)]
pub struct Substitutions {
    pub name_suffix: u32,
    pub region: String,
    pub private_subnets: [String; 3],
    pub mirror_hostname: String,
    pub network_type: NetworkType,
    pub base_domain: String,
}

impl Substitutions {
    pub fn new(infra: &InfraAddress, network_type: NetworkType, base_domain: &str) -> Self {
        Self {
            name_suffix: random_name_suffix(),
            region: infra.region.clone(),
            private_subnets: infra.private_subnets.clone(),
            mirror_hostname: infra.private_hostname.clone(),
            network_type,
            base_domain: base_domain.to_string(),
        }
    }

    fn pairs(&self) -> [(&'static str, String); 8] {
        [
            ("$RANDOM_VALUE", self.name_suffix.to_string()),
            ("${region}", self.region.clone()),
            ("${private_subnet_1}", self.private_subnets[0].clone()),
            ("${private_subnet_2}", self.private_subnets[1].clone()),
            ("${private_subnet_3}", self.private_subnets[2].clone()),
            ("$CNI", self.network_type.as_str().to_string()),
            ("$hostname", self.mirror_hostname.clone()),
            ("${base_domain}", self.base_domain.clone()),
        ]
    }
}

/// Five-digit suffix for the generated cluster name.
pub fn random_name_suffix() -> u32 {
    rand::rng().random_range(10_000..=99_999)
}

/// Built-in configuration: single control-plane node, internal publishing,
/// release images pulled through the registry mirror.
pub fn default_document() -> Value {
    json!({
        "apiVersion": "v1",
        "baseDomain": "${base_domain}",
        "credentialsMode": "Passthrough",
        "compute": [{
            "architecture": "amd64",
            "hyperthreading": "Enabled",
            "name": "worker",
            "platform": {},
            "replicas": 0
        }],
        "controlPlane": {
            "architecture": "amd64",
            "hyperthreading": "Enabled",
            "name": "master",
            "platform": {},
            "replicas": 1
        },
        "metadata": {"name": "disconnected-$RANDOM_VALUE"},
        "networking": {
            "clusterNetwork": [{"cidr": "10.128.0.0/14", "hostPrefix": 23}],
            "machineNetwork": [
                {"cidr": "10.0.0.32/27"},
                {"cidr": "10.0.0.64/27"},
                {"cidr": "10.0.0.96/27"}
            ],
            "networkType": "$CNI",
            "serviceNetwork": ["172.30.0.0/16"]
        },
        "platform": {
            "aws": {
                "region": "${region}",
                "subnets": ["${private_subnet_1}", "${private_subnet_2}", "${private_subnet_3}"]
            }
        },
        "publish": "Internal",
        "imageContentSources": [
            {
                "mirrors": ["$hostname:8443/openshift/release"],
                "source": "quay.io/openshift-release-dev/ocp-v4.0-art-dev"
            },
            {
                "mirrors": ["$hostname:8443/openshift/release-images"],
                "source": "quay.io/openshift-release-dev/ocp-release"
            }
        ]
    })
}

/// Load a custom YAML configuration as a JSON document.
pub fn load_custom(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let document: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Invalid YAML in {}", path.display()))?;
    if !document.is_object() {
        anyhow::bail!("{} must be a YAML mapping", path.display());
    }
    Ok(document)
}

/// Replace placeholders in every string value of the document.
pub fn populate(document: &mut Value, substitutions: &Substitutions) {
    let pairs = substitutions.pairs();
    substitute(document, &pairs);
}

fn substitute(value: &mut Value, pairs: &[(&'static str, String)]) {
    match value {
        Value::String(s) => {
            for (placeholder, replacement) in pairs {
                if s.contains(placeholder) {
                    *s = s.replace(placeholder, replacement);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute(v, pairs)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute(v, pairs)),
        _ => {}
    }
}

/// Build the document to submit: custom or default, populated.
pub fn build(custom: Option<&Path>, substitutions: &Substitutions) -> Result<Value> {
    let mut document = match custom {
        Some(path) => load_custom(path)?,
        None => default_document(),
    };
    populate(&mut document, substitutions);
    Ok(document)
}
