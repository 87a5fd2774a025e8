use crate::error::{AppError, AppResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One deployment host of a gateway; becomes an OpenAPI `servers` entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Host {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A gateway entry as it appears in `config.json`, before validation.
#[derive(Debug, Deserialize)]
struct RawGateway {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    hosts: Option<serde_json::Value>,
    #[serde(default)]
    services: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    gateways: IndexMap<String, RawGateway>,
}

/// A validated gateway definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Gateway {
    /// Key under `gateways`, used for file names (`<id>.yaml`).
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub hosts: Vec<Host>,
    pub services: Vec<String>,
}

impl Gateway {
    /// Human facing name, falling back to the config key.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// The gateway configuration, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub gateways: Vec<Gateway>,
}

impl GatewayConfig {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Cannot read gateway config {}: {}", path.display(), e)))?;
        Self::from_json(&content).map_err(|e| e.in_file(path))
    }

    pub fn from_json(content: &str) -> AppResult<Self> {
        let raw: RawConfig = serde_json::from_str(content)?;
        let gateways = raw
            .gateways
            .into_iter()
            .map(|(id, raw)| validate_gateway(id, raw))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(GatewayConfig { gateways })
    }
}

fn validate_gateway(id: String, raw: RawGateway) -> AppResult<Gateway> {
    let hosts = match raw.hosts {
        None | Some(serde_json::Value::Null) => {
            return Err(AppError::Config(format!("Missing 'hosts' property for gateway: {}", id)));
        }
        Some(value @ serde_json::Value::Array(_)) => serde_json::from_value::<Vec<Host>>(value)
            .map_err(|e| AppError::Config(format!("Invalid 'hosts' entry for gateway {}: {}", id, e)))?,
        Some(_) => {
            return Err(AppError::Config(format!("'hosts' property must be an array for gateway: {}", id)));
        }
    };
    if hosts.is_empty() {
        return Err(AppError::Config(format!("'hosts' must not be empty for gateway: {}", id)));
    }

    Ok(Gateway {
        name: raw.name.unwrap_or_default(),
        description: raw.description,
        version: raw.version.unwrap_or_else(|| "1.0.0".to_string()),
        hosts,
        services: raw.services,
        id,
    })
}

/// Directory layout of the repository the pipeline runs in.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub services_dir: PathBuf,
    pub gateway_dir: PathBuf,
    pub generate_dir: PathBuf,
    pub collections_dir: PathBuf,
}

impl Layout {
    pub fn from_root(root: &Path) -> Self {
        Layout {
            services_dir: root.join("services"),
            gateway_dir: root.join("gateway"),
            generate_dir: root.join(".generate"),
            collections_dir: root.join("postman-collections"),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.gateway_dir.join("config.json")
    }

    pub fn service_spec(&self, service: &str) -> PathBuf {
        self.services_dir.join(format!("{}.yaml", service))
    }

    pub fn gateway_spec(&self, gateway: &str) -> PathBuf {
        self.gateway_dir.join(format!("{}.yaml", gateway))
    }
}
