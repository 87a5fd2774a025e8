/*!
    Typed views of the OpenAPI / Swagger documents handled by the pipeline.

    Only the parts the pipeline reads or writes are modelled. Everything else in a
    service spec is ignored when merging, so service teams are free to carry extra
    top-level keys (tags, externalDocs, ...) without affecting gateway output.
*/

use crate::config::{Gateway, Host};
use crate::error::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Vendor extension carrying the managed gateway's backend routing.
pub const BACKEND_KEY: &str = "x-google-backend";

/// HTTP methods that may appear as operations under a path item.
pub const HTTP_METHODS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

/// The two document generations the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    /// Swagger 2.0 (`swagger: "2.0"`).
    Swagger2,
    /// OpenAPI 3.0.x (`openapi: "3.0.*"`).
    OpenApi30,
}

impl SpecFormat {
    /// Inspect the version marker of a parsed document.
    pub fn detect(doc: &Value) -> Option<Self> {
        match doc.get("swagger") {
            Some(Value::String(v)) if v == "2.0" => return Some(SpecFormat::Swagger2),
            Some(Value::Number(n)) if n.as_f64() == Some(2.0) => return Some(SpecFormat::Swagger2),
            _ => {}
        }
        match doc.get("openapi") {
            Some(Value::String(v)) if v.starts_with("3.0.") => Some(SpecFormat::OpenApi30),
            _ => None,
        }
    }
}

/// `components` section of a service spec; only the merged sections are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Components {
    #[serde(default, deserialize_with = "nullable_mapping")]
    pub schemas: Mapping,
    #[serde(rename = "securitySchemes", default, deserialize_with = "nullable_mapping")]
    pub security_schemes: Mapping,
    #[serde(default, deserialize_with = "nullable_mapping", skip_serializing_if = "Mapping::is_empty")]
    pub responses: Mapping,
}

/// A service team's spec, after normalization to OpenAPI 3.0.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceSpec {
    #[serde(default, deserialize_with = "nullable_mapping")]
    pub paths: Mapping,
    #[serde(default)]
    pub components: Option<Components>,
    #[serde(rename = "x-google-backend", default)]
    pub backend: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    pub license: License,
}

/// The merged document written for one gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySpec {
    pub openapi: String,
    pub info: Info,
    pub servers: Vec<Host>,
    pub paths: Mapping,
    pub components: Components,
}

impl GatewaySpec {
    /// Empty accumulator carrying the gateway's declared metadata.
    pub fn for_gateway(gateway: &Gateway) -> Self {
        GatewaySpec {
            openapi: "3.0.0".to_string(),
            info: Info {
                title: gateway.display_name().to_string(),
                description: gateway.description.clone(),
                version: gateway.version.clone(),
                license: License {
                    name: "MIT".to_string(),
                    url: "https://opensource.org/licenses/MIT".to_string(),
                },
            },
            servers: gateway
                .hosts
                .iter()
                .map(|h| Host { url: h.url.clone(), description: h.description.clone() })
                .collect(),
            paths: Mapping::new(),
            components: Components::default(),
        }
    }

    pub fn to_yaml(&self) -> AppResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn nullable_mapping<'de, D>(deserializer: D) -> Result<Mapping, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default())
}

/// Read and parse a YAML document, reporting the file on failure.
///
/// Merge keys (`<<: *anchor`) are resolved before `T` is deserialized.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let content = std::fs::read_to_string(path)?;
    let mut doc: Value = serde_yaml::from_str(&content).map_err(|e| AppError::from(e).in_file(path))?;
    doc.apply_merge().map_err(|e| AppError::from(e).in_file(path))?;
    serde_yaml::from_value(doc).map_err(|e| AppError::from(e).in_file(path))
}
