use anyhow::Result;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Missing service specs: {}", format_missing(.0))]
    MissingServices(Vec<MissingSpecs>),
    #[error("Failed to parse {}: {message}", file.display())]
    Parse { file: PathBuf, message: String },
    #[error("Unsupported spec format in file: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Missing 'address' in x-google-backend at {location} in {}", file.display())]
    MissingBackendAddress { location: String, file: PathBuf },
    #[error("No x-google-backend found in {}", .0.display())]
    BackendAbsent(PathBuf),
    #[error("External tool '{tool}' failed: {message}")]
    ExternalTool { tool: String, message: String },
    #[error("Postman API error: {0}")]
    PostmanApi(String),
    #[error("{0} environment variable is required")]
    MissingCredential(&'static str),
    #[error("Script preservation failed: {0}")]
    ScriptPreservation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("YAML error: {0}")]
    Serialization(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Attach the offending file to a parse error so the report is actionable.
    pub fn in_file(self, path: &std::path::Path) -> Self {
        match self {
            AppError::Serialization(e) => AppError::Parse { file: path.to_path_buf(), message: e.to_string() },
            AppError::Json(e) => AppError::Parse { file: path.to_path_buf(), message: e.to_string() },
            other => other,
        }
    }
}

/// Service specs a single gateway declares but that do not exist on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingSpecs {
    pub gateway: String,
    pub services: Vec<String>,
}

fn format_missing(missing: &[MissingSpecs]) -> String {
    missing
        .iter()
        .map(|m| format!("gateway '{}': {}", m.gateway, m.services.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type AppResult<T> = Result<T, AppError>;
