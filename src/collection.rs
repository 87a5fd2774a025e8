/*!
    Postman collection (v2.1) model.

    Only the fields the pipeline inspects are typed; everything else on each level is
    kept in a flattened map so a collection survives a read/modify/write cycle.
*/

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

pub const PREREQUEST: &str = "prerequest";
pub const TEST: &str = "test";
pub const SCRIPT_TYPE: &str = "text/javascript";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub info: CollectionInfo,
    #[serde(default)]
    pub item: Vec<Item>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Collection {
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| AppError::from(e).in_file(path))
    }

    pub fn write_to(&self, path: &Path) -> AppResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// A folder (has `item`) or a request (has `request`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ItemRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Vec<Event>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Vec<Item>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    /// Script lines of the first event listening on `listen`, if any.
    pub fn script_lines(&self, listen: &str) -> &[String] {
        self.event
            .as_deref()
            .and_then(|events| events.iter().find(|e| e.listen == listen))
            .and_then(|e| e.script.as_ref())
            .map(|s| s.exec.as_slice())
            .unwrap_or(&[])
    }

    /// Replace the script of the `listen` event, appending a new event if none exists.
    pub fn set_script(&mut self, listen: &str, lines: &[String]) {
        let events = self.event.get_or_insert_with(Vec::new);
        match events.iter_mut().find(|e| e.listen == listen) {
            Some(event) => match event.script.as_mut() {
                Some(script) => script.exec = lines.to_vec(),
                None => event.script = Some(Script::javascript(lines)),
            },
            None => events.push(Event {
                listen: listen.to_string(),
                script: Some(Script::javascript(lines)),
                extra: Map::new(),
            }),
        }
    }
}

/// `item.request` is either a bare URL (an implicit GET) or a request object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemRequest {
    Url(String),
    Full(Request),
}

impl ItemRequest {
    pub fn method(&self) -> &str {
        match self {
            ItemRequest::Url(_) => "GET",
            ItemRequest::Full(request) => &request.method,
        }
    }

    pub fn match_path(&self) -> String {
        match self {
            ItemRequest::Url(url) => url.clone(),
            ItemRequest::Full(request) => request.url.as_ref().map(RequestUrl::match_path).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<RequestUrl>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// `request.url` is either the raw URL string or a structured object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestUrl {
    Raw(String),
    Parts(UrlParts),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlParts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<UrlPath>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlPath {
    Segments(Vec<Value>),
    Joined(String),
}

impl RequestUrl {
    /// Path used for script matching: the `path` segments joined with `/`, the
    /// path string, or the raw URL when no path is given.
    pub fn match_path(&self) -> String {
        match self {
            RequestUrl::Raw(raw) => raw.clone(),
            RequestUrl::Parts(parts) => match &parts.path {
                Some(UrlPath::Segments(segments)) => segments.iter().map(segment_text).collect::<Vec<_>>().join("/"),
                Some(UrlPath::Joined(path)) => path.clone(),
                None => parts.raw.clone().unwrap_or_default(),
            },
        }
    }
}

fn segment_text(segment: &Value) -> String {
    match segment {
        Value::String(s) => s.clone(),
        Value::Object(o) => o.get("value").and_then(Value::as_str).unwrap_or_default().to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub listen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default, deserialize_with = "string_or_lines")]
    pub exec: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Script {
    fn javascript(lines: &[String]) -> Self {
        Script { exec: lines.to_vec(), kind: Some(SCRIPT_TYPE.to_string()), extra: Map::new() }
    }
}

/// `exec` may be written as a single string instead of a list of lines.
fn string_or_lines<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Exec {
        Lines(Vec<String>),
        Single(String),
        Null(()),
    }
    Ok(match Exec::deserialize(deserializer)? {
        Exec::Lines(lines) => lines,
        Exec::Single(line) => vec![line],
        Exec::Null(()) => Vec::new(),
    })
}

/// Identity of an endpoint across collection regenerations: `METHOD:path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptKey(String);

impl ScriptKey {
    pub fn new(method: &str, path: &str) -> Self {
        ScriptKey(format!("{}:{}", method.to_uppercase(), path))
    }

    pub fn for_request(request: &ItemRequest) -> Self {
        ScriptKey::new(request.method(), &request.match_path())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
