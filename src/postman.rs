/*!
    Postman API client.

    A thin wrapper over the handful of Postman REST endpoints the pipeline needs:
    listing workspaces and collections, fetching a collection, creating one and
    replacing one. Every call authenticates with the `X-API-Key` header; any
    non-2xx response is turned into `AppError::PostmanApi`.
*/

use crate::collection::Collection;
use crate::error::{AppError, AppResult};
use log::{debug, error};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

pub const POSTMAN_API_BASE_URL: &str = "https://api.getpostman.com";
pub const API_KEY_ENV: &str = "POSTMAN_API_KEY";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkspaceSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CollectionSummary {
    #[serde(default)]
    pub id: Option<String>,
    pub uid: String,
    pub name: String,
}

/// Identifiers returned after a create or update.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CollectionRef {
    #[serde(default)]
    pub id: Option<String>,
    pub uid: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkspacesResponse {
    #[serde(default)]
    workspaces: Vec<WorkspaceSummary>,
}

#[derive(Debug, Deserialize)]
struct CollectionsResponse {
    #[serde(default)]
    collections: Vec<CollectionSummary>,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    collection: Collection,
}

#[derive(Debug, Deserialize)]
struct CollectionRefResponse {
    collection: CollectionRef,
}

pub struct PostmanClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PostmanClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, POSTMAN_API_BASE_URL)
    }

    /// Client talking to another host, e.g. a mock server.
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        PostmanClient {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build a client from the credential, failing when it is absent or blank.
    pub fn from_key(api_key: Option<&str>) -> AppResult<Self> {
        match api_key {
            Some(key) if !key.trim().is_empty() => Ok(Self::new(key.trim())),
            _ => Err(AppError::MissingCredential(API_KEY_ENV)),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        workspace: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> AppResult<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{} {} (workspace: {:?})", method, url, workspace);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("X-API-Key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(workspace) = workspace {
            request = request.query(&[("workspace", workspace)]);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!("{} {} returned status: {}", method, url, status);
        let text = response.text().await?;
        if !status.is_success() {
            error!("{} {} failed with status {}: {}", method, url, status, text);
            return Err(AppError::PostmanApi(format!("{} {}", status.as_u16(), text)));
        }
        serde_json::from_str(&text)
            .map_err(|e| AppError::PostmanApi(format!("Failed to parse response from {}: {}", url, e)))
    }

    pub async fn get_workspaces(&self) -> AppResult<Vec<WorkspaceSummary>> {
        let response: WorkspacesResponse = self.send(Method::GET, "/workspaces", None, None).await?;
        Ok(response.workspaces)
    }

    /// Collections visible to the key, optionally limited to one workspace.
    pub async fn get_collections(&self, workspace: Option<&str>) -> AppResult<Vec<CollectionSummary>> {
        let response: CollectionsResponse = self.send(Method::GET, "/collections", workspace, None).await?;
        Ok(response.collections)
    }

    pub async fn get_collection(&self, uid: &str) -> AppResult<Collection> {
        let response: CollectionResponse = self.send(Method::GET, &format!("/collections/{}", uid), None, None).await?;
        Ok(response.collection)
    }

    pub async fn create_collection(&self, collection: &Collection, workspace: Option<&str>) -> AppResult<CollectionRef> {
        let body = json!({ "collection": collection });
        let response: CollectionRefResponse = self.send(Method::POST, "/collections", workspace, Some(body)).await?;
        Ok(response.collection)
    }

    /// Replace a collection wholesale.
    pub async fn update_collection(&self, uid: &str, collection: &Collection) -> AppResult<CollectionRef> {
        let body = json!({ "collection": collection });
        let response: CollectionRefResponse =
            self.send(Method::PUT, &format!("/collections/{}", uid), None, Some(body)).await?;
        Ok(response.collection)
    }

    pub async fn find_collection_by_name(&self, name: &str, workspace: Option<&str>) -> AppResult<Option<CollectionSummary>> {
        let collections = self.get_collections(workspace).await?;
        Ok(collections.into_iter().find(|c| c.name == name))
    }
}
