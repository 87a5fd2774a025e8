/*!
    Publishing generated collections to Postman.

    Each gateway's collection is pushed under a timestamped name
    (`<gateway>-staging-<timestamp>`). Publishing is create-or-update by exact name,
    so re-running with the same target name replaces the remote collection instead of
    adding a duplicate.
*/

use crate::collection::Collection;
use crate::config::{GatewayConfig, Layout};
use crate::error::AppResult;
use crate::postman::{PostmanClient, WorkspaceSummary};
use chrono::{DateTime, Local, Utc};
use log::{info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Timestamps of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStamp {
    /// Suffix used in remote collection names, e.g. `2024-01-15T10-30-45`.
    pub slug: String,
    /// Date shown to people, e.g. `Jan 15, 2024, 10:30 AM`.
    pub human: String,
}

/// Format of [`RunStamp::slug`].
pub const SLUG_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

impl RunStamp {
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        RunStamp {
            slug: time.format(SLUG_FORMAT).to_string(),
            human: time.with_timezone(&Local).format("%b %-d, %Y, %I:%M %p").to_string(),
        }
    }
}

/// Where one gateway's collection lives locally and how it is named remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionTarget {
    pub gateway: String,
    /// Local file name inside the collections directory.
    pub file: String,
    /// Unique remote name, used to find an existing collection.
    pub name: String,
    pub display_name: String,
    /// Gateway display name; also the name of the untimestamped base collection.
    pub base_name: String,
}

impl CollectionTarget {
    pub fn new(gateway: &str, base_name: &str, stamp: &RunStamp) -> Self {
        CollectionTarget {
            gateway: gateway.to_string(),
            file: format!("{}-gateway.postman_collection.json", gateway),
            name: format!("{}-staging-{}", gateway, stamp.slug),
            display_name: format!("Project X - {} (Staging - {})", base_name, stamp.human),
            base_name: base_name.to_string(),
        }
    }

    pub fn path(&self, layout: &Layout) -> PathBuf {
        layout.collections_dir.join(&self.file)
    }
}

/// One target per configured gateway, or the two default gateways when there is
/// no gateway configuration.
pub fn collection_targets(config: Option<&GatewayConfig>, stamp: &RunStamp) -> Vec<CollectionTarget> {
    match config {
        Some(config) => config
            .gateways
            .iter()
            .map(|g| CollectionTarget::new(&g.id, g.display_name(), stamp))
            .collect(),
        None => vec![
            CollectionTarget::new("app", "App API Gateway", stamp),
            CollectionTarget::new("dashboard", "Dashboard API Gateway", stamp),
        ],
    }
}

/// Load the gateway config if present; its absence is not an error here.
pub fn load_targets(layout: &Layout, stamp: &RunStamp) -> AppResult<Vec<CollectionTarget>> {
    let config_path = layout.config_path();
    if config_path.exists() {
        let config = GatewayConfig::from_file(&config_path)?;
        Ok(collection_targets(Some(&config), stamp))
    } else {
        warn!("{} not found, using default collections", config_path.display());
        Ok(collection_targets(None, stamp))
    }
}

/// Prefer a team/project workspace, then the first one; `None` means the key's
/// personal workspace.
pub fn select_workspace(workspaces: &[WorkspaceSummary]) -> Option<&WorkspaceSummary> {
    workspaces
        .iter()
        .find(|ws| {
            let name = ws.name.to_lowercase();
            name.contains("team") || name.contains("project x") || ws.kind.as_deref() == Some("team")
        })
        .or_else(|| workspaces.first())
}

/// Description stamped onto every published collection.
pub fn describe(target_name: &str, generated: &str) -> String {
    let gateway = target_name.split('-').next().unwrap_or(target_name);
    format!(
        "Auto-generated Postman collection from staging deployment.\n\nGenerated: {}\nEnvironment: Staging\nSource: GitHub Actions Workflow\n\nThis collection contains all API endpoints for the {} gateway.",
        generated, gateway
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Created(String),
    Updated(String),
    /// Dry run: what would have happened.
    Planned { update: bool },
}

/// Create or replace the remote collection named `target_name`.
///
/// Returns `None` when the local file does not exist.
pub async fn publish_collection(
    client: &PostmanClient,
    path: &Path,
    target_name: &str,
    display_name: &str,
    workspace: Option<&str>,
    stamp: &RunStamp,
    dry_run: bool,
) -> AppResult<Option<PublishOutcome>> {
    info!("Pushing collection: {}", display_name);
    if !path.exists() {
        warn!("Collection file not found: {}", path.display());
        return Ok(None);
    }

    let mut collection = Collection::from_file(path)?;
    collection.info.name = display_name.to_string();
    collection.info.description = Some(Value::String(describe(target_name, &stamp.human)));

    let existing = client.find_collection_by_name(target_name, workspace).await?;
    if dry_run {
        match &existing {
            Some(c) => info!("[Dry Run] Would update collection {} (ID: {})", display_name, c.uid),
            None => info!("[Dry Run] Would create collection {}", display_name),
        }
        return Ok(Some(PublishOutcome::Planned { update: existing.is_some() }));
    }

    let outcome = match existing {
        Some(found) => {
            info!("Updating existing collection: {} (ID: {})", display_name, found.uid);
            client.update_collection(&found.uid, &collection).await?;
            PublishOutcome::Updated(found.uid)
        }
        None => {
            info!("Creating new collection: {}", display_name);
            let created = client.create_collection(&collection, workspace).await?;
            PublishOutcome::Created(created.uid)
        }
    };
    Ok(Some(outcome))
}

/// Resolve the workspace to publish into. Failing to list workspaces is not fatal.
pub async fn resolve_workspace(client: &PostmanClient) -> Option<String> {
    match client.get_workspaces().await {
        Ok(workspaces) => match select_workspace(&workspaces) {
            Some(ws) => {
                info!("Using workspace: {} ({})", ws.name, ws.id);
                Some(ws.id.clone())
            }
            None => {
                info!("Using personal workspace (no workspace found)");
                None
            }
        },
        Err(e) => {
            warn!("Could not fetch workspaces, using personal workspace: {}", e);
            None
        }
    }
}

/// Publish every gateway's collection.
pub async fn push_all(client: &PostmanClient, layout: &Layout, dry_run: bool) -> AppResult<Vec<PublishOutcome>> {
    let workspace = resolve_workspace(client).await;
    if !layout.collections_dir.exists() {
        warn!("Collections directory not found: {}", layout.collections_dir.display());
        return Ok(Vec::new());
    }

    let stamp = RunStamp::now();
    let mut outcomes = Vec::new();
    for target in load_targets(layout, &stamp)? {
        let outcome = publish_collection(
            client,
            &target.path(layout),
            &target.name,
            &target.display_name,
            workspace.as_deref(),
            &stamp,
            dry_run,
        )
        .await?;
        outcomes.extend(outcome);
    }
    Ok(outcomes)
}
