use crate::config::Layout;
use crate::error::AppResult;
use crate::postman::{CollectionSummary, PostmanClient};
use crate::publish::{load_targets, CollectionTarget, RunStamp, SLUG_FORMAT};
use crate::scripts::{collection_files, ScriptStore};
use chrono::NaiveDateTime;
use log::{info, warn};
use std::path::PathBuf;

/// Where previously published scripts are read from.
pub enum ScriptSource<'a> {
    /// The latest published collections of each gateway.
    Postman(&'a PostmanClient),
    /// Collection files exported earlier.
    Directory(PathBuf),
}

/// Outcome of a preservation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreservationReport {
    pub loaded: bool,
    pub found: usize,
    pub merged: usize,
    pub collisions: usize,
}

impl PreservationReport {
    /// Scripts were loaded, at least one was found, and at least one was merged.
    pub fn is_success(&self) -> bool {
        self.loaded && self.found > 0 && self.merged > 0
    }
}

/// Timestamp encoded in `<gateway>-staging-<timestamp>`, if `name` belongs to `gateway`.
pub fn staging_timestamp(name: &str, gateway: &str) -> Option<NaiveDateTime> {
    let suffix = name.strip_prefix(gateway)?.strip_prefix("-staging-")?;
    NaiveDateTime::parse_from_str(suffix, SLUG_FORMAT).ok()
}

/// The collection to read scripts from for one gateway: its most recent timestamped
/// staging collection, or else the collection named after the gateway.
pub fn select_previous<'c>(collections: &'c [CollectionSummary], target: &CollectionTarget) -> Option<&'c CollectionSummary> {
    collections
        .iter()
        .filter_map(|c| staging_timestamp(&c.name, &target.gateway).map(|ts| (ts, c)))
        .max_by_key(|(ts, _)| *ts)
        .map(|(_, c)| c)
        .or_else(|| collections.iter().find(|c| c.name == target.base_name))
}

/// Fill `store` from the previously published collections of every target.
pub async fn load_from_postman(client: &PostmanClient, targets: &[CollectionTarget], store: &mut ScriptStore) -> AppResult<()> {
    let collections = client.get_collections(None).await?;
    for target in targets {
        match select_previous(&collections, target) {
            Some(previous) => {
                info!("Found previous collection for {}: {}", target.gateway, previous.name);
                let collection = client.get_collection(&previous.uid).await?;
                store.extract(&collection, &previous.name);
            }
            None => info!("No previous collection for gateway {}", target.gateway),
        }
    }
    Ok(())
}

/// Load previous scripts and merge them into every generated collection file.
///
/// Failing to load from Postman is logged and the run continues without
/// preserved scripts; the report then says `loaded: false`.
pub async fn preserve_scripts(source: ScriptSource<'_>, layout: &Layout) -> AppResult<PreservationReport> {
    let mut store = ScriptStore::new();
    let mut report = PreservationReport::default();

    match source {
        ScriptSource::Postman(client) => {
            let targets = load_targets(layout, &RunStamp::now())?;
            match load_from_postman(client, &targets, &mut store).await {
                Ok(()) => report.loaded = true,
                Err(e) => {
                    warn!("Could not load existing scripts from Postman API: {}", e);
                    warn!("Continuing without script preservation...");
                }
            }
        }
        ScriptSource::Directory(dir) => {
            store.extract_dir(&dir)?;
            report.loaded = true;
        }
    }
    report.found = store.len();
    report.collisions = store.collisions().len();
    info!("Loaded {} script entries from existing collections", report.found);

    if layout.collections_dir.exists() {
        for file in collection_files(&layout.collections_dir)? {
            report.merged += store.merge_file(&file)?;
        }
    } else {
        warn!("Collections directory not found: {}", layout.collections_dir.display());
    }

    if !report.is_success() {
        warn!(
            "Script preservation validation failed: loaded={}, found={}, merged={}",
            report.loaded, report.found, report.merged
        );
    }
    Ok(report)
}
