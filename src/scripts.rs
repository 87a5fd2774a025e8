/*!
    Hand-written Postman scripts that must survive collection regeneration.

    Regenerating a collection from the gateway specs throws away the pre-request and
    test scripts people wrote in Postman. `ScriptStore` lifts those scripts out of a
    previous collection, keyed by `METHOD:path`, and puts them back onto the matching
    requests of the regenerated collection.
*/

use crate::collection::{Collection, Item, ScriptKey, PREREQUEST, TEST};
use crate::error::AppResult;
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::path::Path;

/// File suffix of collections produced by the generator.
pub const COLLECTION_SUFFIX: &str = ".postman_collection.json";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scripts {
    pub pre_request: Vec<String>,
    pub test: Vec<String>,
}

impl Scripts {
    pub fn is_empty(&self) -> bool {
        self.pre_request.is_empty() && self.test.is_empty()
    }
}

/// Scripts of one request in a previous collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptEntry {
    /// Folder path of the request, e.g. `App API Gateway/users/List users`.
    pub path: String,
    pub method: String,
    pub scripts: Scripts,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptStore {
    entries: IndexMap<ScriptKey, ScriptEntry>,
    collisions: Vec<ScriptKey>,
}

impl ScriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &ScriptKey) -> Option<&ScriptEntry> {
        self.entries.get(key)
    }

    /// Keys that were seen more than once while extracting. The entry kept for such
    /// a key is the last one in traversal order.
    pub fn collisions(&self) -> &[ScriptKey] {
        &self.collisions
    }

    /// Record the scripts of every request in `collection`. `root` prefixes the
    /// folder path stored with each entry.
    pub fn extract(&mut self, collection: &Collection, root: &str) {
        self.extract_items(&collection.item, root);
    }

    fn extract_items(&mut self, items: &[Item], parent: &str) {
        for item in items {
            let name = item.name.as_deref().unwrap_or_default();
            let current = if parent.is_empty() { name.to_string() } else { format!("{}/{}", parent, name) };

            if let Some(request) = &item.request {
                let scripts = Scripts {
                    pre_request: item.script_lines(PREREQUEST).to_vec(),
                    test: item.script_lines(TEST).to_vec(),
                };
                if !scripts.is_empty() {
                    let key = ScriptKey::for_request(request);
                    let entry = ScriptEntry {
                        path: current.clone(),
                        method: request.method().to_string(),
                        scripts,
                    };
                    if let Some(previous) = self.entries.insert(key.clone(), entry) {
                        warn!(
                            "Script key {} collides: '{}' replaces scripts of '{}'",
                            key, current, previous.path
                        );
                        self.collisions.push(key);
                    }
                }
            }

            if let Some(children) = &item.item {
                self.extract_items(children, &current);
            }
        }
    }

    /// Put stored scripts onto every matching request of `collection`.
    ///
    /// Returns the number of requests that matched a stored entry.
    pub fn merge_into(&self, collection: &mut Collection) -> usize {
        let mut merged = 0;
        self.merge_items(&mut collection.item, &mut merged);
        merged
    }

    fn merge_items(&self, items: &mut [Item], merged: &mut usize) {
        for item in items.iter_mut() {
            let entry = item.request.as_ref().and_then(|r| self.entries.get(&ScriptKey::for_request(r)));
            if let Some(entry) = entry {
                item.event.get_or_insert_with(Vec::new);
                if !entry.scripts.pre_request.is_empty() {
                    item.set_script(PREREQUEST, &entry.scripts.pre_request);
                }
                if !entry.scripts.test.is_empty() {
                    item.set_script(TEST, &entry.scripts.test);
                }
                *merged += 1;
                debug!("Merged scripts for: {} {}", entry.method, entry.path);
            }

            if let Some(children) = item.item.as_mut() {
                self.merge_items(children, merged);
            }
        }
    }

    /// Extract scripts from a collection file. A missing file is skipped with a warning.
    pub fn extract_file(&mut self, path: &Path) -> AppResult<()> {
        if !path.exists() {
            warn!("Collection not found: {}", path.display());
            return Ok(());
        }
        info!("Extracting scripts from: {}", path.display());
        let collection = Collection::from_file(path)?;
        self.extract(&collection, "");
        info!("Store now holds {} script entries", self.len());
        Ok(())
    }

    /// Extract scripts from every generated collection file in `dir`.
    pub fn extract_dir(&mut self, dir: &Path) -> AppResult<()> {
        if !dir.exists() {
            warn!("Existing collections directory not found: {}", dir.display());
            return Ok(());
        }
        for file in collection_files(dir)? {
            self.extract_file(&file)?;
        }
        Ok(())
    }

    /// Merge stored scripts into a collection file and rewrite it.
    ///
    /// A missing file is skipped with a warning and counts as zero merges.
    pub fn merge_file(&self, path: &Path) -> AppResult<usize> {
        if !path.exists() {
            warn!("Collection not found: {}", path.display());
            return Ok(0);
        }
        info!("Merging scripts into: {}", path.display());
        let mut collection = Collection::from_file(path)?;
        let merged = self.merge_into(&mut collection);
        collection.write_to(path)?;
        info!("Merged {} script sets into {}", merged, path.display());
        Ok(merged)
    }
}

/// Generated collection files in `dir`, sorted by name.
pub fn collection_files(dir: &Path) -> AppResult<Vec<std::path::PathBuf>> {
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(COLLECTION_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}
