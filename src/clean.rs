use crate::config::Layout;
use crate::error::AppResult;
use log::{error, info};

/// Remove generated gateway specs (`gateway/*.yaml`) and the `.generate` directory.
/// `config.json` is never touched.
///
/// Returns the number of gateway files removed.
pub fn clean(layout: &Layout) -> AppResult<usize> {
    let mut removed = 0;
    if layout.gateway_dir.exists() {
        let mut files: Vec<_> = std::fs::read_dir(&layout.gateway_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().map(|e| e == "yaml").unwrap_or(false))
            .collect();
        files.sort();
        for file in files {
            match std::fs::remove_file(&file) {
                Ok(()) => {
                    info!("Removed: {}", file.display());
                    removed += 1;
                }
                Err(e) => error!("Error removing {}: {}", file.display(), e),
            }
        }
    }

    if layout.generate_dir.exists() {
        std::fs::remove_dir_all(&layout.generate_dir)?;
        info!("Removed: {}", layout.generate_dir.display());
    } else {
        info!("Directory not found: {}", layout.generate_dir.display());
    }
    Ok(removed)
}
