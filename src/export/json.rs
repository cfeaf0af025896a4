//! JSON export of review listings.
//! Writes the entries returned by `ReviewManager::get_all_reviews` to a file.

use crate::error::Result;
use crate::models::ReviewEntry;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Exports review entries to a pretty-printed JSON file at the specified path.
/// Returns an error if file creation or writing fails.
pub fn export_reviews_to_path(entries: &[ReviewEntry], path: impl AsRef<Path>) -> Result<()> {
    let json_string = serde_json::to_string_pretty(entries)?;
    let mut file = File::create(path.as_ref())?;
    file.write_all(json_string.as_bytes())?;

    tracing::info!(
        path = %path.as_ref().display(),
        count = entries.len(),
        "Reviews exported"
    );
    Ok(())
}
