//! CSV export of stored repositories

use crate::storage::{format_timestamp, SqliteStorage, StorageResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Header row of the export
pub const CSV_HEADER: [&str; 8] = [
    "id",
    "owner",
    "name",
    "full_name",
    "star_count",
    "fetched_at",
    "created_at",
    "updated_at",
];

/// Exports every stored repository to a CSV file, most stars first
///
/// # Returns
///
/// The number of data rows written
pub fn export_csv(storage: &SqliteStorage, path: &Path) -> StorageResult<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let rows = write_csv(storage, file)?;

    tracing::info!("Exported {} repositories to {}", rows, path.display());
    Ok(rows)
}

/// Writes the CSV export to any writer
pub fn write_csv<W: Write>(storage: &SqliteStorage, out: W) -> StorageResult<u64> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_HEADER)?;

    let rows = storage.for_each_repository(|stored| {
        let repo = &stored.repository;
        let id = repo.id().map(|id| id.to_string()).unwrap_or_default();
        writer.write_record([
            id.as_str(),
            repo.owner(),
            repo.name(),
            repo.full_name().as_str(),
            repo.star_count().to_string().as_str(),
            format_timestamp(repo.fetched_at()).as_str(),
            stored.created_at.as_str(),
            stored.updated_at.as_str(),
        ])?;
        Ok(())
    })?;

    writer.flush()?;
    Ok(rows)
}
