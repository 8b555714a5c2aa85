//! Deterministic zip packaging.
//!
//! Entries are sorted by path and carry the collection timestamp and fixed
//! permissions, so identical inputs produce identical archives.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{EvidenceError, EvidenceResult};
use crate::hashes::pack_files;

const ENTRY_PERMISSIONS: u32 = 0o644;

fn zip_timestamp(at: DateTime<Utc>) -> EvidenceResult<zip::DateTime> {
    let narrow = |value: u32| u8::try_from(value).map_err(|e| EvidenceError::Timestamp(e.to_string()));
    let year = u16::try_from(at.year()).map_err(|e| EvidenceError::Timestamp(e.to_string()))?;
    zip::DateTime::from_date_and_time(
        year,
        narrow(at.month())?,
        narrow(at.day())?,
        narrow(at.hour())?,
        narrow(at.minute())?,
        narrow(at.second())?,
    )
    .map_err(|_| EvidenceError::Timestamp(at.to_rfc3339()))
}

/// Zip every file under `staging` into `dest`, below the folder `root`.
///
/// The archive is written next to `dest` and renamed into place once
/// complete, so a failed write never leaves a partial archive under the
/// final name. Returns the number of entries.
pub fn write_archive(staging: &Path, root: &str, dest: &Path, modified: DateTime<Utc>) -> EvidenceResult<usize> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip_timestamp(modified)?)
        .unix_permissions(ENTRY_PERMISSIONS);

    let files = pack_files(staging)?;
    let partial = dest.with_extension("zip.partial");
    let file = File::create(&partial).map_err(|e| EvidenceError::io(&partial, e))?;

    if let Err(e) = write_entries(ZipWriter::new(file), &files, root, options, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    fs::rename(&partial, dest).map_err(|e| EvidenceError::io(dest, e))?;
    info!("Wrote {} entries to {:?}", files.len(), dest);
    Ok(files.len())
}

fn write_entries(
    mut zip: ZipWriter<File>,
    files: &[(String, PathBuf)],
    root: &str,
    options: SimpleFileOptions,
    partial: &Path,
) -> EvidenceResult<()> {
    for (relative, path) in files {
        let name = format!("{}/{}", root, relative);
        debug!("Adding {}", name);
        let bytes = fs::read(path).map_err(|e| EvidenceError::io(path, e))?;
        zip.start_file(name, options)?;
        zip.write_all(&bytes).map_err(|e| EvidenceError::io(partial, e))?;
    }
    let file = zip.finish()?;
    file.sync_all().map_err(|e| EvidenceError::io(partial, e))?;
    Ok(())
}
