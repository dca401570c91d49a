//! Deterministic `.tar.gz` sealing
//!
//! Entries are written in the order given (callers pass a sorted list) with zeroed mtimes,
//! owner ids and fixed modes, and the gzip header carries no timestamp or file name. The same
//! input files always produce the same archive bytes.

use flate2::Compression;
use flate2::GzBuilder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{CaptureError, CaptureResult};

pub const ARCHIVE_FILE: &str = "bundle.tar.gz";

/// Archive `files` (paths relative to `root`, `/`-separated) into `dest`
///
/// Writes to a temporary sibling first and renames into place. Returns the archive size.
pub fn write_archive(root: &Path, files: &[String], dest: &Path) -> CaptureResult<u64> {
    let tmp = dest.with_extension("gz.tmp");
    let result = write_to(root, files, &tmp).and_then(|()| {
        std::fs::rename(&tmp, dest).map_err(|e| CaptureError::io_at(&e, dest))?;
        let len = std::fs::metadata(dest)
            .map_err(|e| CaptureError::io_at(&e, dest))?
            .len();
        Ok(len)
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_to(root: &Path, files: &[String], tmp: &Path) -> CaptureResult<()> {
    let out = File::create(tmp).map_err(|e| CaptureError::io_at(&e, tmp))?;
    let gz = GzBuilder::new()
        .mtime(0)
        .write(BufWriter::new(out), Compression::default());
    let mut tar = tar::Builder::new(gz);
    tar.mode(tar::HeaderMode::Deterministic);

    for rel in files {
        let path = root.join(rel);
        let mut src = File::open(&path).map_err(|e| CaptureError::packaging_at(e.to_string(), &path))?;
        let size = src
            .metadata()
            .map_err(|e| CaptureError::io_at(&e, &path))?
            .len();

        let mut header = tar::Header::new_gnu();
        header.set_size(size);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_entry_type(tar::EntryType::Regular);
        tar.append_data(&mut header, rel, &mut src)
            .map_err(|e| CaptureError::io_at(&e, &path))?;
    }

    let gz = tar
        .into_inner()
        .map_err(|e| CaptureError::io(format!("Failed to finish archive: {}", e)))?;
    let mut writer = gz
        .finish()
        .map_err(|e| CaptureError::io(format!("Failed to finish gzip stream: {}", e)))?;
    writer
        .flush()
        .map_err(|e| CaptureError::io(format!("Failed to flush archive: {}", e)))?;
    let file = writer
        .into_inner()
        .map_err(|e| CaptureError::io(format!("Failed to flush archive: {}", e.error())))?;
    file.sync_all().map_err(|e| CaptureError::io_at(&e, tmp))?;
    Ok(())
}
