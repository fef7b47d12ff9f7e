//! Source archive extraction
//!
//! arXiv serves e-prints as gzipped tarballs, single gzipped `.tex` files,
//! plain tarballs or PDFs. The format is sniffed from magic bytes, the
//! archive unpacked into its version directory, and everything except
//! `.tex` and `.bib` files removed afterwards.

mod detect;
mod unpack;


pub use detect::{ArchiveFormat, detect_format};

use crate::error::{Error, ExtractionError, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File extensions kept after extraction (compared case-insensitively)
pub const KEPT_EXTENSIONS: &[&str] = &["tex", "bib"];

/// Result of extracting one archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Detected archive format
    pub format: ArchiveFormat,
    /// Files left in the destination
    pub kept: usize,
    /// Files deleted by the cleanup pass
    pub removed: usize,
}

/// Extract `archive` into `dest` and drop everything but LaTeX sources
///
/// `dest` is created if needed. A PDF leaves `dest` empty and still counts
/// as extracted. On an unknown or corrupt archive the destination directory
/// is removed and an [`Error::Extraction`] returned.
pub fn extract_and_clean(archive: &Path, dest: &Path) -> Result<ExtractionSummary> {
    std::fs::create_dir_all(dest)?;

    match unpack_into(archive, dest) {
        Ok(format) => {
            let (kept, removed) = remove_non_sources(dest);
            info!(
                archive = %archive.display(),
                format = format.label(),
                kept,
                removed,
                "extracted source archive"
            );
            Ok(ExtractionSummary {
                format,
                kept,
                removed,
            })
        }
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(dest) {
                warn!(dest = %dest.display(), error = %cleanup, "failed to remove partial extraction");
            }
            Err(e.into())
        }
    }
}

/// [`extract_and_clean`] on the blocking thread pool
pub async fn extract_and_clean_async(archive: PathBuf, dest: PathBuf) -> Result<ExtractionSummary> {
    tokio::task::spawn_blocking(move || extract_and_clean(&archive, &dest))
        .await
        .map_err(|e| Error::Other(format!("extraction task failed: {}", e)))?
}

fn unpack_into(archive: &Path, dest: &Path) -> std::result::Result<ArchiveFormat, ExtractionError> {
    let head = read_head(archive)?;
    let format = detect_format(&head);
    debug!(archive = %archive.display(), format = format.label(), "detected archive format");

    match &format {
        ArchiveFormat::Pdf => {}
        ArchiveFormat::TarGz => unpack::unpack_tar(archive, dest, true)?,
        ArchiveFormat::Tar => unpack::unpack_tar(archive, dest, false)?,
        ArchiveFormat::Gzip { original_name } => {
            let base = dest
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "source".to_string());
            unpack::unpack_gzip(archive, dest, original_name.as_deref(), &base)?;
        }
        ArchiveFormat::Unknown => {
            return Err(ExtractionError::UnknownFormat {
                archive: archive.to_path_buf(),
                description: detect::describe_prefix(&head),
            });
        }
    }
    Ok(format)
}

/// Leading bytes, enough for the tar header magic
fn read_head(archive: &Path) -> std::result::Result<Vec<u8>, ExtractionError> {
    let corrupt = |e: std::io::Error| ExtractionError::Corrupt {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    };
    let file = std::fs::File::open(archive).map_err(corrupt)?;
    let mut head = Vec::with_capacity(4096);
    file.take(4096).read_to_end(&mut head).map_err(corrupt)?;
    Ok(head)
}

/// Whether a path has one of the [`KEPT_EXTENSIONS`]
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| KEPT_EXTENSIONS.contains(&ext.as_str()))
}

/// Delete every non-source file under `dir`, returning `(kept, removed)`
fn remove_non_sources(dir: &Path) -> (usize, usize) {
    let mut kept = 0;
    let mut removed = 0;

    let files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    for path in files {
        if is_source_file(&path) {
            kept += 1;
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove non-source file"),
        }
    }

    (kept, removed)
}
