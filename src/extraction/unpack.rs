use crate::error::ExtractionError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

fn corrupt(archive: &Path, reason: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Corrupt {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Unpack a tarball (optionally gzip-compressed) into `dest`
///
/// Entries escaping `dest` are skipped by the tar crate.
pub(super) fn unpack_tar(archive: &Path, dest: &Path, gzipped: bool) -> Result<(), ExtractionError> {
    let file = File::open(archive).map_err(|e| corrupt(archive, e))?;
    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut tarball = tar::Archive::new(reader);
    tarball.set_preserve_permissions(false);
    tarball.unpack(dest).map_err(|e| corrupt(archive, e))?;

    debug!(archive = %archive.display(), dest = %dest.display(), "unpacked tarball");
    Ok(())
}

/// Decompress a single gzip file into `dest/<name>`
pub(super) fn unpack_gzip(
    archive: &Path,
    dest: &Path,
    original_name: Option<&str>,
    fallback_base: &str,
) -> Result<PathBuf, ExtractionError> {
    let out_path = dest.join(output_name(original_name, fallback_base));

    let file = File::open(archive).map_err(|e| corrupt(archive, e))?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    let mut out = File::create(&out_path).map_err(|e| corrupt(archive, e))?;
    std::io::copy(&mut decoder, &mut out).map_err(|e| corrupt(archive, e))?;

    debug!(archive = %archive.display(), output = %out_path.display(), "decompressed gzip file");
    Ok(out_path)
}

/// Bare file name from the gzip header, or `<base>.file`
fn output_name(original_name: Option<&str>, fallback_base: &str) -> String {
    original_name
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("{}.file", fallback_base))
}
