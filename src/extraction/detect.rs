use flate2::read::GzDecoder;
use std::io::Read;

/// Offset of the `ustar` magic inside a tar header block
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const PDF_MAGIC: &[u8] = b"%PDF";

/// Format of a downloaded source archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// The e-print is a PDF (no LaTeX source available)
    Pdf,
    /// Gzip-compressed tarball
    TarGz,
    /// A single gzip-compressed file
    Gzip {
        /// File name recorded in the gzip header, if any
        original_name: Option<String>,
    },
    /// Uncompressed tarball
    Tar,
    /// Anything else
    Unknown,
}

impl ArchiveFormat {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            ArchiveFormat::Pdf => "pdf",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Gzip { .. } => "gz",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Unknown => "unknown",
        }
    }
}

fn has_tar_magic(block: &[u8]) -> bool {
    block.len() >= TAR_MAGIC_OFFSET + TAR_MAGIC.len()
        && &block[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == TAR_MAGIC
}

/// Sniff the archive format from its leading bytes
///
/// Gzip streams are peeked into: a tar header in the first decompressed
/// block means a tarball, otherwise it is a single compressed file.
pub fn detect_format(data: &[u8]) -> ArchiveFormat {
    if data.starts_with(PDF_MAGIC) {
        return ArchiveFormat::Pdf;
    }

    if data.starts_with(GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(data);
        let mut head = Vec::with_capacity(512);
        let peeked = (&mut decoder).take(512).read_to_end(&mut head);
        if peeked.is_ok() && has_tar_magic(&head) {
            return ArchiveFormat::TarGz;
        }
        let original_name = decoder
            .header()
            .and_then(|h| h.filename())
            .map(|name| String::from_utf8_lossy(name).into_owned());
        return ArchiveFormat::Gzip { original_name };
    }

    if has_tar_magic(data) {
        return ArchiveFormat::Tar;
    }

    ArchiveFormat::Unknown
}

/// Hex rendering of the first bytes, for error messages
pub(crate) fn describe_prefix(data: &[u8]) -> String {
    let shown: Vec<String> = data.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    if shown.is_empty() {
        "empty file".to_string()
    } else {
        format!("leading bytes {}", shown.join(" "))
    }
}
