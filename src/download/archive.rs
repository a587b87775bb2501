//! Archive unwrapping
//!
//! Turns a downloaded file into the canonical `.mmdb` artifact. The container
//! kind comes from the source URL or file name, never from the file contents.

use crate::error::{GeoIpError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tar::Archive;
use tempfile::NamedTempFile;

/// Extension of the member extracted from tar archives
pub const DATABASE_EXTENSION: &str = ".mmdb";

/// Container wrapping a downloaded database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// gzip-compressed tar archive
    TarGz,
    /// single gzip stream
    Gz,
    /// already the canonical artifact
    Raw,
}

// Order matters: ".tar.gz" also ends in ".gz".
const KNOWN_SUFFIXES: &[(&str, ContainerKind)] = &[
    (".tar.gz", ContainerKind::TarGz),
    (".tgz", ContainerKind::TarGz),
    (".gz", ContainerKind::Gz),
];

impl ContainerKind {
    /// Classify a file name by its suffix, `None` if it matches no known container
    pub fn from_suffix(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        KNOWN_SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, kind)| *kind)
    }

    /// Infer the container kind from a download URL or plain file name.
    ///
    /// For URLs the path is checked first, then a `suffix=` query parameter
    /// as used by MaxMind permalinks. Anything unmatched is [`ContainerKind::Raw`].
    pub fn from_source(source: &str) -> Self {
        let Ok(url) = reqwest::Url::parse(source) else {
            return Self::from_suffix(source).unwrap_or(ContainerKind::Raw);
        };

        if let Some(kind) = Self::from_suffix(url.path()) {
            return kind;
        }

        url.query_pairs()
            .find(|(key, _)| key == "suffix")
            .and_then(|(_, value)| Self::from_suffix(&format!(".{}", value)))
            .unwrap_or(ContainerKind::Raw)
    }
}

/// Unwrap `input` according to `kind`, writing the canonical bytes to `output`.
///
/// Returns the number of bytes written.
pub fn unwrap_into<R: Read, W: Write>(input: R, kind: ContainerKind, output: &mut W) -> Result<u64> {
    match kind {
        ContainerKind::TarGz => extract_tar_gz_member(input, output),
        ContainerKind::Gz => {
            let mut decoder = GzDecoder::new(input);
            io::copy(&mut decoder, output)
                .map_err(|e| GeoIpError::corrupt(format!("Failed to decompress gzip stream: {}", e)))
        }
        ContainerKind::Raw => {
            let mut input = input;
            Ok(io::copy(&mut input, output)?)
        }
    }
}

fn extract_tar_gz_member<R: Read, W: Write>(input: R, output: &mut W) -> Result<u64> {
    let mut archive = Archive::new(GzDecoder::new(input));
    let entries = archive
        .entries()
        .map_err(|e| GeoIpError::corrupt(format!("Failed to read tar archive entries: {}", e)))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| GeoIpError::corrupt(format!("Failed to read tar entry: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| GeoIpError::corrupt(format!("Failed to get entry path: {}", e)))?
            .to_string_lossy()
            .into_owned();

        if path.ends_with(DATABASE_EXTENSION) {
            let written = io::copy(&mut entry, output)
                .map_err(|e| GeoIpError::corrupt(format!("Failed to read {} from archive: {}", path, e)))?;
            log::info!("Extracted {} from tar.gz ({} bytes)", path, written);
            return Ok(written);
        }
    }

    Err(GeoIpError::NoMatchingMember(DATABASE_EXTENSION.to_string()))
}

/// Unwrapped artifact waiting in a temporary file beside its destination.
///
/// Dropping it deletes the file; [`StagedArtifact::commit`] renames it over
/// the canonical path.
pub struct StagedArtifact {
    file: NamedTempFile,
    written: u64,
}

impl StagedArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Bytes written to the staged file
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Atomically replace `dest` with the staged file
    pub fn commit(self, dest: &Path) -> Result<u64> {
        self.file.persist(dest)?;
        Ok(self.written)
    }
}

/// Unwrap the downloaded file at `src` into a staged file inside `dir`.
///
/// Nothing outside `dir`'s temporary files is touched until the caller
/// commits the result.
pub fn stage_file(src: &Path, source: &str, dir: &Path) -> Result<StagedArtifact> {
    let kind = ContainerKind::from_source(source);
    log::debug!("Unwrapping {:?} as {:?} into {:?}", src, kind, dir);

    let mut staged = NamedTempFile::new_in(dir)?;
    let input = BufReader::new(File::open(src)?);
    let written = {
        let mut writer = BufWriter::new(staged.as_file_mut());
        let written = unwrap_into(input, kind, &mut writer)?;
        writer.flush()?;
        written
    };
    staged.as_file().sync_all()?;

    Ok(StagedArtifact { file: staged, written })
}

/// Unwrap the downloaded file at `src` straight into `dest`.
///
/// The output is staged next to `dest` and renamed over it only once fully
/// written, so readers never see a partial artifact. On failure `dest` is
/// left untouched.
pub fn unwrap_file(src: &Path, source: &str, dest: &Path) -> Result<u64> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    stage_file(src, source, dir)?.commit(dest)
}
