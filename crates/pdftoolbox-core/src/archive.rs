//! Unpacking of extraction archives.
//!
//! Every `.zip` under the archive directory is extracted into its own
//! subdirectory of the output directory, named after the archive stem.
//! A bad archive is recorded in the [`UnpackReport`] and the pass moves on.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::ZipArchive;

use crate::document::{collect_files, has_extension, shared_stems};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt archive {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("Archive name is not valid UTF-8: {0}")]
    InvalidName(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to do when the target directory for an archive already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingPolicy {
    /// Remove the old directory and extract afresh
    #[default]
    Overwrite,
    /// Leave the old directory as it is
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackStatus {
    Extracted { entries: usize },
    Skipped,
}

#[derive(Debug, Clone)]
pub struct UnpackedArchive {
    pub archive: PathBuf,
    pub stem: String,
    pub directory: PathBuf,
    pub status: UnpackStatus,
}

#[derive(Debug, Default)]
pub struct UnpackReport {
    pub unpacked: Vec<UnpackedArchive>,
    pub failed: Vec<(PathBuf, ArchiveError)>,
}

impl UnpackReport {
    pub fn extracted_count(&self) -> usize {
        self.unpacked
            .iter()
            .filter(|u| matches!(u.status, UnpackStatus::Extracted { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.unpacked.len() - self.extracted_count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

/// List the archives under `archive_dir`, recursively, in lexicographic order.
///
/// A missing directory has no archives.
pub fn discover_archives(archive_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !archive_dir.exists() {
        return Ok(Vec::new());
    }
    let archives = collect_files(archive_dir, "zip")?;

    for (first, second, stem) in shared_stems(archives.iter().map(PathBuf::as_path)) {
        tracing::warn!(
            "{} and {} share the stem '{}'; the later one replaces the earlier in the output",
            first.display(),
            second.display(),
            stem
        );
    }
    Ok(archives)
}

/// Extract every archive in `archive_dir` into `output_dir/<stem>/`.
///
/// Fails as a whole only when `output_dir` cannot be created or
/// `archive_dir` cannot be listed.
pub fn unpack(
    archive_dir: &Path,
    output_dir: &Path,
    policy: ExistingPolicy,
) -> Result<UnpackReport, ArchiveError> {
    std::fs::create_dir_all(output_dir)?;

    let archives = discover_archives(archive_dir)?;
    tracing::info!(
        "Unpacking {} archives from {} into {}",
        archives.len(),
        archive_dir.display(),
        output_dir.display()
    );

    let mut report = UnpackReport::default();
    for archive in archives {
        match unpack_one(&archive, output_dir, policy) {
            Ok(unpacked) => {
                if let UnpackStatus::Extracted { entries } = unpacked.status {
                    tracing::debug!("{}: {} entries", unpacked.stem, entries);
                } else {
                    tracing::debug!("{}: already unpacked, skipped", unpacked.stem);
                }
                report.unpacked.push(unpacked);
            }
            Err(e) => {
                tracing::warn!("Failed to unpack {}: {}", archive.display(), e);
                report.failed.push((archive, e));
            }
        }
    }

    Ok(report)
}

/// Extract a single archive into `output_dir/<stem>/`.
pub fn unpack_one(
    archive: &Path,
    output_dir: &Path,
    policy: ExistingPolicy,
) -> Result<UnpackedArchive, ArchiveError> {
    if !has_extension(archive, "zip") {
        return Err(ArchiveError::InvalidName(archive.to_path_buf()));
    }
    let stem = archive
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ArchiveError::InvalidName(archive.to_path_buf()))?
        .to_string();
    let directory = output_dir.join(&stem);

    if policy == ExistingPolicy::Skip && directory.exists() {
        return Ok(UnpackedArchive {
            archive: archive.to_path_buf(),
            stem,
            directory,
            status: UnpackStatus::Skipped,
        });
    }

    let file = File::open(archive).map_err(|source| ArchiveError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    let corrupt = |source| ArchiveError::Corrupt {
        path: archive.to_path_buf(),
        source,
    };

    let mut zip = ZipArchive::new(file).map_err(corrupt)?;
    let entries = zip.len();

    // The previous unpack is replaced only after every entry is out.
    let staging = output_dir.join(format!(".{stem}.unpacking"));
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }
    std::fs::create_dir_all(&staging)?;
    if let Err(e) = zip.extract(&staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(corrupt(e));
    }
    if let Err(e) = replace_dir(&staging, &directory) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e.into());
    }

    Ok(UnpackedArchive {
        archive: archive.to_path_buf(),
        stem,
        directory,
        status: UnpackStatus::Extracted { entries },
    })
}

fn replace_dir(staging: &Path, directory: &Path) -> std::io::Result<()> {
    if directory.exists() {
        std::fs::remove_dir_all(directory)?;
    }
    std::fs::rename(staging, directory)
}
