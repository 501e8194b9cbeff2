use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A PDF found during discovery.
///
/// `stem` is the file name without its extension, kept exactly as it
/// appears on disk. Archives, unpack directories and stored rows are all
/// keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub stem: String,
}

impl SourceDocument {
    /// Build a document from a path, returning `None` when it has no usable stem.
    #[must_use]
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?.to_string();
        Some(Self { path, stem })
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        self.path.file_name().map_or_else(
            || self.stem.clone(),
            |n| n.to_string_lossy().to_string(),
        )
    }
}

/// Resolve `source` into the ordered list of documents to extract.
///
/// A file yields itself. A directory is scanned recursively for files with
/// a `pdf` extension (any case) and the result is sorted by resolved path.
pub fn discover(source: &Path) -> std::io::Result<Vec<SourceDocument>> {
    let resolved = source.canonicalize()?;

    let paths = if resolved.is_dir() {
        collect_files(&resolved, "pdf")?
    } else {
        vec![resolved]
    };

    let documents: Vec<SourceDocument> = paths
        .into_iter()
        .filter_map(|p| {
            let doc = SourceDocument::from_path(p.clone());
            if doc.is_none() {
                tracing::warn!("Skipping {}: file name is not valid UTF-8", p.display());
            }
            doc
        })
        .collect();

    for (first, second, stem) in shared_stems(documents.iter().map(|d| d.path.as_path())) {
        tracing::warn!(
            "{} and {} share the stem '{}'; their archives will overwrite each other",
            first.display(),
            second.display(),
            stem
        );
    }
    Ok(documents)
}

/// Recursively collect regular files under `dir` whose extension matches
/// `ext` (ASCII case-insensitive), sorted by path.
pub fn collect_files(dir: &Path, ext: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() && has_extension(entry.path(), ext) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Pairs of paths whose file stems collide, with the shared stem. Each
/// later path is paired with the first one seen for its stem.
pub fn shared_stems<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
) -> Vec<(&'a Path, &'a Path, &'a str)> {
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    let mut shared = Vec::new();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(first) = seen.get(stem).copied() {
            shared.push((first, path, stem));
        } else {
            seen.insert(stem, path);
        }
    }
    shared
}
