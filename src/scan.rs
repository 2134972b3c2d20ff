//! Media directory scanning and manifest generation.
//!
//! Walks a directory, keeps files with a supported media extension, reads
//! their dimensions in parallel and produces a [`FeedManifest`]:
//!
//! ```text
//! media/                    items (path order)
//! ├── 2024/                 ─────────────────────────────────────────────
//! │   ├── a.jpg       →     { id: 3f9c…, source: "2024/a.jpg", aspect_ratio: 1.5 }
//! │   └── b.png       →     { id: 81d2…, source: "2024/b.png", aspect_ratio: 0.75 }
//! ├── notes.txt             (skipped: not media)
//! └── broken.webp     →     { id: c07e…, source: "broken.webp", aspect_ratio: 1.0 }  + reported
//! ```
//!
//! ## Identity
//!
//! Item ids are the first 16 hex digits of a SHA-256 over the relative path
//! and the file contents. They survive rescans as long as neither changes,
//! which keeps layout placements sticky across runs.
//!
//! ## Sources
//!
//! `source` is the path relative to the scan root with `/` separators,
//! optionally under a key prefix. Relative keys are what the object store
//! knows the files by, so they classify as needing a signed URL.

use crate::probe::{self, MediaProbe};
use crate::types::{FeedItem, FeedManifest};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Name of the manifest written by `scan`.
pub const MANIFEST_FILENAME: &str = "feed.json";

/// Length of an item id in hex digits.
const ID_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// A file that was included with a default ratio because probing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unreadable {
    pub source: String,
    pub reason: String,
}

/// Result of a scan: the manifest plus anything worth warning about.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub manifest: FeedManifest,
    pub unreadable: Vec<Unreadable>,
}

/// Scan `root` for media.
///
/// `prefix`, when given, is joined in front of every relative source
/// (`"uploads"` + `"a.png"` → `"uploads/a.png"`).
pub fn scan(
    root: &Path,
    prefix: Option<&str>,
    probe: &impl MediaProbe,
) -> Result<ScanReport, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let files = collect_media(root)?;

    let probed: Vec<(FeedItem, Option<Unreadable>)> = files
        .par_iter()
        .map(|path| scan_file(root, path, prefix, probe))
        .collect::<Result<_, _>>()?;

    let mut report = ScanReport {
        manifest: FeedManifest {
            root: Some(root.display().to_string()),
            items: Vec::with_capacity(probed.len()),
        },
        unreadable: Vec::new(),
    };
    for (item, problem) in probed {
        report.manifest.items.push(item);
        report.unreadable.extend(problem);
    }
    Ok(report)
}

/// Media files under `root`, sorted by path.
fn collect_media(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && !is_hidden(entry.path(), root) && probe::is_supported(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_hidden(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        })
        .unwrap_or(false)
}

fn scan_file(
    root: &Path,
    path: &Path,
    prefix: Option<&str>,
    probe: &impl MediaProbe,
) -> Result<(FeedItem, Option<Unreadable>), ScanError> {
    let relative = relative_key(root, path);
    let bytes = std::fs::read(path)?;
    let mut item = FeedItem::new(item_id(&relative, &bytes), source_for(prefix, &relative));

    let problem = match probe.dimensions(path) {
        Ok(dims) => match dims.aspect_ratio() {
            Some(ratio) => {
                item.aspect_ratio = ratio;
                item.width = Some(dims.width);
                item.height = Some(dims.height);
                None
            }
            None => Some("zero-sized media".to_string()),
        },
        Err(e) => Some(e.to_string()),
    };

    let problem = problem.map(|reason| Unreadable {
        source: item.source.clone(),
        reason,
    });
    Ok((item, problem))
}

/// Path relative to `root` with `/` separators.
fn relative_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn source_for(prefix: Option<&str>, relative: &str) -> String {
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(p) => format!("{p}/{relative}"),
        None => relative.to_string(),
    }
}

/// Stable id from the relative path and contents.
pub fn item_id(relative: &str, contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative.as_bytes());
    hasher.update(b"\0");
    hasher.update(contents);
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(ID_LEN);
    hex
}

/// Write a manifest as pretty JSON.
pub fn write_manifest(path: &Path, manifest: &FeedManifest) -> Result<(), ScanError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<FeedManifest, ScanError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
