// src/local_fs.rs
//
// Local filesystem helpers: directory listings and upload-directory expansion.

use glob::Pattern;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{BlobError, BlobResult};

/// One level of a local directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalListing {
    pub path: String,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directories: Option<Vec<String>>,
}

impl LocalListing {
    pub fn total_items(&self) -> usize {
        self.files.len() + self.directories.as_ref().map_or(0, Vec::len)
    }
}

/// A local file selected for upload, with the blob name it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub blob_name: String,
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(path.trim_start_matches('~').trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

fn compile_pattern(pattern: Option<&str>) -> BlobResult<Option<Pattern>> {
    match pattern {
        None => Ok(None),
        Some(p) if p.is_empty() => Ok(None),
        Some(p) => Pattern::new(p)
            .map(Some)
            .map_err(|e| BlobError::invalid(format!("bad pattern '{}': {}", p, e))),
    }
}

fn name_matches(pattern: &Option<Pattern>, path: &Path) -> bool {
    match pattern {
        None => true,
        Some(p) => path
            .file_name()
            .map(|n| p.matches(&n.to_string_lossy()))
            .unwrap_or(false),
    }
}

async fn require_dir(dir: &Path) -> BlobResult<()> {
    let meta = fs::metadata(dir).await.map_err(|e| {
        BlobError::invalid(format!("cannot read directory {}: {}", dir.display(), e))
    })?;
    if !meta.is_dir() {
        return Err(BlobError::invalid(format!("{} is not a directory", dir.display())));
    }
    Ok(())
}

/// List files (and optionally subdirectories) directly inside `dir`.
/// `pattern` is a glob applied to file names only.
pub async fn list_local_files(
    dir: &str,
    pattern: Option<&str>,
    include_directories: bool,
) -> BlobResult<LocalListing> {
    if dir.is_empty() {
        return Err(BlobError::invalid("no directory path provided"));
    }
    let root = expand_home(dir);
    require_dir(&root).await?;
    let pattern = compile_pattern(pattern)?;

    let mut files = Vec::new();
    let mut directories = Vec::new();
    let mut entries = fs::read_dir(&root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            directories.push(path.display().to_string());
        } else if name_matches(&pattern, &path) {
            files.push(path.display().to_string());
        }
    }
    files.sort();
    directories.sort();

    Ok(LocalListing {
        path: root.display().to_string(),
        files,
        directories: include_directories.then_some(directories),
    })
}

/// Files under `dir` matching `pattern`, descending into subdirectories when
/// `recursive`. Blob names are `blob_prefix` + the path relative to `dir`.
pub async fn collect_upload_files(
    dir: &str,
    pattern: Option<&str>,
    recursive: bool,
    blob_prefix: Option<&str>,
) -> BlobResult<Vec<LocalFile>> {
    if dir.is_empty() {
        return Err(BlobError::invalid("no directory path provided"));
    }
    let root = expand_home(dir);
    require_dir(&root).await?;
    let pattern = compile_pattern(pattern)?;
    let prefix = blob_prefix.unwrap_or("");

    let mut out = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(current) = stack.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                if recursive {
                    stack.push(path);
                }
                continue;
            }
            if !name_matches(&pattern, &path) {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&root) else { continue };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(LocalFile {
                blob_name: format!("{}{}", prefix, rel),
                path,
            });
        }
    }
    out.sort_by(|a, b| a.blob_name.cmp(&b.blob_name));
    Ok(out)
}
