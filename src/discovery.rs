//! Logo file discovery
//!
//! A lazy walk over a directory tree. Entries are visited depth-first in file-name order and
//! hidden entries (names starting with `.`) are pruned along with their subtrees. Call
//! [`LogoDiscovery::walk`] again to restart from the root.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

pub const LOGO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "svg", "webp", "gif"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Path relative to the discovery root
    pub relative: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Clone)]
pub struct LogoDiscovery {
    root: PathBuf,
}

impl LogoDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn walk(&self) -> LogoWalk {
        let entries = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        LogoWalk {
            root: self.root.clone(),
            entries: Box::new(entries.filter_entry(|entry| !is_hidden(entry))),
        }
    }
}

/// The root itself is never pruned, even when its own name starts with `.`.
fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_logo(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| LOGO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn walk_error(err: walkdir::Error) -> io::Error {
    let path = err.path().map(Path::to_path_buf);
    let source = io::Error::from(err);
    match path {
        Some(path) => io::Error::new(source.kind(), format!("{}: {}", path.display(), source)),
        None => source,
    }
}

pub struct LogoWalk {
    root: PathBuf,
    entries: Box<dyn Iterator<Item = walkdir::Result<DirEntry>>>,
}

impl LogoWalk {
    fn discovered(&self, entry: DirEntry) -> io::Result<DiscoveredFile> {
        let metadata = entry.metadata().map_err(walk_error)?;
        let path = entry.into_path();
        let relative = path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        Ok(DiscoveredFile {
            path,
            relative,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

impl Iterator for LogoWalk {
    type Item = io::Result<DiscoveredFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(walk_error(err))),
            };
            if entry.file_type().is_dir() {
                continue;
            }
            if entry.file_type().is_file() && is_logo(entry.path()) {
                return Some(self.discovered(entry));
            }
            debug!("Skipping {}", entry.path().display());
        }
    }
}
