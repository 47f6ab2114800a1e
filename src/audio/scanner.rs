use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::playlist::TrackSource;
use super::AudioFormat;

/// Lists playable files in the music directory. Track names are paths
/// relative to that directory, `/`-separated.
#[derive(Debug, Clone)]
pub struct MusicScanner {
    root: PathBuf,
    recursive: bool,
}

impl MusicScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scan(&self) -> Vec<String> {
        if !self.root.is_dir() {
            warn!("Music directory does not exist: {}", self.root.display());
            return Vec::new();
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut names = Vec::new();

        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();

            // Skip hidden files (dotfiles)
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with('.'))
            {
                continue;
            }

            // Skip empty files or files > 1GB
            if let Ok(metadata) = fs::metadata(path) {
                if metadata.len() == 0 || metadata.len() > 1_000_000_000 {
                    continue;
                }
            }

            if !Self::is_supported_file(path) {
                continue;
            }

            if let Some(name) = self.track_name(path) {
                names.push(name);
            }
        }

        debug!("Found {} playable files in {}", names.len(), self.root.display());
        names
    }

    fn is_supported_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(AudioFormat::from_extension)
            .map_or(false, |format| format.is_supported())
    }

    fn track_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

impl TrackSource for MusicScanner {
    fn list_tracks(&self) -> Vec<String> {
        self.scan()
    }
}
