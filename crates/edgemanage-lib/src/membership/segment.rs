//! Segment (dnet) edge-list files

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::atomic::AtomicFile;
use crate::error::{EdgeManageError, Result};

/// Directory holding one edge-list file per segment
#[derive(Debug, Clone)]
pub struct SegmentDirectory {
    root: PathBuf,
}

impl SegmentDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `segment`. Names that could escape the directory or be
    /// skipped by [`list`](Self::list) are rejected.
    pub fn path(&self, segment: &str) -> Result<PathBuf> {
        EdgeManageError::check_name("segment", segment)?;
        Ok(self.root.join(segment))
    }

    /// Segment names present on disk, hidden entries excluded
    pub fn list(&self) -> Result<BTreeSet<String>> {
        let entries =
            std::fs::read_dir(&self.root).map_err(|e| EdgeManageError::persistence(&self.root, e))?;

        let mut segments = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| EdgeManageError::persistence(&self.root, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                segments.insert(name);
            }
        }
        Ok(segments)
    }

    /// Edges listed in a segment file, comments and blank lines skipped
    pub fn read(&self, segment: &str) -> Result<Vec<String>> {
        let path = self.path(segment)?;
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                EdgeManageError::segment_not_found(segment)
            } else {
                EdgeManageError::persistence(&path, e)
            }
        })?;
        Ok(parse_edge_list(&contents))
    }

    /// Atomically replace a segment file with a freshly rendered edge list
    pub fn write(&self, segment: &str, edges: &[String], reference_id: &str) -> Result<()> {
        let contents = render_edge_list(edges, reference_id, Utc::now());
        let mut file = AtomicFile::create(self.path(segment)?)?;
        file.write_all(contents.as_bytes())?;
        file.commit()
    }

    pub fn remove(&self, segment: &str) -> Result<()> {
        let path = self.path(segment)?;
        std::fs::remove_file(&path).map_err(|e| EdgeManageError::persistence(&path, e))
    }
}

/// File body: header comments, then one edge per line
pub fn render_edge_list(edges: &[String], reference_id: &str, generated: DateTime<Utc>) -> String {
    let mut contents = format!(
        "# Generated by edgemanage on {}\n# Ref ID: {}\n",
        generated.format("%Y-%m-%d %H:%M:%S%.6f"),
        reference_id
    );
    for edge in edges {
        contents.push_str(edge);
        contents.push('\n');
    }
    contents
}

pub fn parse_edge_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
