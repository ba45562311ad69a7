//! Desktop described by a JSON document on disk.
//!
//! The document has the shape `{"displays": [...], "windows": [...]}`.
//! Every query re-reads the file, and `set_frame` rewrites it, so an
//! external tool (or a test) can edit the file between calls to simulate
//! displays coming and going.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, trace};

use super::{DisplayInfo, DisplayProvider, WindowController, WindowEnumerator, WindowInfo};
use crate::error::{LayoutError, Result};
use crate::geometry::Rect;

/// On-disk desktop description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesktopDocument {
    #[serde(default)]
    pub displays: Vec<DisplayInfo>,
    #[serde(default)]
    pub windows: Vec<WindowInfo>,
}

/// File-backed desktop.
pub struct FileDesktop {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDesktop {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the document.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorUnavailable` if the file is missing or malformed.
    pub fn load(&self) -> Result<DesktopDocument> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            LayoutError::enumerator(format!("cannot read {}: {e}", self.path.display()))
        })?;
        trace!(bytes = content.len(), "Read desktop document");
        serde_json::from_str(&content).map_err(|e| {
            LayoutError::enumerator(format!("malformed {}: {e}", self.path.display()))
        })
    }

    /// Write a document. The new contents go to a temporary file in the same
    /// directory, which then replaces the document, so readers never see a
    /// partial file.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorUnavailable` if the file cannot be written.
    pub fn store(&self, doc: &DesktopDocument) -> Result<()> {
        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| LayoutError::controller(format!("cannot encode desktop: {e}")))?;
        let unwritable = |e: &dyn std::fmt::Display| {
            LayoutError::controller(format!("cannot write {}: {e}", self.path.display()))
        };

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut staged = NamedTempFile::new_in(dir).map_err(|e| unwritable(&e))?;
        staged
            .write_all(content.as_bytes())
            .map_err(|e| unwritable(&e))?;
        staged.persist(&self.path).map_err(|e| unwritable(&e.error))?;
        trace!(bytes = content.len(), "Wrote desktop document");
        Ok(())
    }

    fn find(doc: &DesktopDocument, pid: i32, window_number: u32) -> Option<usize> {
        doc.windows
            .iter()
            .position(|w| w.owner_pid == pid && w.window_number == Some(window_number))
    }
}

impl DisplayProvider for FileDesktop {
    fn displays(&self) -> Result<Vec<DisplayInfo>> {
        self.load()
            .map(|doc| doc.displays)
            .map_err(|e| LayoutError::displays(e.to_string()))
    }
}

impl WindowEnumerator for FileDesktop {
    fn enumerate(&self) -> Result<Vec<WindowInfo>> {
        self.load().map(|doc| doc.windows)
    }
}

impl WindowController for FileDesktop {
    fn frame(&self, pid: i32, window_number: u32) -> Result<Rect> {
        let doc = self
            .load()
            .map_err(|e| LayoutError::controller(e.to_string()))?;
        Self::find(&doc, pid, window_number)
            .map(|idx| doc.windows[idx].frame)
            .ok_or(LayoutError::WindowNotFound { pid, window_number })
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn set_frame(&self, pid: i32, window_number: u32, frame: Rect) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LayoutError::controller("desktop write lock poisoned"))?;

        let mut doc = self
            .load()
            .map_err(|e| LayoutError::controller(e.to_string()))?;
        let idx = Self::find(&doc, pid, window_number)
            .ok_or(LayoutError::WindowNotFound { pid, window_number })?;
        doc.windows[idx].frame = frame;
        self.store(&doc)?;
        debug!("Moved window");
        Ok(())
    }
}
