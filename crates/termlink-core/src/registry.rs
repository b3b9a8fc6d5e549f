//! Filesystem session registry: one JSON descriptor file per project.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::descriptor::SessionDescriptor;
use crate::{Error, Result};

/// Shared registry directory, read by the session manager and written by
/// registration hooks and bridge servers.
///
/// File disappearance is authoritative: a session whose descriptor file is
/// gone is treated as ended.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    dir: PathBuf,
}

impl SessionRegistry {
    /// Open a registry rooted at `dir`. The directory is created lazily on
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Registry directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Descriptor file path for a project.
    pub fn path_for(&self, project: &str) -> PathBuf {
        self.dir.join(format!("{project}.json"))
    }

    /// Read all descriptors, ordered by registration time.
    ///
    /// Unparseable files are skipped with a warning rather than failing the
    /// whole refresh.
    pub fn load(&self) -> Result<Vec<SessionDescriptor>> {
        let mut descriptors = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(descriptors),
            Err(e) => return Err(Error::Registry(format!("read {}: {e}", self.dir.display()))),
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping unreadable descriptor {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<SessionDescriptor>(&content) {
                Ok(desc) => descriptors.push(desc),
                Err(e) => {
                    warn!("Skipping malformed descriptor {}: {}", path.display(), e);
                }
            }
        }

        // Registration order backs the manager's resolve tie-breaking
        descriptors.sort_by(|a, b| {
            (a.registered_at.as_deref(), a.project.as_str())
                .cmp(&(b.registered_at.as_deref(), b.project.as_str()))
        });

        debug!("Loaded {} session descriptor(s) from {}", descriptors.len(), self.dir.display());
        Ok(descriptors)
    }

    /// Write (or overwrite) a descriptor.
    pub fn register(&self, descriptor: &SessionDescriptor) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Registry(format!("create {}: {e}", self.dir.display())))?;
        let path = self.path_for(&descriptor.project);
        let json = serde_json::to_string_pretty(descriptor)?;
        std::fs::write(&path, json)
            .map_err(|e| Error::Registry(format!("write {}: {e}", path.display())))?;
        debug!("Registered session '{}' at {}", descriptor.project, path.display());
        Ok(())
    }

    /// Remove a descriptor. Returns true if a file was actually deleted.
    pub fn remove(&self, project: &str) -> Result<bool> {
        let path = self.path_for(project);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed session descriptor '{}'", project);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Registry(format!("remove {}: {e}", path.display()))),
        }
    }
}
