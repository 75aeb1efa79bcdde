use super::error::{DistError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Prefix of staging directories created next to cache entries
const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The staged tree now lives at the final path
    Committed,
    /// Another process committed a complete entry first; ours was discarded
    AlreadyPresent,
}

/// A cache entry being assembled in a staging directory.
///
/// Nothing is visible at the final path until [`StagedEntry::commit`] renames
/// the staging directory into place, or [`StagedEntry::merge`] moves the
/// staged files into an existing directory. Dropping the value without
/// committing deletes everything staged so far.
pub struct StagedEntry {
    label: String,
    final_dir: PathBuf,
    staging: TempDir,
}

impl StagedEntry {
    /// Stage next to `final_dir`, for a later [`StagedEntry::commit`]
    pub fn begin(label: impl Into<String>, final_dir: &Path) -> Result<Self> {
        let parent = final_dir.parent().unwrap_or_else(|| Path::new("."));
        Self::begin_in(label.into(), final_dir, parent)
    }

    /// Stage inside `final_dir`, for a later [`StagedEntry::merge`]. Used
    /// for directories we do not own, which must never be replaced.
    pub fn begin_within(label: impl Into<String>, final_dir: &Path) -> Result<Self> {
        Self::begin_in(label.into(), final_dir, final_dir)
    }

    fn begin_in(label: String, final_dir: &Path, staging_parent: &Path) -> Result<Self> {
        fs::create_dir_all(staging_parent).map_err(|e| DistError::io(staging_parent, e))?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(staging_parent)
            .map_err(|e| DistError::io(staging_parent, e))?;
        log::debug!("[txn:{}] begin in {:?}", label, staging.path());
        Ok(Self {
            label,
            final_dir: final_dir.to_path_buf(),
            staging,
        })
    }

    /// Directory to write the entry's contents into
    pub fn path(&self) -> &Path {
        self.staging.path()
    }

    pub fn final_dir(&self) -> &Path {
        &self.final_dir
    }

    pub fn checkpoint(&self, label: &str) {
        log::debug!("[txn:{}] checkpoint {}", self.label, label);
    }

    /// Move the staged tree to the final path.
    ///
    /// `is_complete` decides whether an existing directory at the final path
    /// is a finished entry (kept, ours dropped) or a leftover from an
    /// interrupted download (removed, then replaced).
    pub fn commit(self, is_complete: impl Fn(&Path) -> bool) -> Result<CommitOutcome> {
        if self.final_dir.exists() {
            if is_complete(&self.final_dir) {
                log::info!(
                    "[txn:{}] complete entry already at {:?}, discarding staged copy",
                    self.label,
                    self.final_dir
                );
                return Ok(CommitOutcome::AlreadyPresent);
            }
            log::warn!(
                "[txn:{}] removing incomplete entry at {:?}",
                self.label,
                self.final_dir
            );
            remove_any(&self.final_dir)?;
        }

        match fs::rename(self.staging.path(), &self.final_dir) {
            Ok(()) => {
                log::info!("[txn:{}] commit {:?}", self.label, self.final_dir);
                Ok(CommitOutcome::Committed)
            }
            Err(_) if is_complete(&self.final_dir) => {
                log::info!(
                    "[txn:{}] lost commit race to a complete entry at {:?}",
                    self.label,
                    self.final_dir
                );
                Ok(CommitOutcome::AlreadyPresent)
            }
            Err(e) => Err(DistError::io(&self.final_dir, e)),
        }
    }

    /// Move every staged file to the same relative path under the final
    /// directory, overwriting files of the same name. Nothing else in the
    /// final directory is touched. Returns the number of files moved.
    pub fn merge(self) -> Result<usize> {
        let moved = move_tree(self.staging.path(), &self.final_dir)?;
        log::info!(
            "[txn:{}] merged {} files into {:?}",
            self.label,
            moved,
            self.final_dir
        );
        if let Err(e) = self.staging.close() {
            log::warn!("[txn:{}] could not remove staging dir: {}", self.label, e);
        }
        Ok(moved)
    }

    pub fn rollback(self, reason: &str) {
        log::warn!("[txn:{}] rollback: {}", self.label, reason);
        if let Err(e) = self.staging.close() {
            log::warn!("[txn:{}] could not remove staging dir: {}", self.label, e);
        }
    }
}

fn move_tree(from: &Path, to: &Path) -> Result<usize> {
    fs::create_dir_all(to).map_err(|e| DistError::io(to, e))?;
    let mut moved = 0;
    for entry in fs::read_dir(from).map_err(|e| DistError::io(from, e))? {
        let entry = entry.map_err(|e| DistError::io(from, e))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        let is_dir = entry
            .file_type()
            .map_err(|e| DistError::io(&source, e))?
            .is_dir();
        if is_dir {
            moved += move_tree(&source, &target)?;
        } else {
            fs::rename(&source, &target).map_err(|e| DistError::io(&target, e))?;
            moved += 1;
        }
    }
    Ok(moved)
}

fn remove_any(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| DistError::io(path, e))
}
