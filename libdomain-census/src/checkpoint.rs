//! Durable per-mode enumeration cursors.
//!
//! Each mode has one JSON file in the state directory. Writes go to a temp
//! file in the same directory and are renamed into place, so a crash leaves
//! either the previous cursor or the new one. Unreadable files are treated as
//! absent and reported with a warning.
//!
//! Only one agent may use a state directory at a time; [`CheckpointStore::lock`]
//! enforces that with an exclusively created `agent.lock` file.

use crate::{generator::Cursor, types::Mode};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

const LOCK_FILE: &str = "agent.lock";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Cursor for {found} mode cannot be saved as {expected}")]
    ModeMismatch { expected: Mode, found: Mode },
    #[error("State directory is in use by another agent (lock file {0}); remove it if that agent is gone")]
    Locked(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, mode: Mode) -> PathBuf {
        self.dir.join(format!("{}_pointer.json", mode))
    }

    pub fn load(&self, mode: Mode) -> Option<Cursor> {
        let path = self.path_for(mode);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint unreadable; {} mode restarts from the beginning", mode);
                return None;
            }
        };

        match serde_json::from_slice::<Cursor>(&bytes) {
            Ok(cursor) if cursor.mode() == mode => Some(cursor),
            Ok(cursor) => {
                warn!(path = %path.display(), found = %cursor.mode(), "Checkpoint holds a cursor for another mode; ignoring it");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint corrupt; {} mode restarts from the beginning", mode);
                None
            }
        }
    }

    pub fn save(&self, mode: Mode, cursor: &Cursor) -> Result<(), CheckpointError> {
        if cursor.mode() != mode {
            return Err(CheckpointError::ModeMismatch {
                expected: mode,
                found: cursor.mode(),
            });
        }

        let path = self.path_for(mode);
        let bytes = serde_json::to_vec_pretty(cursor)?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_error(&self.dir))?;
        tmp.write_all(&bytes).map_err(io_error(&path))?;
        tmp.as_file().sync_all().map_err(io_error(&path))?;
        tmp.persist(&path)
            .map_err(|e| io_error(&path)(e.error))?;

        debug!(path = %path.display(), ?cursor, "Checkpoint committed");
        Ok(())
    }

    pub fn reset(&self, mode: Mode) -> Result<(), CheckpointError> {
        let path = self.path_for(mode);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Checkpoint for {} mode removed", mode);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    /// Claims the state directory for this process until the guard drops.
    pub fn lock(&self) -> Result<AgentLock, CheckpointError> {
        let path = self.dir.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(CheckpointError::Locked(path));
            }
            Err(e) => return Err(io_error(&path)(e)),
        };
        writeln!(file, "{}", std::process::id()).map_err(io_error(&path))?;
        Ok(AgentLock { path })
    }

    /// Removes a lock left behind by a crashed agent. Returns whether one existed.
    pub fn break_lock(&self) -> Result<bool, CheckpointError> {
        let path = self.dir.join(LOCK_FILE);
        match fs::remove_file(&path) {
            Ok(()) => {
                warn!(path = %path.display(), "Removed stale agent lock");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}

#[derive(Debug)]
pub struct AgentLock {
    path: PathBuf,
}

impl Drop for AgentLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release agent lock");
        }
    }
}
