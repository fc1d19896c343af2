// src/batch/state.rs
// Atomic persistence for BatchProgress at `<project>/.claude-testing/batch-state.json`
// (spec §4.7, §6, §9 "Atomicity of batch-state.json writes"). Write-to-temp +
// rename mirrors the teacher's `hooks/session.rs::write_team_membership`;
// restricted permissions on Unix follow the same file.

use crate::batch::types::BatchProgress;
use crate::error::{OrchestratorError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const STATE_DIR: &str = ".claude-testing";
pub const STATE_FILE: &str = "batch-state.json";

pub fn state_path(project: &Path) -> PathBuf {
    project.join(STATE_DIR).join(STATE_FILE)
}

/// An advisory lock file held for the duration of a single invocation's
/// read-modify-write cycle, to satisfy the "single-writer per project path"
/// policy (§5 "Shared-resource policy"). Concurrent invocations racing for
/// the same project are expected to be rare; this is advisory, not
/// mandatory-locking, matching the spec's "should acquire an advisory file
/// lock" language.
pub struct AdvisoryLock {
    path: PathBuf,
}

impl AdvisoryLock {
    pub fn acquire(project: &Path) -> Result<Self> {
        let path = project.join(STATE_DIR).join("batch-state.lock");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!(path = %path.display(), "batch-state.json lock already held; proceeding anyway (advisory only)");
                Ok(Self { path })
            }
            Err(err) => Err(OrchestratorError::Io(err)),
        }
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Load `BatchProgress` from disk. Absence is `Ok(None)`; a corrupt or
/// schema-mismatched file is treated as absent and logged, never repaired
/// (spec §4.7 "Corrupt or schema-mismatched files are treated as absent").
pub fn load(project: &Path) -> Result<Option<BatchProgress>> {
    let path = state_path(project);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(OrchestratorError::Io(err)),
    };

    match serde_json::from_str::<BatchProgress>(&raw) {
        Ok(progress) => Ok(Some(progress)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "batch-state.json is corrupt or schema-mismatched; treating as absent");
            Ok(None)
        }
    }
}

/// Write `BatchProgress` atomically: serialize, write to a sibling temp
/// file, then rename over the final path so readers never observe a partial
/// write.
pub fn save(project: &Path, progress: &BatchProgress) -> Result<()> {
    let path = state_path(project);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(progress)?;
    let temp_path = path.with_extension("json.tmp");

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    {
        use std::io::Write;
        let mut file = opts.open(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&temp_path, &path)?;
    debug!(path = %path.display(), "wrote batch-state.json");
    Ok(())
}

/// Delete the persisted state file, if present.
pub fn cleanup(project: &Path) -> Result<()> {
    let path = state_path(project);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(OrchestratorError::Io(err)),
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
