// src/orchestrator/recursion_guard.rs
// Recursion Guard (§4.8): refuses to target the tool's own install directory,
// honors DISABLE_HEADLESS_AGENTS, and enforces a process-wide spawn cap.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefusalReason {
    SelfTarget,
    AgentsDisabled,
    ProcessLimit,
}

impl RefusalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefusalReason::SelfTarget => "self-target",
            RefusalReason::AgentsDisabled => "agents-disabled",
            RefusalReason::ProcessLimit => "process-limit",
        }
    }
}

/// Pre-flight check run at orchestrator startup and before each spawn.
pub struct RecursionGuard {
    tool_install_path: PathBuf,
    max_processes: u64,
    spawned: AtomicU64,
}

fn is_ancestor_or_equal(ancestor: &Path, candidate: &Path) -> bool {
    candidate.starts_with(ancestor) || ancestor.starts_with(candidate)
}

impl RecursionGuard {
    pub fn new(tool_install_path: PathBuf, max_processes: u64) -> Self {
        Self {
            tool_install_path,
            max_processes,
            spawned: AtomicU64::new(0),
        }
    }

    fn disabled_by_env() -> bool {
        std::env::var("DISABLE_HEADLESS_AGENTS")
            .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(false)
    }

    /// Checked once at orchestrator startup, independent of any particular spawn.
    pub fn check_startup(&self, target: &Path) -> Result<(), RefusalReason> {
        if is_ancestor_or_equal(&self.tool_install_path, target) {
            warn!(target = %target.display(), "recursion guard: target overlaps tool install path");
            return Err(RefusalReason::SelfTarget);
        }
        if Self::disabled_by_env() {
            warn!("recursion guard: DISABLE_HEADLESS_AGENTS is set");
            return Err(RefusalReason::AgentsDisabled);
        }
        Ok(())
    }

    /// Checked before every spawn; also enforces the live process cap.
    pub fn check_spawn(&self, target: &Path) -> Result<(), RefusalReason> {
        self.check_startup(target)?;
        if self.spawned.load(Ordering::SeqCst) >= self.max_processes {
            return Err(RefusalReason::ProcessLimit);
        }
        Ok(())
    }

    /// Call when a spawn is actually launched, after `check_spawn` passes.
    pub fn note_spawned(&self) {
        self.spawned.fetch_add(1, Ordering::SeqCst);
    }

    /// Call when a spawned process exits, freeing a slot in the cap.
    pub fn note_exited(&self) {
        self.spawned.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1))).ok();
    }
}
