// src/batch/state_tests.rs

use super::*;
use crate::batch::types::BatchConfig;

fn sample_progress(project: &Path) -> BatchProgress {
    BatchProgress::new(
        "run-1".to_string(),
        project.display().to_string(),
        25,
        10,
        BatchConfig::default(),
        1_000,
    )
}

#[test]
fn load_returns_none_when_absent() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load(dir.path()).unwrap().is_none());
}

#[test]
fn round_trip_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let progress = sample_progress(dir.path());
    save(dir.path(), &progress).unwrap();

    let loaded = load(dir.path()).unwrap().expect("state should exist");
    assert_eq!(loaded.run_id, progress.run_id);
    assert_eq!(loaded.total_tasks, progress.total_tasks);
    assert_eq!(loaded.next_batch_index, progress.next_batch_index);
}

#[test]
fn corrupt_file_is_treated_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let path = state_path(dir.path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"not json at all {{{").unwrap();

    assert!(load(dir.path()).unwrap().is_none());
}

#[test]
fn save_overwrites_prior_state_and_never_leaves_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut progress = sample_progress(dir.path());
    save(dir.path(), &progress).unwrap();

    progress.next_batch_index = 1;
    progress.completed_batches = 1;
    save(dir.path(), &progress).unwrap();

    let loaded = load(dir.path()).unwrap().unwrap();
    assert_eq!(loaded.next_batch_index, 1);

    let temp_path = state_path(dir.path()).with_extension("json.tmp");
    assert!(!temp_path.exists());
}

#[test]
fn cleanup_removes_state_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let progress = sample_progress(dir.path());
    save(dir.path(), &progress).unwrap();

    cleanup(dir.path()).unwrap();
    assert!(load(dir.path()).unwrap().is_none());
    // Calling again on an absent file must not error.
    cleanup(dir.path()).unwrap();
}

#[test]
fn advisory_lock_is_released_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    {
        let _lock = AdvisoryLock::acquire(dir.path()).unwrap();
        assert!(dir.path().join(STATE_DIR).join("batch-state.lock").exists());
    }
    assert!(!dir.path().join(STATE_DIR).join("batch-state.lock").exists());
}
