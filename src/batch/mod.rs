// src/batch/mod.rs
// Batched Generator subsystem (§4.7): data model, atomic persistence, and the
// resumable batching logic wrapping the Task Orchestrator.

pub mod generator;
pub mod state;
pub mod types;

pub use generator::{BatchedGenerator, GapEntry, GapReport};
pub use state::{state_path, AdvisoryLock};
pub use types::{
    validate_batch_size, BatchConfig, BatchProgress, BatchResult, BatchRunStats, BatchingBenefit, InvalidBatchSize,
    NextBatch, MAX_BATCH_SIZE, MIN_BATCH_SIZE,
};
