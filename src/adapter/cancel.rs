//! Cooperative cancellation for ingestion batches
//!
//! A batch checks its token between records, never mid-record, so an abort
//! leaves every committed entity and link valid.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared abort flag for one ingestion batch.
///
/// Clones observe the same flag, so a scheduler can keep one half and hand
/// the other to the batch.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
