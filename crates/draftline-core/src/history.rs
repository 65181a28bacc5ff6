//! In-memory history store.
//!
//! Keeps the most recent runs in a bounded ring. Durable storage lives
//! behind the same [`HistoryStore`] trait in the binary crate.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::error::AppError;
use crate::run::PipelineRun;
use crate::traits::HistoryStore;

#[derive(Debug)]
pub struct MemoryHistory {
    capacity: usize,
    runs: Mutex<VecDeque<PipelineRun>>,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl MemoryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            runs: Mutex::new(VecDeque::new()),
        }
    }

    fn lock_runs(&self) -> MutexGuard<'_, VecDeque<PipelineRun>> {
        self.runs.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("history store recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.lock_runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for MemoryHistory {
    async fn record(&self, run: &PipelineRun) -> Result<(), AppError> {
        let mut runs = self.lock_runs();
        while runs.len() >= self.capacity {
            runs.pop_front();
        }
        runs.push_back(run.clone());
        Ok(())
    }

    /// Newest first.
    async fn list(&self, limit: usize) -> Result<Vec<PipelineRun>, AppError> {
        let runs = self.lock_runs();
        Ok(runs.iter().rev().take(limit).cloned().collect())
    }
}
