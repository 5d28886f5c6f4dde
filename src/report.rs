//! Result Aggregation
//!
//! Counts and plain-text summaries of batch results

use std::fmt;

use serde::Serialize;

use crate::batch::{BatchStatus, BatchSyncResult};

/// Repository that failed in a batch run
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedRepository {
    pub repository: String,
    pub error: String,
}

/// Batch summary
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,

    /// Failed repositories in result order
    pub failed_detail: Vec<FailedRepository>,
}

impl BatchSummary {
    /// Number of repositories processed
    pub fn total(&self) -> usize {
        self.successful + self.failed + self.skipped
    }
}

/// Partition batch results by status
pub fn summarize(results: &[BatchSyncResult]) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for result in results {
        match result.status {
            BatchStatus::Success => summary.successful += 1,
            BatchStatus::Skipped => summary.skipped += 1,
            BatchStatus::Failed => {
                summary.failed += 1;
                summary.failed_detail.push(FailedRepository {
                    repository: result.repository.clone(),
                    error: result
                        .error
                        .clone()
                        .unwrap_or_else(|| "Unknown error".to_string()),
                });
            }
        }
    }

    summary
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch Sync Summary:")?;
        writeln!(f, "  Successful: {}", self.successful)?;
        if self.failed > 0 {
            writeln!(f, "  Failed: {}", self.failed)?;
        }
        if self.skipped > 0 {
            writeln!(f, "  Skipped: {}", self.skipped)?;
        }

        if !self.failed_detail.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed repositories:")?;
            for failed in &self.failed_detail {
                writeln!(f, "  - {}: {}", failed.repository, failed.error)?;
            }
        }

        Ok(())
    }
}

/// Label operation totals across successful repositories
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct LabelTotals {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub errors: usize,
}

impl LabelTotals {
    /// Sum label counts over every result carrying a sync result
    pub fn from_results(results: &[BatchSyncResult]) -> Self {
        results
            .iter()
            .filter_map(|r| r.result.as_ref())
            .fold(Self::default(), |mut totals, sync| {
                totals.created += sync.created.len();
                totals.updated += sync.updated.len();
                totals.deleted += sync.deleted.len();
                totals.unchanged += sync.unchanged.len();
                totals.errors += sync.errors.len();
                totals
            })
    }
}
