//! Row-count verification between source and target.
//!
//! Verification is advisory: a mismatch is reported with the absolute
//! difference and never repaired or escalated to a failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{SourceReader, TargetWriter};
use crate::error::Result;
use crate::events::{EventSink, MigrationEvent};

/// Counts from both sides of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub source_count: u64,
    pub target_count: u64,
}

impl VerifyOutcome {
    /// True iff both counts are identical.
    pub fn matched(&self) -> bool {
        self.source_count == self.target_count
    }

    /// Absolute row-count difference.
    pub fn difference(&self) -> u64 {
        self.source_count.abs_diff(self.target_count)
    }
}

/// Compares row counts of a source table and its target copy.
pub struct VerificationChecker {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    events: Arc<dyn EventSink>,
}

impl VerificationChecker {
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            source,
            target,
            events,
        }
    }

    /// Run an independent count on each side.
    ///
    /// Count query failures propagate; a mismatch does not.
    pub async fn compare(&self, source_table: &str, target_table: &str) -> Result<VerifyOutcome> {
        let source_count = self.source.count_rows(source_table).await?;
        let target_count = self.target.count_rows(target_table).await?;

        self.events.emit(MigrationEvent::Verified {
            table: source_table.to_string(),
            source_count,
            target_count,
        });

        Ok(VerifyOutcome {
            source_count,
            target_count,
        })
    }

    /// True iff the source and target row counts are equal.
    pub async fn verify(&self, source_table: &str, target_table: &str) -> Result<bool> {
        Ok(self.compare(source_table, target_table).await?.matched())
    }
}
