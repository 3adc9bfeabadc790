//! Import report models for bulk imports and snapshot merges.

use serde::{Deserialize, Serialize};

/// Maximum number of duplicate ids quoted in a bulk import report
pub const DUPLICATE_SAMPLE_SIZE: usize = 5;

/// Outcome of a catalog bulk import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkImportReport {
    pub imported: usize,
    pub skipped: usize,
    /// First few skipped ids, at most [`DUPLICATE_SAMPLE_SIZE`]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicate_samples: Vec<String>,
}

impl BulkImportReport {
    /// Human readable summary, e.g. for a confirmation message
    pub fn summary(&self) -> String {
        let mut msg = format!("Imported {} book(s)", self.imported);
        if self.skipped > 0 {
            msg.push_str(&format!(
                "; {} skipped because of duplicate ids: {}",
                self.skipped,
                self.duplicate_samples.join(", ")
            ));
            if self.skipped > self.duplicate_samples.len() {
                msg.push_str("...");
            }
        }
        msg
    }
}

/// Which collection an external snapshot holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Books,
    Users,
    Loans,
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotKind::Books => write!(f, "books"),
            SnapshotKind::Users => write!(f, "users"),
            SnapshotKind::Loans => write!(f, "loan records"),
        }
    }
}

/// Report returned by a snapshot merge.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MergeReport {
    pub kind: SnapshotKind,
    pub added: usize,
    /// Records already present (in the store or earlier in the payload)
    pub skipped: usize,
}
