//! Folder analysis summary over one scan.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AggregateIssue;
use crate::record::ChildRecord;

/// Summary of one directory listing with its records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderAnalysis {
    /// Directory that was scanned.
    pub current_path: PathBuf,

    /// Sum of all item sizes (saturating).
    pub total_size: u64,

    /// Number of immediate children listed.
    pub item_count: usize,

    /// Directories anywhere below `current_path`.
    pub folder_count: u64,

    /// Files anywhere below `current_path`.
    pub file_count: u64,

    /// Listing records, in directory order unless re-ordered.
    pub items: Vec<ChildRecord>,

    /// Wall time of the scan, serialized as nanoseconds.
    #[serde(with = "duration_nanos")]
    pub analysis_time: Duration,

    /// When the analysis finished.
    pub timestamp: DateTime<Utc>,

    /// True when every item is complete and no issue was recorded.
    pub complete: bool,

    /// Issues collected from every directory aggregate and the listing.
    pub issues: Vec<AggregateIssue>,
}

impl FolderAnalysis {
    /// Build an analysis from finished records.
    pub fn new(
        current_path: impl Into<PathBuf>,
        items: Vec<ChildRecord>,
        issues: Vec<AggregateIssue>,
        analysis_time: Duration,
    ) -> Self {
        let mut total_size: u64 = 0;
        let mut file_count: u64 = 0;
        let mut folder_count: u64 = 0;

        for item in &items {
            total_size = total_size.saturating_add(item.size);
            if item.is_dir() {
                folder_count += 1 + item.folder_count;
                file_count += item.file_count;
            } else {
                file_count += 1;
            }
        }

        let complete = issues.is_empty() && items.iter().all(|item| item.complete);

        Self {
            current_path: current_path.into(),
            total_size,
            item_count: items.len(),
            folder_count,
            file_count,
            items,
            analysis_time,
            timestamp: Utc::now(),
            complete,
            issues,
        }
    }

    /// Re-order items heaviest first. Ties keep listing order.
    pub fn order_by_heaviest(&mut self) {
        self.items.sort_by(|a, b| b.size.cmp(&a.size));
    }

    /// Check if there were any issues during the scan.
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}
