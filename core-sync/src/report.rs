//! Outcome log of a refresh cycle.
//!
//! Every summary the server listed ends up here with what happened to it,
//! so failures are visible to the caller instead of only advancing a counter.

use std::collections::BTreeMap;

use core_library::VideoId;
use serde::Serialize;

/// What reconciliation decided for one remote summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncAction {
    Download,
    Upload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Local copy was current; no request was made.
    UpToDate,
    /// Dispatched but not finished yet.
    InFlight { action: SyncAction },
    Downloaded { revision: i64 },
    Uploaded { revision: i64 },
    Failed { action: SyncAction, message: String },
    /// The local copy could not be read, so nothing was dispatched.
    Skipped { message: String },
}

impl ItemOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

/// Outcome of one top-level step (listing, groups, finalize).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum StepOutcome {
    #[default]
    Pending,
    Succeeded,
    Failed(String),
}

impl StepOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, StepOutcome::Succeeded)
    }

    pub(crate) fn from_result<E: std::fmt::Display>(result: &Result<(), E>) -> Self {
        match result {
            Ok(()) => StepOutcome::Succeeded,
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub cycle_id: String,
    pub items: BTreeMap<VideoId, ItemOutcome>,
    /// Fetching the revision listing.
    pub videos: StepOutcome,
    pub groups: StepOutcome,
    /// Flushing the store and rebuilding local state.
    pub finalize: StepOutcome,
}

impl SyncReport {
    pub fn new(cycle_id: impl Into<String>) -> Self {
        Self {
            cycle_id: cycle_id.into(),
            ..Self::default()
        }
    }

    /// Items classified as download or upload.
    pub fn dispatched(&self) -> usize {
        self.items
            .values()
            .filter(|o| !matches!(o, ItemOutcome::UpToDate | ItemOutcome::Skipped { .. }))
            .count()
    }

    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Downloaded { .. }))
    }

    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Uploaded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(ItemOutcome::is_failed)
    }

    pub fn outcome(&self, id: VideoId) -> Option<&ItemOutcome> {
        self.items.get(&id)
    }

    /// Every step succeeded and no item failed.
    pub fn is_clean(&self) -> bool {
        self.videos.is_succeeded()
            && self.groups.is_succeeded()
            && self.finalize.is_succeeded()
            && self.failed() == 0
            && !self
                .items
                .values()
                .any(|o| matches!(o, ItemOutcome::InFlight { .. }))
    }

    fn count(&self, predicate: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.values().filter(|o| predicate(o)).count()
    }
}
