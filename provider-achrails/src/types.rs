//! AchRails wire types
//!
//! Envelopes are decoded strictly; their list entries are decoded one by one
//! so a single malformed entry does not discard the whole listing.

use core_library::{Group, User, VideoRecord};
use serde::{Deserialize, Serialize};

/// `{"videos": [...]}` from `videos.json` and `videos/search`.
#[derive(Debug, Deserialize)]
pub(crate) struct VideoListEnvelope {
    pub videos: Vec<serde_json::Value>,
}

/// `{"groups": [...], "user": {...}}` from `groups/own.json`.
#[derive(Debug, Deserialize)]
pub(crate) struct GroupsEnvelope {
    pub groups: Vec<serde_json::Value>,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub(crate) struct PublicityPayload {
    #[serde(rename = "isPublic")]
    pub is_public: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SharePayload {
    pub group: i64,
}

/// Groups visible to the signed-in account, and that account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteGroups {
    pub groups: Vec<Group>,
    pub user: User,
}

/// Result of a conditional fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// The server has nothing newer than the given revision.
    NotModified,
    Updated(VideoRecord),
}

impl FetchResult {
    pub fn into_record(self) -> Option<VideoRecord> {
        match self {
            FetchResult::NotModified => None,
            FetchResult::Updated(record) => Some(record),
        }
    }
}
