//! Domain models for the video library
//!
//! The manifest is the JSON contract shared with the server; local-only
//! bookkeeping (modification flag, downloading user) lives on
//! [`VideoRecord`] around it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// ID Types
// =============================================================================

/// Unique identifier for a video. Rendered lowercase and hyphenated, which is
/// also the form used in API paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub Uuid);

impl VideoId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for VideoId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl From<Uuid> for VideoId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// =============================================================================
// Video
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Author {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Server-side description of a video.
///
/// Fields the core does not interpret are kept in `extra` so a download
/// followed by an upload does not drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoManifest {
    #[serde(rename = "uuid")]
    pub id: VideoId,
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Author,
    pub video_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_uri: Option<String>,
    /// Creation time.
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl VideoManifest {
    pub fn new(id: VideoId, title: impl Into<String>, video_uri: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            id,
            revision: 0,
            title: title.into(),
            author: Author::default(),
            video_uri: video_uri.into(),
            thumb_uri: None,
            date,
            tag: String::new(),
            is_public: false,
            annotations: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A video as held in the local store.
///
/// The revision is authoritative only while `has_local_modifications` is
/// false; a modified record is newer than its revision suggests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub manifest: VideoManifest,
    pub has_local_modifications: bool,
    /// Id of the user whose session downloaded the record.
    pub downloaded_by: Option<String>,
}

impl VideoRecord {
    /// A record as received from the server: unmodified, owned by `user_id`.
    pub fn from_server(manifest: VideoManifest, user_id: impl Into<String>) -> Self {
        Self {
            manifest,
            has_local_modifications: false,
            downloaded_by: Some(user_id.into()),
        }
    }

    /// A freshly captured record that only exists on this device.
    pub fn local(manifest: VideoManifest) -> Self {
        Self {
            manifest,
            has_local_modifications: true,
            downloaded_by: None,
        }
    }

    pub fn id(&self) -> VideoId {
        self.manifest.id
    }

    pub fn revision(&self) -> i64 {
        self.manifest.revision
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.manifest.date
    }

    /// Media that has never been published lives at a non-http location.
    pub fn is_local_only(&self) -> bool {
        !is_remote_uri(&self.manifest.video_uri)
    }

    pub fn mark_modified(&mut self) {
        self.has_local_modifications = true;
    }
}

pub(crate) fn is_remote_uri(uri: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `(uuid, revision)` entry of the lightweight video listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRevisionSummary {
    #[serde(rename = "uuid")]
    pub id: VideoId,
    pub revision: i64,
}

/// Selection used by [`VideoStore::list_all`](crate::store::VideoStore::list_all).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VideoFilter {
    #[default]
    All,
    /// Records downloaded by `user_id`, plus every local-only record.
    OwnedByOrLocalOnly { user_id: Option<String> },
}

impl VideoFilter {
    pub fn owned_by_or_local(user_id: Option<String>) -> Self {
        VideoFilter::OwnedByOrLocalOnly { user_id }
    }

    pub fn matches(&self, record: &VideoRecord) -> bool {
        match self {
            VideoFilter::All => true,
            VideoFilter::OwnedByOrLocalOnly { user_id } => {
                record.is_local_only()
                    || (user_id.is_some() && record.downloaded_by.as_deref() == user_id.as_deref())
            }
        }
    }
}

// =============================================================================
// Groups
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Member video ids.
    #[serde(default)]
    pub videos: Vec<VideoId>,
}

impl Group {
    pub fn contains(&self, id: VideoId) -> bool {
        self.videos.contains(&id)
    }
}

/// The account that owns the fetched groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Cached result of a group fetch, tagged with the session user that
/// fetched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupList {
    pub groups: Vec<Group>,
    pub user: User,
    pub downloaded_by: String,
}

impl GroupList {
    /// Cached groups are only trusted for the user who fetched them.
    pub fn is_trusted_for(&self, user_id: Option<&str>) -> bool {
        user_id == Some(self.downloaded_by.as_str())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}
