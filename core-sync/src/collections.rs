//! Read-side grouping of local videos.

use std::collections::HashMap;

use core_library::{Group, VideoRecord};

pub const ALL_VIDEOS_TITLE: &str = "All videos";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionId {
    AllVideos,
    Group(i64),
    /// Local videos whose tag equals the scanned code.
    QrSearch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    General,
    Group,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub title: String,
    pub subtitle: Option<String>,
    pub kind: CollectionKind,
    /// Newest first.
    pub videos: Vec<VideoRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collections {
    all: Collection,
    groups: HashMap<i64, Collection>,
}

impl Default for Collections {
    fn default() -> Self {
        Self::build(Vec::new(), &[])
    }
}

impl Collections {
    /// Build every collection from the local record set.
    ///
    /// Group members that are not stored locally are left out.
    pub fn build(mut videos: Vec<VideoRecord>, groups: &[Group]) -> Self {
        sort_newest_first(&mut videos);

        let groups = groups
            .iter()
            .map(|group| {
                let members: Vec<VideoRecord> = videos
                    .iter()
                    .filter(|v| group.contains(v.id()))
                    .cloned()
                    .collect();
                let collection = Collection {
                    title: group.name.clone(),
                    subtitle: Some(group.description.clone()).filter(|d| !d.is_empty()),
                    kind: CollectionKind::Group,
                    videos: members,
                };
                (group.id, collection)
            })
            .collect();

        Self {
            all: Collection {
                title: ALL_VIDEOS_TITLE.to_string(),
                subtitle: None,
                kind: CollectionKind::General,
                videos,
            },
            groups,
        }
    }

    pub fn all_videos(&self) -> &Collection {
        &self.all
    }

    pub fn group(&self, id: i64) -> Option<&Collection> {
        self.groups.get(&id)
    }

    pub fn qr_search(&self, code: &str) -> Collection {
        Collection {
            title: format!("QR: {code}"),
            subtitle: None,
            kind: CollectionKind::General,
            videos: self
                .all
                .videos
                .iter()
                .filter(|v| v.manifest.tag == code)
                .cloned()
                .collect(),
        }
    }

    pub fn get(&self, id: &CollectionId) -> Option<Collection> {
        match id {
            CollectionId::AllVideos => Some(self.all.clone()),
            CollectionId::Group(group_id) => self.group(*group_id).cloned(),
            CollectionId::QrSearch(code) => Some(self.qr_search(code)),
        }
    }
}

fn sort_newest_first(videos: &mut [VideoRecord]) {
    videos.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use core_library::{VideoId, VideoManifest};

    fn video(title: &str, minutes: i64, tag: &str) -> VideoRecord {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes);
        let mut manifest = VideoManifest::new(VideoId::new(), title, "https://cdn/v.mp4", date);
        manifest.tag = tag.to_string();
        VideoRecord::from_server(manifest, "u1")
    }

    fn titles(collection: &Collection) -> Vec<&str> {
        collection.videos.iter().map(|v| v.manifest.title.as_str()).collect()
    }

    #[test]
    fn test_all_videos_newest_first() {
        let collections = Collections::build(
            vec![video("a", 0, ""), video("c", 20, ""), video("b", 10, "")],
            &[],
        );
        assert_eq!(titles(collections.all_videos()), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_group_collection_keeps_local_members_only() {
        let a = video("a", 0, "");
        let b = video("b", 5, "");
        let group = Group {
            id: 3,
            name: "Workshop".into(),
            description: String::new(),
            videos: vec![a.id(), VideoId::new(), b.id()],
        };

        let collections = Collections::build(vec![a, b, video("other", 9, "")], &[group]);
        let workshop = collections.get(&CollectionId::Group(3)).unwrap();

        assert_eq!(workshop.kind, CollectionKind::Group);
        assert_eq!(workshop.subtitle, None);
        assert_eq!(titles(&workshop), vec!["b", "a"]);
        assert!(collections.get(&CollectionId::Group(4)).is_none());
    }

    #[test]
    fn test_qr_search_is_exact() {
        let collections = Collections::build(
            vec![video("hit", 0, "machine-7"), video("miss", 1, "machine-70")],
            &[],
        );
        let found = collections
            .get(&CollectionId::QrSearch("machine-7".into()))
            .unwrap();
        assert_eq!(found.title, "QR: machine-7");
        assert_eq!(titles(&found), vec!["hit"]);
    }
}
