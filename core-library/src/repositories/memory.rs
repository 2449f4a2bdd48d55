//! In-memory stores for hosts without a database and for tests.

use crate::error::Result;
use crate::models::{GroupList, VideoFilter, VideoId, VideoRecord};
use crate::repositories::{GroupCache, VideoStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryVideoStore {
    records: Mutex<HashMap<VideoId, VideoRecord>>,
    saves: AtomicUsize,
    flushes: AtomicUsize,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = VideoRecord>) -> Self {
        let store = Self::new();
        lock(&store.records).extend(records.into_iter().map(|r| (r.id(), r)));
        store
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn find_by_id(&self, id: VideoId) -> Result<Option<VideoRecord>> {
        Ok(lock(&self.records).get(&id).cloned())
    }

    async fn save(&self, record: &VideoRecord) -> Result<()> {
        lock(&self.records).insert(record.id(), record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: VideoId) -> Result<bool> {
        Ok(lock(&self.records).remove(&id).is_some())
    }

    async fn list_all(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>> {
        let mut records: Vec<VideoRecord> = lock(&self.records)
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(records)
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryGroupCache {
    list: Mutex<Option<GroupList>>,
}

impl MemoryGroupCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupCache for MemoryGroupCache {
    async fn save_groups(&self, list: &GroupList) -> Result<()> {
        *lock(&self.list) = Some(list.clone());
        Ok(())
    }

    async fn load_groups(&self) -> Result<Option<GroupList>> {
        Ok(lock(&self.list).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VideoManifest;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_list_sorted_newest_first() {
        let now = Utc::now();
        let old = VideoRecord::local(VideoManifest::new(VideoId::new(), "old", "/v1", now - Duration::days(1)));
        let new = VideoRecord::local(VideoManifest::new(VideoId::new(), "new", "/v2", now));
        let store = MemoryVideoStore::with_records([old.clone(), new.clone()]);

        let listed = store.list_all(&VideoFilter::All).await.unwrap();
        assert_eq!(listed, vec![new, old.clone()]);

        assert!(store.delete(old.id()).await.unwrap());
        assert_eq!(store.len(), 1);
        store.flush().await.unwrap();
        assert_eq!(store.flush_count(), 1);
    }
}
