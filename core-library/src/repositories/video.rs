//! SQLite video store

use crate::error::{LibraryError, Result};
use crate::models::{VideoFilter, VideoId, VideoRecord};
use crate::repositories::VideoStore;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

/// Each row keeps the full manifest as JSON next to the columns used for
/// filtering and ordering.
pub struct SqliteVideoStore {
    pool: SqlitePool,
}

impl SqliteVideoStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct VideoRow {
    manifest: String,
    has_local_modifications: bool,
    downloaded_by: Option<String>,
}

impl VideoRow {
    fn into_record(self) -> Result<VideoRecord> {
        Ok(VideoRecord {
            manifest: serde_json::from_str(&self.manifest)?,
            has_local_modifications: self.has_local_modifications,
            downloaded_by: self.downloaded_by,
        })
    }
}

#[async_trait]
impl VideoStore for SqliteVideoStore {
    async fn find_by_id(&self, id: VideoId) -> Result<Option<VideoRecord>> {
        let row = sqlx::query_as::<_, VideoRow>(
            "SELECT manifest, has_local_modifications, downloaded_by FROM videos WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(VideoRow::into_record).transpose()
    }

    #[instrument(skip(self, record), fields(video_id = %record.id(), revision = record.revision()))]
    async fn save(&self, record: &VideoRecord) -> Result<()> {
        let manifest = serde_json::to_string(&record.manifest)?;

        let result = sqlx::query(
            r#"
            INSERT INTO videos (
                id, revision, has_local_modifications, downloaded_by,
                is_local_only, tag, created_at, manifest
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                revision = excluded.revision,
                has_local_modifications = excluded.has_local_modifications,
                downloaded_by = excluded.downloaded_by,
                is_local_only = excluded.is_local_only,
                tag = excluded.tag,
                created_at = excluded.created_at,
                manifest = excluded.manifest
            "#,
        )
        .bind(record.id().to_string())
        .bind(record.revision())
        .bind(record.has_local_modifications)
        .bind(record.downloaded_by.as_deref())
        .bind(record.is_local_only())
        .bind(&record.manifest.tag)
        .bind(record.created_at().timestamp_millis())
        .bind(manifest)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::Persistence(format!(
                "video {} was not written",
                record.id()
            )));
        }

        debug!("Video saved");
        Ok(())
    }

    async fn delete(&self, id: VideoId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>> {
        let rows = match filter {
            VideoFilter::All => {
                sqlx::query_as::<_, VideoRow>(
                    "SELECT manifest, has_local_modifications, downloaded_by FROM videos \
                     ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
            VideoFilter::OwnedByOrLocalOnly { user_id } => {
                // `downloaded_by = NULL` never matches, so no user means local-only.
                sqlx::query_as::<_, VideoRow>(
                    "SELECT manifest, has_local_modifications, downloaded_by FROM videos \
                     WHERE is_local_only = 1 OR downloaded_by = ? \
                     ORDER BY created_at DESC",
                )
                .bind(user_id.as_deref())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(VideoRow::into_record).collect()
    }

    async fn flush(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(PASSIVE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::VideoManifest;
    use chrono::{Duration, TimeZone, Utc};

    fn record(title: &str, minutes: i64, uri: &str, owner: Option<&str>) -> VideoRecord {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes);
        let mut manifest = VideoManifest::new(VideoId::new(), title, uri, date);
        manifest.tag = format!("tag-{title}");
        VideoRecord {
            manifest,
            has_local_modifications: false,
            downloaded_by: owner.map(str::to_string),
        }
    }

    async fn store() -> SqliteVideoStore {
        SqliteVideoStore::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_save_find_replace_delete() {
        let store = store().await;
        let mut video = record("a", 0, "https://cdn/a.mp4", Some("u1"));

        store.save(&video).await.unwrap();
        assert_eq!(store.find_by_id(video.id()).await.unwrap(), Some(video.clone()));

        video.manifest.revision = 9;
        video.mark_modified();
        store.save(&video).await.unwrap();
        let found = store.find_by_id(video.id()).await.unwrap().unwrap();
        assert_eq!(found.revision(), 9);
        assert!(found.has_local_modifications);

        assert!(store.delete(video.id()).await.unwrap());
        assert!(!store.delete(video.id()).await.unwrap());
        assert!(store.find_by_id(video.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_all_filters_and_orders() {
        let store = store().await;
        let older = record("older", 0, "https://cdn/1.mp4", Some("u1"));
        let newer = record("newer", 10, "https://cdn/2.mp4", Some("u1"));
        let foreign = record("foreign", 5, "https://cdn/3.mp4", Some("u2"));
        let local = record("local", 3, "file:///v.mp4", None);
        for video in [&older, &newer, &foreign, &local] {
            store.save(video).await.unwrap();
        }
        store.flush().await.unwrap();

        let titles = |records: Vec<VideoRecord>| {
            records
                .into_iter()
                .map(|r| r.manifest.title)
                .collect::<Vec<_>>()
        };

        let mine = store
            .list_all(&VideoFilter::owned_by_or_local(Some("u1".into())))
            .await
            .unwrap();
        assert_eq!(titles(mine), vec!["newer", "local", "older"]);

        let anonymous = store
            .list_all(&VideoFilter::owned_by_or_local(None))
            .await
            .unwrap();
        assert_eq!(titles(anonymous), vec!["local"]);

        let all = store.list_all(&VideoFilter::All).await.unwrap();
        assert_eq!(titles(all), vec!["newer", "foreign", "local", "older"]);
    }
}
