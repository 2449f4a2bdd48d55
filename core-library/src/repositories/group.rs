//! SQLite group cache

use crate::error::Result;
use crate::models::GroupList;
use crate::repositories::GroupCache;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

/// Single-slot table holding the last group listing as JSON.
pub struct SqliteGroupCache {
    pool: SqlitePool,
}

impl SqliteGroupCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupCache for SqliteGroupCache {
    async fn save_groups(&self, list: &GroupList) -> Result<()> {
        let payload = serde_json::to_string(list)?;

        sqlx::query(
            r#"
            INSERT INTO group_cache (slot, downloaded_by, payload, updated_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(slot) DO UPDATE SET
                downloaded_by = excluded.downloaded_by,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&list.downloaded_by)
        .bind(payload)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(groups = list.groups.len(), downloaded_by = %list.downloaded_by, "Groups cached");
        Ok(())
    }

    /// An unreadable payload counts as an empty cache.
    async fn load_groups(&self) -> Result<Option<GroupList>> {
        let payload: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM group_cache WHERE slot = 1")
                .fetch_optional(&self.pool)
                .await?;

        let Some((payload,)) = payload else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(list) => Ok(Some(list)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable group cache");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{Group, User, VideoId};

    fn list(downloaded_by: &str, names: &[&str]) -> GroupList {
        GroupList {
            groups: names
                .iter()
                .enumerate()
                .map(|(i, name)| Group {
                    id: i as i64,
                    name: name.to_string(),
                    description: String::new(),
                    videos: vec![VideoId::new()],
                })
                .collect(),
            user: User {
                id: "42".into(),
                name: "Ada".into(),
            },
            downloaded_by: downloaded_by.into(),
        }
    }

    #[tokio::test]
    async fn test_save_replaces_previous_listing() {
        let cache = SqliteGroupCache::new(create_test_pool().await.unwrap());
        assert!(cache.load_groups().await.unwrap().is_none());

        cache.save_groups(&list("sub-1", &["a", "b"])).await.unwrap();
        let second = list("sub-2", &["c"]);
        cache.save_groups(&second).await.unwrap();

        assert_eq!(cache.load_groups().await.unwrap(), Some(second));
    }
}
