//! Shared fixtures: a signed-in AchRails client over a scripted HTTP client,
//! in-memory stores and a recording listener.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_traits::testing::ScriptedHttpClient;
use bridge_traits::time::SystemClock;
use chrono::{Duration, TimeZone, Utc};
use core_auth::{AuthSession, AuthUser, PersistedSession, TokenSet};
use core_library::{
    LibraryError, MemoryGroupCache, MemoryVideoStore, VideoFilter, VideoId, VideoManifest,
    VideoRecord, VideoStore,
};
use core_runtime::config::{OAuthConfig, ServerEndpoints, SyncConfig};
use core_runtime::events::EventBus;
use core_sync::{RepositoryListener, SyncEngine};
use provider_achrails::AchRailsClient;
use serde_json::{json, Value};

pub const BASE: &str = "https://achrails.herokuapp.com/";
pub const USER: &str = "u1";

pub fn url(path: &str) -> String {
    format!("{BASE}{path}")
}

pub fn video_url(id: VideoId) -> String {
    url(&format!("videos/{id}.json"))
}

/// Server-side manifest JSON.
pub fn manifest_json(id: VideoId, revision: i64, title: &str) -> Value {
    json!({
        "uuid": id.to_string(),
        "revision": revision,
        "title": title,
        "videoUri": format!("https://cdn.example.com/{id}.mp4"),
        "thumbUri": format!("https://cdn.example.com/{id}.jpg"),
        "date": "2024-05-01T12:00:00Z"
    })
}

pub fn listing(entries: &[(VideoId, i64)]) -> Value {
    let videos: Vec<Value> = entries
        .iter()
        .map(|(id, revision)| json!({"uuid": id.to_string(), "revision": revision}))
        .collect();
    json!({ "videos": videos })
}

/// A record previously downloaded by [`USER`].
pub fn stored(id: VideoId, revision: i64, minutes: i64) -> VideoRecord {
    let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
    let mut manifest = VideoManifest::new(id, format!("video {minutes}"), format!("https://cdn.example.com/{id}.mp4"), date);
    manifest.revision = revision;
    VideoRecord::from_server(manifest, USER)
}

pub fn captured(minutes: i64) -> VideoRecord {
    let date = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
    VideoRecord::local(VideoManifest::new(
        VideoId::new(),
        "capture",
        "file:///captures/new.mp4",
        date,
    ))
}

pub struct Harness {
    pub http: Arc<ScriptedHttpClient>,
    pub client: Arc<AchRailsClient>,
    pub store: Arc<MemoryVideoStore>,
    pub groups: Arc<MemoryGroupCache>,
    pub bus: EventBus,
}

impl Harness {
    pub async fn new(records: Vec<VideoRecord>) -> Self {
        let http = Arc::new(ScriptedHttpClient::new());
        let endpoints = ServerEndpoints::public().unwrap();
        let session = AuthSession::new(
            http.clone(),
            &OAuthConfig::new("client", "videosync://callback"),
            &endpoints,
            Arc::new(SystemClock),
        );
        session
            .restore(PersistedSession::new(AuthUser {
                id: USER.into(),
                name: "Ada".into(),
                email: "ada@example.com".into(),
                tokens: TokenSet::new("a0", Utc::now() + Duration::hours(1), Some("r0".into())),
                authorize_url: endpoints.authorize_url.to_string(),
            }))
            .await;

        let client = Arc::new(AchRailsClient::new(
            Arc::new(session),
            endpoints.api_base.clone(),
            USER,
        ));

        Self {
            http,
            client,
            store: Arc::new(MemoryVideoStore::with_records(records)),
            groups: Arc::new(MemoryGroupCache::new()),
            bus: EventBus::new(64),
        }
    }

    /// Script an empty group listing so refresh cycles succeed.
    pub fn no_groups(&self) {
        self.http.on_json(
            bridge_traits::http::HttpMethod::Get,
            &url("groups/own.json"),
            200,
            json!({"groups": [], "user": {"id": USER, "name": "Ada"}}),
        );
    }

    pub fn engine(&self, config: SyncConfig) -> SyncEngine {
        SyncEngine::builder(self.store.clone(), self.groups.clone())
            .remote(self.client.clone())
            .config(config)
            .event_bus(self.bus.clone())
            .build()
    }

    pub fn offline_engine(&self) -> SyncEngine {
        SyncEngine::builder(self.store.clone(), self.groups.clone()).build()
    }
}

/// Records every callback as a short string.
#[derive(Default)]
pub struct RecordingListener {
    log: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

impl RepositoryListener for RecordingListener {
    fn update_started(&self, total: usize) {
        self.log.lock().unwrap().push(format!("started {total}"));
    }

    fn update_progress(&self, done: usize, total: usize) {
        self.log.lock().unwrap().push(format!("progress {done}/{total}"));
    }

    fn updated(&self) {
        self.log.lock().unwrap().push("updated".to_string());
    }
}

/// Memory store whose flush always fails.
#[derive(Default)]
pub struct UnflushableStore {
    pub inner: MemoryVideoStore,
}

#[async_trait]
impl VideoStore for UnflushableStore {
    async fn find_by_id(&self, id: VideoId) -> core_library::Result<Option<VideoRecord>> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, record: &VideoRecord) -> core_library::Result<()> {
        self.inner.save(record).await
    }

    async fn delete(&self, id: VideoId) -> core_library::Result<bool> {
        self.inner.delete(id).await
    }

    async fn list_all(&self, filter: &VideoFilter) -> core_library::Result<Vec<VideoRecord>> {
        self.inner.list_all(filter).await
    }

    async fn flush(&self) -> core_library::Result<()> {
        Err(LibraryError::Persistence("disk full".into()))
    }
}
