//! # Upload Pipeline
//!
//! Publishes a video's media to external storage and registers the result
//! with the AchRails server.
//!
//! ## Phases
//!
//! 1. **Video**: each [`VideoUploader`] is tried in order until one returns
//!    a location. Progress band 0-70%.
//! 2. **Thumbnail**: skipped when the video provider already returned one;
//!    otherwise each [`ThumbnailUploader`] is tried in order. Band 70-80%.
//! 3. **Manifest PUT**: the record with the new media locations is uploaded.
//!    While the response is outstanding, synthetic ticks advance progress
//!    from 80% up to the configured cap. Completion reports 100%.
//!
//! Phases and providers run strictly one after another. Reported progress
//! never decreases, even when a failing provider had reported further than
//! its successor.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use core_async::time::timeout;
use core_library::VideoRecord;
use core_runtime::config::SyncConfig;
use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
use core_runtime::UserError;
use provider_achrails::RemoteVideoApi;
use tracing::{debug, info, instrument, warn};

const VIDEO_BAND: (f64, f64) = (0.0, 0.7);
const THUMBNAIL_BAND: (f64, f64) = (0.7, 0.8);
const PUT_START: f64 = 0.8;

// ============================================================================
// Provider contracts
// ============================================================================

/// Where a video provider put the media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub video: String,
    /// Providers that render a poster frame themselves return it here.
    pub thumbnail: Option<String>,
}

impl UploadedMedia {
    pub fn new(video: impl Into<String>, thumbnail: Option<String>) -> Self {
        Self {
            video: video.into(),
            thumbnail,
        }
    }
}

/// Phase-local progress in `0.0..=1.0`, handed to providers.
#[derive(Clone)]
pub struct ProgressReporter(Arc<dyn Fn(f64) + Send + Sync>);

impl ProgressReporter {
    pub fn new(report: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self(Arc::new(report))
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, fraction: f64) {
        (self.0)(fraction.clamp(0.0, 1.0))
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressReporter")
    }
}

/// A backend that can host the video file.
///
/// `Ok(None)` means the provider declined or produced nothing; both it and
/// `Err` move on to the next provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoUploader: Send + Sync {
    async fn upload_video(
        &self,
        video: &VideoRecord,
        progress: ProgressReporter,
    ) -> anyhow::Result<Option<UploadedMedia>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThumbnailUploader: Send + Sync {
    async fn upload_thumbnail(
        &self,
        video: &VideoRecord,
        progress: ProgressReporter,
    ) -> anyhow::Result<Option<String>>;
}

// ============================================================================
// Progress blending
// ============================================================================

/// Overall upload progress as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadProgress {
    pub value: f64,
    /// Synthetic steps the UI may animate towards.
    pub animated: bool,
}

pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

struct Blended {
    video_id: String,
    callback: ProgressCallback,
    event_bus: Option<EventBus>,
    last: Mutex<f64>,
}

impl Blended {
    fn report(&self, value: f64, animated: bool) {
        {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            if value <= *last && value < 1.0 {
                return;
            }
            *last = value;
        }

        (self.callback)(UploadProgress { value, animated });
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Upload(UploadEvent::Progress {
                video_id: self.video_id.clone(),
                progress: value,
            }))
            .ok();
        }
    }

    fn band(self: &Arc<Self>, (start, end): (f64, f64)) -> ProgressReporter {
        let blended = Arc::clone(self);
        ProgressReporter::new(move |fraction| blended.report(start + fraction * (end - start), false))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct UploadPipeline {
    video_uploaders: Vec<Arc<dyn VideoUploader>>,
    thumbnail_uploaders: Vec<Arc<dyn ThumbnailUploader>>,
    config: SyncConfig,
    event_bus: Option<EventBus>,
}

impl UploadPipeline {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            video_uploaders: Vec::new(),
            thumbnail_uploaders: Vec::new(),
            config,
            event_bus: None,
        }
    }

    /// Providers are tried in the order they were added.
    pub fn with_video_uploader(mut self, uploader: Arc<dyn VideoUploader>) -> Self {
        self.video_uploaders.push(uploader);
        self
    }

    pub fn with_thumbnail_uploader(mut self, uploader: Arc<dyn ThumbnailUploader>) -> Self {
        self.thumbnail_uploaders.push(uploader);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn video_uploader_count(&self) -> usize {
        self.video_uploaders.len()
    }

    /// Publish the media of `video` and PUT the updated manifest.
    ///
    /// Returns the server's record. Persisting it is left to the caller.
    #[instrument(skip_all, fields(video_id = %video.id()))]
    pub async fn upload(
        &self,
        remote: &dyn RemoteVideoApi,
        video: &VideoRecord,
        progress: ProgressCallback,
    ) -> Result<VideoRecord, UserError> {
        let video_id = video.id().to_string();
        self.emit(UploadEvent::Started {
            video_id: video_id.clone(),
        });
        info!("Starting upload");

        let blended = Arc::new(Blended {
            video_id: video_id.clone(),
            callback: progress,
            event_bus: self.event_bus.clone(),
            last: Mutex::new(0.0),
        });

        let media = self.upload_media(video, &blended).await;
        let thumbnail = match media.as_ref().and_then(|m| m.thumbnail.clone()) {
            Some(thumbnail) => Some(thumbnail),
            None => self.upload_thumbnail(video, &blended).await,
        };

        let (Some(media), Some(thumbnail)) = (media, thumbnail) else {
            let error = UserError::failed_to_upload_video(None).with_debug_error("Failed to upload media");
            return Err(self.fail(&video_id, error));
        };

        let mut record = video.clone();
        record.manifest.video_uri = media.video;
        record.manifest.thumb_uri = Some(thumbnail);

        let result = self.put_with_ticks(remote, &record, &blended).await;
        blended.report(1.0, true);

        match result {
            Ok(uploaded) => {
                info!(revision = uploaded.revision(), "Upload completed");
                self.emit(UploadEvent::Completed {
                    video_id,
                    revision: uploaded.revision(),
                });
                Ok(uploaded)
            }
            Err(e) => {
                let error = UserError::failed_to_upload_video(Some(Box::new(e)));
                Err(self.fail(&video_id, error))
            }
        }
    }

    async fn upload_media(&self, video: &VideoRecord, blended: &Arc<Blended>) -> Option<UploadedMedia> {
        for (index, uploader) in self.video_uploaders.iter().enumerate() {
            match uploader.upload_video(video, blended.band(VIDEO_BAND)).await {
                Ok(Some(media)) => {
                    debug!(provider = index, "Video uploaded");
                    return Some(media);
                }
                Ok(None) => debug!(provider = index, "Video provider returned no location"),
                Err(e) => warn!(provider = index, error = %e, "Video provider failed"),
            }
        }
        None
    }

    async fn upload_thumbnail(&self, video: &VideoRecord, blended: &Arc<Blended>) -> Option<String> {
        for (index, uploader) in self.thumbnail_uploaders.iter().enumerate() {
            match uploader
                .upload_thumbnail(video, blended.band(THUMBNAIL_BAND))
                .await
            {
                Ok(Some(location)) => {
                    debug!(provider = index, "Thumbnail uploaded");
                    return Some(location);
                }
                Ok(None) => debug!(provider = index, "Thumbnail provider returned no location"),
                Err(e) => warn!(provider = index, error = %e, "Thumbnail provider failed"),
            }
        }
        None
    }

    /// Await the PUT, stepping progress every tick interval until the cap.
    async fn put_with_ticks(
        &self,
        remote: &dyn RemoteVideoApi,
        record: &VideoRecord,
        blended: &Blended,
    ) -> provider_achrails::Result<VideoRecord> {
        let mut put = remote.put_video(record);
        let mut value = PUT_START;

        loop {
            match timeout(self.config.put_tick_interval, &mut put).await {
                Ok(result) => return result,
                Err(_) => {
                    let next = value + self.config.put_tick_step;
                    if next <= self.config.put_tick_cap + 1e-9 {
                        value = next.min(self.config.put_tick_cap);
                        blended.report(value, true);
                    }
                }
            }
        }
    }

    fn fail(&self, video_id: &str, error: UserError) -> UserError {
        warn!(error = %error, "Upload failed");
        self.emit(UploadEvent::Failed {
            video_id: video_id.to_string(),
            message: error.to_string(),
        });
        error
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Upload(event)).ok();
        }
    }
}

impl fmt::Debug for UploadPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadPipeline")
            .field("video_uploaders", &self.video_uploaders.len())
            .field("thumbnail_uploaders", &self.thumbnail_uploaders.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_async::time::{sleep, Duration};
    use core_library::{VideoId, VideoManifest, VideoRevisionSummary};
    use core_runtime::UserErrorKind;
    use provider_achrails::{FetchResult, RemoteError, RemoteGroups};

    /// Answers `put_video` after a delay; every other call is unexpected.
    struct SlowRemote {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl RemoteVideoApi for SlowRemote {
        fn user_id(&self) -> String {
            "u1".into()
        }

        async fn list_videos(&self) -> provider_achrails::Result<Vec<VideoRevisionSummary>> {
            unimplemented!()
        }

        async fn get_video(&self, _id: VideoId) -> provider_achrails::Result<VideoRecord> {
            unimplemented!()
        }

        async fn get_video_if_newer(
            &self,
            _id: VideoId,
            _revision: i64,
            _is_view: bool,
        ) -> provider_achrails::Result<FetchResult> {
            unimplemented!()
        }

        async fn put_video(&self, record: &VideoRecord) -> provider_achrails::Result<VideoRecord> {
            sleep(self.delay).await;
            if self.fail {
                return Err(RemoteError::Transport("connection reset".into()));
            }
            let mut manifest = record.manifest.clone();
            manifest.revision += 1;
            Ok(VideoRecord::from_server(manifest, "u1"))
        }

        async fn delete_video(&self, _id: VideoId) -> provider_achrails::Result<()> {
            unimplemented!()
        }

        async fn set_video_publicity(&self, _id: VideoId, _is_public: bool) -> provider_achrails::Result<()> {
            unimplemented!()
        }

        async fn share_video_to_group(&self, _id: VideoId, _group_id: i64) -> provider_achrails::Result<()> {
            unimplemented!()
        }

        async fn unshare_video_from_group(&self, _id: VideoId, _group_id: i64) -> provider_achrails::Result<()> {
            unimplemented!()
        }

        async fn search_videos(&self, _query: &str) -> provider_achrails::Result<Vec<VideoRecord>> {
            unimplemented!()
        }

        async fn get_groups(&self) -> provider_achrails::Result<RemoteGroups> {
            unimplemented!()
        }
    }

    fn remote(delay_ms: u64) -> SlowRemote {
        SlowRemote {
            delay: Duration::from_millis(delay_ms),
            fail: false,
        }
    }

    fn video() -> VideoRecord {
        let mut record = VideoRecord::local(VideoManifest::new(
            VideoId::new(),
            "Lathe safety",
            "file:///captures/lathe.mp4",
            Utc::now(),
        ));
        record.manifest.revision = 2;
        record
    }

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<UploadProgress>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let callback: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));
        (callback, log)
    }

    fn values(log: &Arc<Mutex<Vec<UploadProgress>>>) -> Vec<f64> {
        log.lock().unwrap().iter().map(|p| p.value).collect()
    }

    fn config() -> SyncConfig {
        SyncConfig::default().with_put_ticks(Duration::from_millis(500), 0.05, 0.9)
    }

    #[tokio::test]
    async fn test_fallback_stops_at_first_success() {
        let mut first = MockVideoUploader::new();
        first.expect_upload_video().times(1).returning(|_, progress| {
            progress.report(0.5);
            Err(anyhow::anyhow!("quota exceeded"))
        });
        let mut second = MockVideoUploader::new();
        second.expect_upload_video().times(1).returning(|_, progress| {
            progress.report(0.25);
            progress.report(1.0);
            Ok(Some(UploadedMedia::new("https://media/v.mp4", None)))
        });
        let mut third = MockVideoUploader::new();
        third.expect_upload_video().never();
        let mut thumbnails = MockThumbnailUploader::new();
        thumbnails
            .expect_upload_thumbnail()
            .times(1)
            .returning(|_, progress| {
                progress.report(1.0);
                Ok(Some("https://media/t.jpg".into()))
            });

        let pipeline = UploadPipeline::new(config())
            .with_video_uploader(Arc::new(first))
            .with_video_uploader(Arc::new(second))
            .with_video_uploader(Arc::new(third))
            .with_thumbnail_uploader(Arc::new(thumbnails));
        let (callback, log) = recorder();

        let uploaded = pipeline.upload(&remote(0), &video(), callback).await.unwrap();

        assert_eq!(uploaded.revision(), 3);
        assert_eq!(uploaded.manifest.video_uri, "https://media/v.mp4");
        assert_eq!(uploaded.manifest.thumb_uri.as_deref(), Some("https://media/t.jpg"));
        // The second provider's 0.25 is below what the first one reached.
        let reported = values(&log);
        assert_eq!(reported.iter().filter(|v| **v == 0.7).count(), 1);
        assert!(!reported.contains(&(0.25 * 0.7)));
        assert!(reported.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*reported.last().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_thumbnail_phase_skipped_when_video_provider_returned_one() {
        let mut uploader = MockVideoUploader::new();
        uploader.expect_upload_video().returning(|_, _| {
            Ok(Some(UploadedMedia::new(
                "https://media/v.mp4",
                Some("https://media/poster.jpg".into()),
            )))
        });
        let mut thumbnails = MockThumbnailUploader::new();
        thumbnails.expect_upload_thumbnail().never();

        let pipeline = UploadPipeline::new(config())
            .with_video_uploader(Arc::new(uploader))
            .with_thumbnail_uploader(Arc::new(thumbnails));
        let (callback, _) = recorder();

        let uploaded = pipeline.upload(&remote(0), &video(), callback).await.unwrap();
        assert_eq!(uploaded.manifest.thumb_uri.as_deref(), Some("https://media/poster.jpg"));
    }

    #[tokio::test]
    async fn test_all_providers_failing_is_upload_error() {
        let mut uploader = MockVideoUploader::new();
        uploader.expect_upload_video().returning(|_, _| Ok(None));
        let mut thumbnails = MockThumbnailUploader::new();
        thumbnails
            .expect_upload_thumbnail()
            .returning(|_, _| Ok(Some("https://media/t.jpg".into())));

        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let pipeline = UploadPipeline::new(config())
            .with_video_uploader(Arc::new(uploader))
            .with_thumbnail_uploader(Arc::new(thumbnails))
            .with_event_bus(bus);
        let (callback, _) = recorder();

        let err = pipeline.upload(&remote(0), &video(), callback).await.unwrap_err();

        assert_eq!(err.kind(), UserErrorKind::FailedToUploadVideo);
        assert!(err.to_string().contains("Failed to upload media"));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Upload(UploadEvent::Started { .. })
        ));
        let mut saw_failed = false;
        while let Ok(event) = events.try_recv() {
            saw_failed |= matches!(event, CoreEvent::Upload(UploadEvent::Failed { .. }));
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn test_missing_thumbnail_is_upload_error() {
        let mut uploader = MockVideoUploader::new();
        uploader
            .expect_upload_video()
            .returning(|_, _| Ok(Some(UploadedMedia::new("https://media/v.mp4", None))));

        let pipeline = UploadPipeline::new(config()).with_video_uploader(Arc::new(uploader));
        let (callback, _) = recorder();

        let err = pipeline.upload(&remote(0), &video(), callback).await.unwrap_err();
        assert_eq!(err.kind(), UserErrorKind::FailedToUploadVideo);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_ticks_are_capped_and_monotonic() {
        let mut uploader = MockVideoUploader::new();
        uploader.expect_upload_video().returning(|_, _| {
            Ok(Some(UploadedMedia::new(
                "https://media/v.mp4",
                Some("https://media/t.jpg".into()),
            )))
        });

        let pipeline = UploadPipeline::new(config()).with_video_uploader(Arc::new(uploader));
        let (callback, log) = recorder();

        pipeline.upload(&remote(2_600), &video(), callback).await.unwrap();

        let ticks: Vec<f64> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.animated && p.value < 1.0)
            .map(|p| p.value)
            .collect();
        assert_eq!(ticks.len(), 2);
        assert!((ticks[0] - 0.85).abs() < 1e-9);
        assert!((ticks[1] - 0.9).abs() < 1e-9);
        assert_eq!(*values(&log).last().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_put_failure_is_upload_error_with_inner() {
        let mut uploader = MockVideoUploader::new();
        uploader.expect_upload_video().returning(|_, _| {
            Ok(Some(UploadedMedia::new(
                "https://media/v.mp4",
                Some("https://media/t.jpg".into()),
            )))
        });

        let pipeline = UploadPipeline::new(config()).with_video_uploader(Arc::new(uploader));
        let (callback, _) = recorder();
        let failing = SlowRemote {
            delay: Duration::ZERO,
            fail: true,
        };

        let err = pipeline.upload(&failing, &video(), callback).await.unwrap_err();

        assert_eq!(err.kind(), UserErrorKind::FailedToUploadVideo);
        assert!(err.inner().unwrap().to_string().contains("connection reset"));
    }
}
