//! Publishing captured videos through the engine's upload pipeline.

mod common;

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use bridge_traits::http::HttpMethod;
use common::*;
use core_library::{VideoRecord, VideoStore};
use core_runtime::config::SyncConfig;
use core_runtime::UserErrorKind;
use core_sync::{
    ProgressCallback, ProgressReporter, SyncEngine, UploadPipeline, UploadProgress, UploadedMedia,
    VideoUploader,
};

struct Unreachable;

#[async_trait]
impl VideoUploader for Unreachable {
    async fn upload_video(
        &self,
        _video: &VideoRecord,
        _progress: ProgressReporter,
    ) -> anyhow::Result<Option<UploadedMedia>> {
        Err(anyhow!("host unreachable"))
    }
}

/// Hosts the file at a fixed location and renders its own poster frame.
struct Hosted(&'static str);

#[async_trait]
impl VideoUploader for Hosted {
    async fn upload_video(
        &self,
        _video: &VideoRecord,
        progress: ProgressReporter,
    ) -> anyhow::Result<Option<UploadedMedia>> {
        progress.report(0.5);
        progress.report(1.0);
        Ok(Some(UploadedMedia::new(
            self.0,
            Some(format!("{}.jpg", self.0)),
        )))
    }
}

fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<UploadProgress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));
    (callback, seen)
}

fn pipeline() -> UploadPipeline {
    UploadPipeline::new(SyncConfig::default())
        .with_video_uploader(Arc::new(Unreachable))
        .with_video_uploader(Arc::new(Hosted("https://media.example.com/v1")))
}

#[tokio::test]
async fn captured_video_is_published_and_stored() {
    let capture = captured(0);
    let id = capture.id();
    let h = Harness::new(vec![capture.clone()]).await;
    h.http
        .on_json(HttpMethod::Put, &video_url(id), 200, manifest_json(id, 1, "capture"));

    let engine = SyncEngine::builder(h.store.clone(), h.groups.clone())
        .remote(h.client.clone())
        .upload_pipeline(pipeline())
        .build();
    let (callback, seen) = recorder();

    let published = engine.upload_video(&capture, callback).await.unwrap();
    engine.coordinator().flush().await;

    assert_eq!(published.revision(), 1);
    assert!(!published.is_local_only());

    let requests = h.http.requests();
    let sent: serde_json::Value = serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(sent["videoUri"], "https://media.example.com/v1");
    assert_eq!(sent["thumbUri"], "https://media.example.com/v1.jpg");

    let stored = h.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.revision(), 1);
    assert_eq!(engine.find_video(id).unwrap().revision(), 1);

    let values: Vec<f64> = seen.lock().unwrap().iter().map(|p| p.value).collect();
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
    assert_eq!(values.last().copied(), Some(1.0));
}

#[tokio::test]
async fn upload_without_remote_is_rejected() {
    let h = Harness::new(vec![]).await;
    let engine = SyncEngine::builder(h.store.clone(), h.groups.clone())
        .upload_pipeline(pipeline())
        .build();
    let (callback, seen) = recorder();

    let err = engine.upload_video(&captured(0), callback).await.unwrap_err();

    assert_eq!(err.kind(), UserErrorKind::InvalidServerUrl);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(h.http.total(), 0);
}

#[tokio::test]
async fn upload_with_no_working_host_fails() {
    let capture = captured(0);
    let h = Harness::new(vec![capture.clone()]).await;
    let engine = SyncEngine::builder(h.store.clone(), h.groups.clone())
        .remote(h.client.clone())
        .upload_pipeline(UploadPipeline::new(SyncConfig::default()).with_video_uploader(Arc::new(Unreachable)))
        .build();
    let (callback, _) = recorder();

    let err = engine.upload_video(&capture, callback).await.unwrap_err();

    assert_eq!(err.kind(), UserErrorKind::FailedToUploadVideo);
    assert_eq!(h.http.total(), 0);
    assert!(h.store.find_by_id(capture.id()).await.unwrap().unwrap().is_local_only());
}

#[tokio::test]
async fn store_failure_after_publish_is_a_save_error() {
    let capture = captured(0);
    let id = capture.id();
    let h = Harness::new(vec![]).await;
    h.http
        .on_json(HttpMethod::Put, &video_url(id), 200, manifest_json(id, 1, "capture"));

    let engine = SyncEngine::builder(Arc::new(UnflushableStore::default()), h.groups.clone())
        .remote(h.client.clone())
        .upload_pipeline(pipeline())
        .build();
    let (callback, _) = recorder();

    let err = engine.upload_video(&capture, callback).await.unwrap_err();

    assert_eq!(err.kind(), UserErrorKind::FailedToSaveVideo);
    assert_eq!(h.http.count(HttpMethod::Put, &video_url(id)), 1);
}
