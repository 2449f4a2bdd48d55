//! AchRails API client
//!
//! Typed operations over [`AuthSession::authorized_request`]. The server only
//! stores manifests and sharing; media lives with the upload providers.

use async_trait::async_trait;
use bridge_traits::http::{HttpMethod, HttpRequest, HttpResponse};
use core_auth::AuthSession;
use core_library::{Group, VideoId, VideoManifest, VideoRecord, VideoRevisionSummary};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{RemoteError, Result};
use crate::types::{
    FetchResult, GroupsEnvelope, PublicityPayload, RemoteGroups, SharePayload, VideoListEnvelope,
};

/// Remote operations the sync engine depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteVideoApi: Send + Sync {
    /// Id of the authenticated user; stamped on every downloaded record.
    fn user_id(&self) -> String;

    /// `(uuid, revision)` of every video visible to the user.
    async fn list_videos(&self) -> Result<Vec<VideoRevisionSummary>>;

    async fn get_video(&self, id: VideoId) -> Result<VideoRecord>;

    /// [`FetchResult::NotModified`] when the server revision is not newer than
    /// `revision`.
    async fn get_video_if_newer(
        &self,
        id: VideoId,
        revision: i64,
        is_view: bool,
    ) -> Result<FetchResult>;

    /// Upload the manifest. The response is the server's merged record.
    async fn put_video(&self, record: &VideoRecord) -> Result<VideoRecord>;

    async fn delete_video(&self, id: VideoId) -> Result<()>;

    async fn set_video_publicity(&self, id: VideoId, is_public: bool) -> Result<()>;

    async fn share_video_to_group(&self, id: VideoId, group_id: i64) -> Result<()>;

    async fn unshare_video_from_group(&self, id: VideoId, group_id: i64) -> Result<()>;

    async fn search_videos(&self, query: &str) -> Result<Vec<VideoRecord>>;

    async fn get_groups(&self) -> Result<RemoteGroups>;
}

pub struct AchRailsClient {
    session: Arc<AuthSession>,
    endpoint: Url,
    user_id: String,
}

impl AchRailsClient {
    /// `endpoint` is the API base; a trailing `/` is added when missing so
    /// relative paths resolve beneath it.
    pub fn new(session: Arc<AuthSession>, endpoint: Url, user_id: impl Into<String>) -> Self {
        let endpoint = if endpoint.path().ends_with('/') {
            endpoint
        } else {
            let mut endpoint = endpoint;
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
            endpoint
        };

        Self {
            session,
            endpoint,
            user_id: user_id.into(),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    fn request(&self, method: HttpMethod, path: &str) -> Result<HttpRequest> {
        let url = self
            .endpoint
            .join(path)
            .map_err(|e| RemoteError::InvalidRequest(format!("{path}: {e}")))?;
        Ok(HttpRequest::new(method, url.as_str()))
    }

    fn json_request<T: Serialize>(&self, method: HttpMethod, path: &str, body: &T) -> Result<HttpRequest> {
        self.request(method, path)?
            .json(body)
            .map_err(|e| RemoteError::InvalidRequest(e.to_string()))
    }

    /// Renew an expired token before the request goes out, then send with
    /// the refresh-and-replay fallback.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.session.refresh_if_necessary().await?;
        Ok(self.session.authorized_request(request, true).await?)
    }

    /// Send and require a 2xx status.
    async fn send_ok(&self, request: HttpRequest, endpoint: &str) -> Result<HttpResponse> {
        let response = self.send(request).await?;
        check_status(&response, endpoint)?;
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: HttpRequest, endpoint: &str) -> Result<T> {
        let response = self.send_ok(request, endpoint).await?;
        response.json().map_err(|e| RemoteError::decode(endpoint, e))
    }

    fn decode_manifest(&self, value: serde_json::Value, endpoint: &str) -> Result<VideoRecord> {
        let manifest: VideoManifest =
            serde_json::from_value(value).map_err(|e| RemoteError::decode(endpoint, e))?;
        Ok(VideoRecord::from_server(manifest, self.user_id.clone()))
    }
}

fn video_path(id: VideoId) -> String {
    format!("videos/{id}.json")
}

fn check_status(response: &HttpResponse, endpoint: &str) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        warn!(status = response.status, endpoint, "AchRails request failed");
        Err(RemoteError::Status {
            endpoint: endpoint.to_string(),
            status: response.status,
        })
    }
}

/// Decode each entry on its own; malformed entries are logged and skipped.
fn decode_entries<T: DeserializeOwned>(entries: Vec<serde_json::Value>, endpoint: &str) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(endpoint, error = %e, "Skipping malformed entry");
                None
            }
        })
        .collect()
}

#[async_trait]
impl RemoteVideoApi for AchRailsClient {
    fn user_id(&self) -> String {
        self.user_id.clone()
    }

    #[instrument(skip(self))]
    async fn list_videos(&self) -> Result<Vec<VideoRevisionSummary>> {
        let endpoint = "videos.json";
        let envelope: VideoListEnvelope = self
            .send_json(self.request(HttpMethod::Get, endpoint)?, endpoint)
            .await?;

        let videos: Vec<VideoRevisionSummary> = decode_entries(envelope.videos, endpoint);
        debug!(count = videos.len(), "Listed video revisions");
        Ok(videos)
    }

    #[instrument(skip(self), fields(video_id = %id))]
    async fn get_video(&self, id: VideoId) -> Result<VideoRecord> {
        let endpoint = video_path(id);
        let value = self
            .send_json(self.request(HttpMethod::Get, &endpoint)?, &endpoint)
            .await?;
        self.decode_manifest(value, &endpoint)
    }

    #[instrument(skip(self), fields(video_id = %id))]
    async fn get_video_if_newer(
        &self,
        id: VideoId,
        revision: i64,
        is_view: bool,
    ) -> Result<FetchResult> {
        let endpoint = video_path(id);
        let request = self
            .request(HttpMethod::Get, &endpoint)?
            .query("newer_than_rev", revision.to_string())
            .query("is_view", if is_view { "1" } else { "0" });

        let response = self.send(request).await?;
        if response.status == 304 {
            debug!("Video not modified");
            return Ok(FetchResult::NotModified);
        }
        check_status(&response, &endpoint)?;

        let value = response
            .json()
            .map_err(|e| RemoteError::decode(&endpoint, e))?;
        self.decode_manifest(value, &endpoint).map(FetchResult::Updated)
    }

    #[instrument(skip(self, record), fields(video_id = %record.id(), revision = record.revision()))]
    async fn put_video(&self, record: &VideoRecord) -> Result<VideoRecord> {
        let endpoint = video_path(record.id());
        let request = self.json_request(HttpMethod::Put, &endpoint, &record.manifest)?;
        let value = self.send_json(request, &endpoint).await?;
        let uploaded = self.decode_manifest(value, &endpoint)?;
        debug!(new_revision = uploaded.revision(), "Video uploaded");
        Ok(uploaded)
    }

    #[instrument(skip(self), fields(video_id = %id))]
    async fn delete_video(&self, id: VideoId) -> Result<()> {
        let endpoint = video_path(id);
        let response = self.send(self.request(HttpMethod::Delete, &endpoint)?).await?;
        if response.status >= 400 {
            return Err(RemoteError::Status {
                endpoint,
                status: response.status,
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(video_id = %id))]
    async fn set_video_publicity(&self, id: VideoId, is_public: bool) -> Result<()> {
        let endpoint = format!("videos/{id}/shares/set_publicity");
        let request = self.json_request(HttpMethod::Put, &endpoint, &PublicityPayload { is_public })?;
        self.send_ok(request, &endpoint).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(video_id = %id))]
    async fn share_video_to_group(&self, id: VideoId, group_id: i64) -> Result<()> {
        let endpoint = format!("videos/{id}/shares");
        let request = self.json_request(HttpMethod::Post, &endpoint, &SharePayload { group: group_id })?;
        self.send_ok(request, &endpoint).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(video_id = %id))]
    async fn unshare_video_from_group(&self, id: VideoId, group_id: i64) -> Result<()> {
        let endpoint = format!("videos/{id}/shares/{group_id}");
        self.send_ok(self.request(HttpMethod::Delete, &endpoint)?, &endpoint)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn search_videos(&self, query: &str) -> Result<Vec<VideoRecord>> {
        let endpoint = "videos/search";
        let request = self.request(HttpMethod::Get, endpoint)?.query("q", query);
        let envelope: VideoListEnvelope = self.send_json(request, endpoint).await?;

        let manifests: Vec<VideoManifest> = decode_entries(envelope.videos, endpoint);
        Ok(manifests
            .into_iter()
            .map(|m| VideoRecord::from_server(m, self.user_id.clone()))
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_groups(&self) -> Result<RemoteGroups> {
        let endpoint = "groups/own.json";
        let envelope: GroupsEnvelope = self
            .send_json(self.request(HttpMethod::Get, endpoint)?, endpoint)
            .await?;

        let groups: Vec<Group> = decode_entries(envelope.groups, endpoint);
        debug!(count = groups.len(), "Fetched groups");
        Ok(RemoteGroups {
            groups,
            user: envelope.user,
        })
    }
}

impl std::fmt::Debug for AchRailsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AchRailsClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("user_id", &self.user_id)
            .finish()
    }
}
