//! Incoming app links.
//!
//! The host forwards URLs such as `videosync://public/videos/<uuid>`. The
//! host component picks the deployment and the first two path segments pick
//! what to show once the app is up:
//!
//! | Path              | Action                     |
//! |-------------------|----------------------------|
//! | *(empty)*         | none                       |
//! | `record`          | start a capture            |
//! | `videos`          | show all videos            |
//! | `videos/<uuid>`   | open that video            |
//!
//! Anything else is rejected. Segments past the second are ignored.

use core_library::VideoId;
use core_runtime::config::ServerTarget;
use thiserror::Error;
use url::Url;

/// Host component that selects the public deployment.
pub const PUBLIC_HOST: &str = "public";

#[derive(Error, Debug)]
pub enum DeepLinkError {
    #[error("Malformed link: {0}")]
    Malformed(#[from] url::ParseError),

    #[error("Link has no host")]
    MissingHost,

    #[error("Invalid server host {host}: {message}")]
    InvalidServer { host: String, message: String },

    #[error("Unknown link path: {0}")]
    UnknownPath(String),

    #[error("Invalid video id: {0}")]
    InvalidVideoId(String),
}

/// What the app should do after handling the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    RecordVideo,
    ShowAllVideos,
    ShowVideo(VideoId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLink {
    pub server: ServerTarget,
    pub action: Option<PendingAction>,
}

impl DeepLink {
    pub fn parse(raw: &str) -> Result<Self, DeepLinkError> {
        let url = Url::parse(raw)?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(DeepLinkError::MissingHost)?;

        let server = if host == PUBLIC_HOST {
            ServerTarget::Public
        } else {
            let base = match url.port() {
                Some(port) => format!("https://{host}:{port}"),
                None => format!("https://{host}"),
            };
            ServerTarget::private(&base).map_err(|e| DeepLinkError::InvalidServer {
                host: host.to_string(),
                message: e.to_string(),
            })?
        };

        let mut parts = url.path().split('/').filter(|s| !s.is_empty());
        let first = parts.next().unwrap_or_default();
        let second = parts.next().unwrap_or_default();

        let action = match (first, second) {
            ("", "") => None,
            ("record", "") => Some(PendingAction::RecordVideo),
            ("videos", "") => Some(PendingAction::ShowAllVideos),
            ("videos", id) => {
                let id = VideoId::from_string(id)
                    .map_err(|_| DeepLinkError::InvalidVideoId(id.to_string()))?;
                Some(PendingAction::ShowVideo(id))
            }
            _ => return Err(DeepLinkError::UnknownPath(url.path().to_string())),
        };

        Ok(Self { server, action })
    }
}

impl std::str::FromStr for DeepLink {
    type Err = DeepLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
