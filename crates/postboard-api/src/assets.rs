use std::fmt;

use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, warn};

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Thumbnail,
    Video,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Thumbnail => f.write_str("thumbnail image"),
            AssetKind::Video => f.write_str("video"),
        }
    }
}

/// Allowed MIME types per asset kind, and the thumbnail size cap.
#[derive(Debug, Clone)]
pub struct AssetPolicy {
    pub image_formats: Vec<String>,
    pub video_formats: Vec<String>,
    pub max_image_bytes: u64,
}

impl AssetPolicy {
    fn formats(&self, kind: AssetKind) -> &[String] {
        match kind {
            AssetKind::Thumbnail => &self.image_formats,
            AssetKind::Video => &self.video_formats,
        }
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    /// Transport failure, timeout, or non-success status.
    #[error("Failed to fetch {kind} from URL")]
    Fetch { kind: AssetKind, reason: String },

    #[error("Only {allowed} formats are allowed.")]
    UnsupportedFormat { allowed: String },

    #[error("Image size must be less than {limit}.")]
    TooLarge { limit: String },
}

/// Checks remote thumbnail and video URLs before they are stored.
///
/// Thumbnails are downloaded (streamed, stopping at the size cap) so their
/// real size can be measured. Videos only get a `HEAD`; their size is not
/// checked.
pub struct AssetValidator {
    client: Client,
    policy: AssetPolicy,
}

impl AssetValidator {
    /// `client` should carry a request timeout; a timed-out fetch is reported
    /// as [`AssetError::Fetch`].
    pub fn new(client: Client, policy: AssetPolicy) -> Self {
        Self { client, policy }
    }

    /// Returns `Ok(None)` when `url` is not an absolute URL with a host; such
    /// values are treated as absent rather than rejected.
    pub async fn validate(&self, url: &str, kind: AssetKind) -> Result<Option<String>, AssetError> {
        let Some(parsed) = parse_absolute(url) else {
            debug!(url = %url, %kind, "Ignoring non-absolute asset URL");
            return Ok(None);
        };

        match kind {
            AssetKind::Thumbnail => self.check_thumbnail(parsed).await?,
            AssetKind::Video => self.check_video(parsed).await?,
        }

        Ok(Some(url.to_string()))
    }

    async fn check_thumbnail(&self, url: Url) -> Result<(), AssetError> {
        let kind = AssetKind::Thumbnail;
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(kind, &url, e))?;

        ensure_success(kind, &url, response.status())?;
        self.ensure_allowed(kind, response.headers())?;

        let max = self.policy.max_image_bytes;
        if response.content_length().is_some_and(|len| len > max) {
            return Err(too_large(max));
        }

        let mut received: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_error(kind, &url, e))?
        {
            received += chunk.len() as u64;
            if received > max {
                return Err(too_large(max));
            }
        }

        debug!(url = %url, bytes = received, "Thumbnail accepted");
        Ok(())
    }

    async fn check_video(&self, url: Url) -> Result<(), AssetError> {
        let kind = AssetKind::Video;
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(kind, &url, e))?;

        ensure_success(kind, &url, response.status())?;
        self.ensure_allowed(kind, response.headers())?;

        debug!(url = %url, "Video accepted");
        Ok(())
    }

    fn ensure_allowed(&self, kind: AssetKind, headers: &HeaderMap) -> Result<(), AssetError> {
        let allowed = self.policy.formats(kind);
        let declared = content_type(headers);
        let ok = declared
            .as_deref()
            .is_some_and(|ct| allowed.iter().any(|a| a.eq_ignore_ascii_case(ct)));

        if !ok {
            warn!(?declared, %kind, "Rejected asset content type");
            return Err(AssetError::UnsupportedFormat {
                allowed: allowed.join(", "),
            });
        }
        Ok(())
    }
}

fn parse_absolute(url: &str) -> Option<Url> {
    Url::parse(url)
        .ok()
        .filter(|u| u.host_str().is_some_and(|h| !h.is_empty()))
}

/// Media type without parameters, lowercased.
fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

fn ensure_success(kind: AssetKind, url: &Url, status: StatusCode) -> Result<(), AssetError> {
    if status.is_success() {
        return Ok(());
    }
    warn!(url = %url, %kind, status = status.as_u16(), "Asset URL returned an error status");
    Err(AssetError::Fetch {
        kind,
        reason: format!("status {}", status),
    })
}

fn fetch_error(kind: AssetKind, url: &Url, err: reqwest::Error) -> AssetError {
    let reason = if err.is_timeout() {
        "timed out".to_string()
    } else {
        err.to_string()
    };
    warn!(url = %url, %kind, reason = %reason, "Failed to fetch asset");
    AssetError::Fetch { kind, reason }
}

fn too_large(max_bytes: u64) -> AssetError {
    let limit = if max_bytes >= MB && max_bytes % MB == 0 {
        format!("{} MB", max_bytes / MB)
    } else {
        format!("{} bytes", max_bytes)
    };
    AssetError::TooLarge { limit }
}
