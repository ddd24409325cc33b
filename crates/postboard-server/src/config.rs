use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub max_image_size_mb: u64,
    pub max_image_bytes: u64,
    pub image_formats: Vec<String>,
    pub video_formats: Vec<String>,
    pub fetch_timeout: Duration,
    pub transcribe_url: Option<String>,
    pub transcribe_api_key: Option<String>,
    pub transcribe_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_image_size_mb: u64 = parse(&var, "POSTBOARD_MAX_IMAGE_SIZE_MB", 5)?;
        let max_image_bytes = max_image_size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            anyhow!(
                "POSTBOARD_MAX_IMAGE_SIZE_MB is too large: {}",
                max_image_size_mb
            )
        })?;

        Ok(Self {
            host: var("POSTBOARD_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&var, "POSTBOARD_PORT", 8000)?,
            db_path: var("POSTBOARD_DB_PATH")
                .unwrap_or_else(|| "postboard.db".into())
                .into(),
            max_image_size_mb,
            max_image_bytes,
            image_formats: list(&var, "POSTBOARD_ALLOWED_IMAGE_FORMATS", "image/jpeg,image/png"),
            video_formats: list(&var, "POSTBOARD_ALLOWED_VIDEO_FORMATS", "video/mp4,video/webm"),
            fetch_timeout: Duration::from_secs(parse(&var, "POSTBOARD_FETCH_TIMEOUT_SECS", 10)?),
            transcribe_url: var("POSTBOARD_TRANSCRIBE_URL"),
            transcribe_api_key: var("POSTBOARD_TRANSCRIBE_API_KEY"),
            transcribe_timeout: Duration::from_secs(parse(
                &var,
                "POSTBOARD_TRANSCRIBE_TIMEOUT_SECS",
                300,
            )?),
        })
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", key, raw)),
        None => Ok(default),
    }
}

fn list(var: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Vec<String> {
    var(key)
        .unwrap_or_else(|| default.to_string())
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
