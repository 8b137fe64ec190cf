//! The extraction engine capability: per-site metadata extraction and
//! stream download are delegated to an external engine behind this trait.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use thiserror::Error;

use crate::format::RawFormat;

pub mod ytdlp;

pub use ytdlp::YtDlpEngine;

#[derive(Error, Debug, Clone, IntoStaticStr)]
pub enum EngineError {
    /// The URL belongs to no extractor, or to another platform's.
    #[error("Unsupported URL: {0}")]
    NotThisPlatform(String),

    #[error("Unable to reach the platform API: {0}")]
    ApiUnreachable(String),

    #[error("{0}")]
    Failed(String),

    #[error("Could not launch the engine: {0}")]
    Launch(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

/// Metadata record for one URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub extractor: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    #[serde(default)]
    pub formats: Option<Vec<RawFormat>>,
    /// Format fields of the record itself, used when `formats` is absent.
    #[serde(flatten)]
    pub implicit: RawFormat,
}

impl MediaInfo {
    /// Available formats; a record without a list is its own single format.
    pub fn raw_formats(&self) -> Vec<RawFormat> {
        match &self.formats {
            Some(formats) => formats.clone(),
            None => vec![self.implicit.clone()],
        }
    }

    /// Extractor name without its sub-extractor suffix (`twitter:broadcast` -> `twitter`).
    pub fn extractor_family(&self) -> &str {
        self.extractor.split(':').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Downloading,
    Finished,
    Error,
    Other(String),
}

impl From<&str> for EngineStatus {
    fn from(s: &str) -> Self {
        match s {
            "downloading" => EngineStatus::Downloading,
            "finished" => EngineStatus::Finished,
            "error" => EngineStatus::Error,
            other => EngineStatus::Other(other.to_string()),
        }
    }
}

/// One raw progress event, as the engine emits it.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineProgress {
    pub status: EngineStatus,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
}

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub url: String,
    /// Engine format selector, e.g. `"22"` or `"137+140"`.
    pub format: String,
    /// Output path without extension; the engine appends `container`.
    pub output_stem: PathBuf,
    pub container: String,
    /// Streams are merged/remuxed into `container`.
    pub merge: bool,
}

impl StreamRequest {
    pub fn output_path(&self) -> PathBuf {
        let mut name = self.output_stem.clone().into_os_string();
        name.push(".");
        name.push(&self.container);
        PathBuf::from(name)
    }
}

pub type ProgressHook<'a> = &'a mut (dyn FnMut(EngineProgress) + Send);

#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &'static str;

    async fn extract_info(&self, url: &str) -> Result<MediaInfo, EngineError>;

    /// Download `request`, calling `hook` for every progress event.
    async fn stream_download(
        &self,
        request: &StreamRequest,
        hook: ProgressHook<'_>,
    ) -> Result<(), EngineError>;
}
