use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
pub use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::engine::ExtractionEngine;
use crate::error::Result;
use crate::media::Media;
pub use crate::progress::{DownloadStatus, Progress};

#[cfg(feature = "twitter")]
use crate::twitter::{TwitterBackend, is_twitter_url};
#[cfg(feature = "youtube")]
use crate::youtube::{YoutubeBackend, is_youtube_url};

/// Supported platforms
#[derive(
    EnumIter,
    EnumString,
    Display,
    AsRefStr,
    IntoStaticStr,
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
)]
#[strum(ascii_case_insensitive)]
pub enum Platform {
    #[cfg(feature = "youtube")]
    YouTube,
    #[cfg(feature = "twitter")]
    Twitter,
}

impl Platform {
    /// Extractor family the engine reports for this platform's URLs.
    pub fn extractor(&self) -> &'static str {
        match *self {
            #[cfg(feature = "youtube")]
            Platform::YouTube => "youtube",
            #[cfg(feature = "twitter")]
            Platform::Twitter => "twitter",
        }
    }

    /// Quick domain check. The engine's extractor check at construction stays authoritative.
    pub fn matches(&self, url: &str) -> bool {
        match *self {
            #[cfg(feature = "youtube")]
            Platform::YouTube => is_youtube_url(url),
            #[cfg(feature = "twitter")]
            Platform::Twitter => is_twitter_url(url),
        }
    }

    /// Fetch metadata for `url` and build this platform's backend.
    pub async fn open(&self, url: &str, ctx: &BackendContext) -> Result<Arc<dyn Backend>> {
        match *self {
            #[cfg(feature = "youtube")]
            Platform::YouTube => Ok(Arc::new(YoutubeBackend::open(url, ctx).await?)),
            #[cfg(feature = "twitter")]
            Platform::Twitter => Ok(Arc::new(TwitterBackend::open(url, ctx).await?)),
        }
    }

    pub fn detect(url: &str) -> Option<Platform> {
        Platform::iter().find(|p| p.matches(url))
    }

    pub fn names() -> Vec<&'static str> {
        Platform::iter().map(|p| p.into()).collect()
    }
}

/// What every backend needs besides the URL.
#[derive(Clone)]
pub struct BackendContext {
    pub engine: Arc<dyn ExtractionEngine>,
    /// Resolver extension filter; later entries are preferred.
    pub allowed_extensions: Vec<String>,
    /// Container every download ends up in.
    pub container: String,
    /// Position of the low-quality thumbnail, negative counts from the end.
    pub thumbnail_index: i64,
}

impl BackendContext {
    pub fn new(engine: Arc<dyn ExtractionEngine>) -> Self {
        Self {
            engine,
            allowed_extensions: vec!["mp4".into(), "webm".into(), "mp3".into()],
            container: "mp4".into(),
            thumbnail_index: -2,
        }
    }
}

impl std::fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendContext")
            .field("engine", &self.engine.name())
            .field("allowed_extensions", &self.allowed_extensions)
            .field("container", &self.container)
            .field("thumbnail_index", &self.thumbnail_index)
            .finish()
    }
}

/// Receives progress reports of one download.
pub type ProgressSink<'a> = &'a (dyn Fn(Progress) + Send + Sync);

/// A platform backend owns the resolved metadata of one URL.
///
/// Implementors only provide [`Backend::media`]; everything else works on
/// the shared state, so a platform differs from another by how it builds
/// its [`Media`].
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    fn media(&self) -> &Media;

    fn platform(&self) -> Platform {
        self.media().platform()
    }

    fn url(&self) -> &str {
        self.media().url()
    }

    /// Title, or a placeholder when the platform reports none.
    fn title(&self) -> &str {
        self.media().title()
    }

    /// Uploader, or a placeholder when the platform reports none.
    fn author(&self) -> &str {
        self.media().author()
    }

    /// Format labels, highest (height, fps) first. Empty when no selection is possible.
    fn sorted_format_names(&self) -> &[String] {
        self.media().sorted_format_names()
    }

    /// `(label, selector)` pairs in resolution order.
    fn format_selectors(&self) -> Vec<(String, String)> {
        self.media().format_selectors()
    }

    fn total_bytes(&self, label: &str) -> Option<u64> {
        self.media().total_bytes(label)
    }

    /// Fetch the thumbnail into `dir` and return its file name, `None` when the
    /// media has no thumbnail.
    async fn download_thumbnail(&self, dir: &Path, high_quality: bool) -> Result<Option<String>> {
        self.media().download_thumbnail(dir, high_quality).await
    }

    /// Download the format with engine selector `selector` (the default
    /// best format when `None`) into `dir`, naming the file from `template`.
    async fn download(
        &self,
        on_progress: ProgressSink<'_>,
        dir: &Path,
        template: &str,
        selector: Option<&str>,
    ) -> Result<PathBuf> {
        self.media()
            .download(on_progress, dir, template, selector)
            .await
    }
}
