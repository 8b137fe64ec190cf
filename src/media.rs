use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::core::{BackendContext, Platform, ProgressSink};
use crate::download::download_to_file;
use crate::engine::{EngineError, EngineProgress, ExtractionEngine, MediaInfo, StreamRequest};
use crate::error::{Result, VidQueueError};
use crate::format::{RawFormat, whole};
use crate::progress::ProgressTracker;
use crate::resolver::ResolvedFormats;
use crate::utils::{free_output_stem, render_template, thumbnail_file_name};

pub const TITLE_PLACEHOLDER: &str = "Title unavailable";
pub const AUTHOR_PLACEHOLDER: &str = "Unavailable";

/// Engine selector used when the media offers no format choice.
pub const DEFAULT_SELECTOR: &str = "bestvideo+bestaudio/best";

/// How a platform turns raw formats into its selectable set.
pub type FormatStrategy = fn(&[RawFormat], &[String]) -> ResolvedFormats;

/// Metadata and resolved formats of one URL, shared by every platform backend.
///
/// Immutable once built; the sorted label list is computed on first use.
pub struct Media {
    platform: Platform,
    url: String,
    info: MediaInfo,
    formats: ResolvedFormats,
    sorted_names: OnceLock<Vec<String>>,
    engine: Arc<dyn ExtractionEngine>,
    container: String,
    thumbnail_index: i64,
}

impl std::fmt::Debug for Media {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Media")
            .field("platform", &self.platform)
            .field("url", &self.url)
            .field("id", &self.info.id)
            .field("formats", &self.formats.len())
            .finish()
    }
}

fn check_url(url: &str) -> Result<()> {
    match url::Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host().is_some() => Ok(()),
        _ => Err(VidQueueError::IncorrectLink(format!(
            "not an http(s) URL: {url}"
        ))),
    }
}

/// Engine failures while fetching metadata say something about the link,
/// except an unreachable API or an engine that could not run at all.
fn classify_info_error(e: EngineError) -> VidQueueError {
    match e {
        EngineError::ApiUnreachable(msg) => VidQueueError::ConnectionFailure(msg),
        EngineError::Launch(_) => VidQueueError::Engine(e),
        EngineError::NotThisPlatform(msg) | EngineError::Failed(msg) => {
            VidQueueError::IncorrectLink(msg)
        }
    }
}

impl Media {
    /// One metadata fetch, then eager format resolution with `strategy`.
    pub async fn fetch(
        platform: Platform,
        url: &str,
        ctx: &BackendContext,
        strategy: FormatStrategy,
    ) -> Result<Self> {
        check_url(url)?;
        tracing::debug!(url, %platform, engine = ctx.engine.name(), "fetching info");
        let info = ctx
            .engine
            .extract_info(url)
            .await
            .map_err(classify_info_error)?;
        Self::from_info(platform, url, info, ctx, strategy)
    }

    pub fn from_info(
        platform: Platform,
        url: &str,
        info: MediaInfo,
        ctx: &BackendContext,
        strategy: FormatStrategy,
    ) -> Result<Self> {
        if !info
            .extractor_family()
            .eq_ignore_ascii_case(platform.extractor())
        {
            return Err(VidQueueError::IncorrectLink(format!(
                "{url} is handled by extractor '{}', not {platform}",
                info.extractor
            )));
        }

        let formats = strategy(&info.raw_formats(), &ctx.allowed_extensions);
        tracing::debug!(url, id = %info.id, formats = formats.len(), "formats resolved");

        Ok(Self {
            platform,
            url: url.to_string(),
            info,
            formats,
            sorted_names: OnceLock::new(),
            engine: ctx.engine.clone(),
            container: ctx.container.clone(),
            thumbnail_index: ctx.thumbnail_index,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    pub fn formats(&self) -> &ResolvedFormats {
        &self.formats
    }

    pub fn title(&self) -> &str {
        self.info.title.as_deref().unwrap_or(TITLE_PLACEHOLDER)
    }

    pub fn author(&self) -> &str {
        self.info.uploader.as_deref().unwrap_or(AUTHOR_PLACEHOLDER)
    }

    pub fn sorted_format_names(&self) -> &[String] {
        self.sorted_names.get_or_init(|| {
            let mut keyed: Vec<_> = self
                .formats
                .labels()
                .into_iter()
                .map(|label| {
                    let key = self
                        .formats
                        .get(&label)
                        .map(|f| f.format.sort_key())
                        .unwrap_or_default();
                    (label, key)
                })
                .collect();
            keyed.sort_by(|a, b| b.1.cmp(&a.1));
            keyed.into_iter().map(|(label, _)| label).collect()
        })
    }

    pub fn format_selectors(&self) -> Vec<(String, String)> {
        self.formats
            .iter()
            .map(|f| (f.label.clone(), f.selector.as_engine_string()))
            .collect()
    }

    pub fn total_bytes(&self, label: &str) -> Option<u64> {
        self.formats.get(label).and_then(|f| f.total_bytes)
    }

    fn thumbnail_url(&self, high_quality: bool) -> Option<&str> {
        let list = &self.info.thumbnails;
        if high_quality {
            return self
                .info
                .thumbnail
                .as_deref()
                .or_else(|| list.last().map(|t| t.url.as_str()));
        }
        let len = list.len() as i64;
        let index = if self.thumbnail_index < 0 {
            len + self.thumbnail_index
        } else {
            self.thumbnail_index
        };
        let picked = if (0..len).contains(&index) {
            list.get(index as usize)
        } else {
            list.first()
        };
        picked
            .map(|t| t.url.as_str())
            .or(self.info.thumbnail.as_deref())
    }

    pub async fn download_thumbnail(&self, dir: &Path, high_quality: bool) -> Result<Option<String>> {
        let Some(thumbnail_url) = self.thumbnail_url(high_quality) else {
            tracing::debug!(url = %self.url, "no thumbnail");
            return Ok(None);
        };
        let name = thumbnail_file_name(&self.info.extractor, &self.info.id, thumbnail_url);
        let path = dir.join(&name);
        if path.exists() {
            tracing::debug!(path = %path.display(), "thumbnail already present");
            return Ok(Some(name));
        }
        tokio::fs::create_dir_all(dir).await?;
        download_to_file(thumbnail_url, &path).await?;
        Ok(Some(name))
    }

    fn template_fields(&self, format: &RawFormat) -> [(&'static str, String); 5] {
        let number = |v: Option<f64>| whole(v).map(|n| n.to_string()).unwrap_or_default();
        [
            ("extractor", self.info.extractor.clone()),
            ("title", self.title().to_string()),
            ("ext", self.container.clone()),
            ("height", number(format.height)),
            ("fps", number(format.fps)),
        ]
    }

    pub async fn download(
        &self,
        on_progress: ProgressSink<'_>,
        dir: &Path,
        template: &str,
        selector: Option<&str>,
    ) -> Result<PathBuf> {
        let resolved = match selector {
            Some(s) => Some(
                self.formats
                    .by_selector(s)
                    .ok_or_else(|| VidQueueError::UnknownFormat(s.to_string()))?,
            ),
            None => None,
        };
        let engine_format = selector.unwrap_or(DEFAULT_SELECTOR).to_string();
        let fields_from = resolved.map(|r| &r.format).unwrap_or(&self.info.implicit);

        let rendered = render_template(template, &self.template_fields(fields_from));
        // the container extension is appended to the stem below
        let rendered = rendered
            .strip_suffix(&format!(".{}", self.container))
            .unwrap_or(&rendered);
        let mut stem = sanitize_filename::sanitize(rendered);
        if stem.trim().is_empty() {
            stem = sanitize_filename::sanitize(&self.info.id);
        }

        tokio::fs::create_dir_all(dir).await?;
        let request = StreamRequest {
            url: self.url.clone(),
            format: engine_format,
            output_stem: free_output_stem(dir, &stem, &self.container),
            container: self.container.clone(),
            merge: !resolved.is_some_and(|r| r.is_audio_only()),
        };
        tracing::info!(
            url = %self.url,
            label = resolved.map(|r| r.label.as_str()).unwrap_or("default"),
            output = %request.output_path().display(),
            "download started"
        );

        let mut tracker = ProgressTracker::new(resolved.and_then(|r| r.total_bytes));
        let result = {
            let mut hook = |event: EngineProgress| {
                if let Some(p) = tracker.observe(&event) {
                    on_progress(p);
                }
            };
            self.engine.stream_download(&request, &mut hook).await
        };

        match result {
            Ok(()) => match tracker.finish() {
                Some(p) => {
                    on_progress(p);
                    tracing::info!(output = %request.output_path().display(), "download finished");
                    Ok(request.output_path())
                }
                None => Err(VidQueueError::DownloadStatusError),
            },
            Err(e) => {
                if let Some(p) = tracker.fail() {
                    on_progress(p);
                }
                Err(VidQueueError::Engine(e))
            }
        }
    }
}
