//! Drives one item through info fetch, thumbnail fetch and download.
//!
//! Every unit of work runs in its own task. The controller waits on it
//! together with the phase deadline and the cancellation token; when either
//! fires first the task is aborted and its late results are dropped with it.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use strum_macros::{AsRefStr, Display};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::{Backend, BackendContext, Platform, Progress};
use crate::error::{ErrorKind, Result, VidQueueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum Phase {
    Idle,
    FetchingInfo,
    FetchingThumbnail,
    Downloading,
    Done,
    Failed,
}

/// Presentation hooks of a single download. All calls happen on the
/// controller, in order.
pub trait DownloadObserver {
    fn on_phase(&mut self, _phase: Phase) {}
    fn on_info_ready(&mut self, _backend: &dyn Backend) {}
    fn on_thumbnail_ready(&mut self, _file_name: Option<&str>) {}
    fn on_progress(&mut self, _progress: Progress) {}
    fn on_error(&mut self, _kind: ErrorKind, _error: &VidQueueError) {}
}

impl DownloadObserver for () {}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Deadline of the info phase.
    pub info_timeout: Duration,
    /// Added to `info_timeout` for the thumbnail phase.
    pub thumbnail_timeout_margin: Duration,
    pub high_quality_thumbnails: bool,
    pub thumbnails_dir: PathBuf,
    /// Output file stem template, see [`crate::media::Media::download`].
    pub output_template: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            info_timeout: Duration::from_millis(16_000),
            thumbnail_timeout_margin: Duration::from_millis(7_000),
            high_quality_thumbnails: false,
            thumbnails_dir: PathBuf::from("thumbnails"),
            output_template: "{title}".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub platform: Platform,
    /// Engine selector of the chosen format; `None` downloads the default best format.
    pub selector: Option<String>,
    pub target_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub title: String,
    pub thumbnail: Option<String>,
}

#[derive(Debug)]
pub enum Outcome {
    Done(Downloaded),
    Failed(VidQueueError),
    Cancelled,
}

/// Run `work` in its own task until it finishes, `deadline` passes or
/// `cancel` fires.
async fn run_unit<T, F>(
    what: &'static str,
    deadline: Instant,
    cancel: &CancellationToken,
    work: F,
) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let mut worker = tokio::spawn(work);
    tokio::select! {
        joined = &mut worker => joined.map_err(|e| VidQueueError::WorkerFailed(e.to_string()))?,
        _ = tokio::time::sleep_until(deadline) => {
            worker.abort();
            tracing::warn!(what, "deadline reached, abandoning worker");
            Err(VidQueueError::Timeout(what.to_string()))
        }
        _ = cancel.cancelled() => {
            worker.abort();
            Err(VidQueueError::Cancelled)
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOrchestrator {
    ctx: BackendContext,
    settings: OrchestratorSettings,
}

impl DownloadOrchestrator {
    pub fn new(ctx: BackendContext, settings: OrchestratorSettings) -> Self {
        Self { ctx, settings }
    }

    pub fn context(&self) -> &BackendContext {
        &self.ctx
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Info phase: open the platform backend within `info_timeout`.
    pub async fn fetch_info(
        &self,
        platform: Platform,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn Backend>> {
        let deadline = Instant::now() + self.settings.info_timeout;
        let ctx = self.ctx.clone();
        let url = url.to_string();
        run_unit("fetching info", deadline, cancel, async move {
            platform.open(&url, &ctx).await
        })
        .await
    }

    /// Thumbnail phase: fetch into `thumbnails_dir` within `info_timeout + margin`.
    pub async fn fetch_thumbnail(
        &self,
        backend: Arc<dyn Backend>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let deadline = Instant::now()
            + self.settings.info_timeout
            + self.settings.thumbnail_timeout_margin;
        let dir = self.settings.thumbnails_dir.clone();
        let high_quality = self.settings.high_quality_thumbnails;
        run_unit("fetching thumbnail", deadline, cancel, async move {
            backend.download_thumbnail(&dir, high_quality).await
        })
        .await
    }

    /// Download phase. No deadline; only `cancel` ends it early.
    async fn fetch_media(
        &self,
        backend: Arc<dyn Backend>,
        request: &DownloadRequest,
        observer: &mut dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
        let dir = request.target_dir.clone();
        let template = self.settings.output_template.clone();
        let selector = request.selector.clone();

        let mut worker = tokio::spawn(async move {
            let sink = move |p: Progress| {
                let _ = tx.send(p);
            };
            backend
                .download(&sink, &dir, &template, selector.as_deref())
                .await
        });

        loop {
            tokio::select! {
                Some(p) = rx.recv() => observer.on_progress(p),
                joined = &mut worker => {
                    while let Ok(p) = rx.try_recv() {
                        observer.on_progress(p);
                    }
                    return joined.map_err(|e| VidQueueError::WorkerFailed(e.to_string()))?;
                }
                _ = cancel.cancelled() => {
                    worker.abort();
                    return Err(VidQueueError::Cancelled);
                }
            }
        }
    }

    async fn drive(
        &self,
        request: &DownloadRequest,
        observer: &mut dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Result<Downloaded> {
        observer.on_phase(Phase::FetchingInfo);
        let backend = self
            .fetch_info(request.platform, &request.url, cancel)
            .await?;
        observer.on_info_ready(backend.as_ref());
        self.drive_opened(backend, request, observer, cancel).await
    }

    async fn drive_opened(
        &self,
        backend: Arc<dyn Backend>,
        request: &DownloadRequest,
        observer: &mut dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Result<Downloaded> {
        observer.on_phase(Phase::FetchingThumbnail);
        let thumbnail = self.fetch_thumbnail(backend.clone(), cancel).await?;
        observer.on_thumbnail_ready(thumbnail.as_deref());

        observer.on_phase(Phase::Downloading);
        let title = backend.title().to_string();
        let path = self.fetch_media(backend, request, observer, cancel).await?;
        Ok(Downloaded {
            path,
            title,
            thumbnail,
        })
    }

    fn conclude(
        &self,
        request: &DownloadRequest,
        result: Result<Downloaded>,
        observer: &mut dyn DownloadObserver,
    ) -> Outcome {
        match result {
            Ok(done) => {
                observer.on_phase(Phase::Done);
                Outcome::Done(done)
            }
            Err(VidQueueError::Cancelled) => {
                tracing::info!(url = %request.url, "download cancelled");
                observer.on_phase(Phase::Idle);
                Outcome::Cancelled
            }
            Err(e) => {
                let kind = e.kind();
                if kind == ErrorKind::OtherFailure {
                    tracing::error!(url = %request.url, code = e.diagnostic_code(), "download failed: {e}");
                } else {
                    tracing::warn!(url = %request.url, %kind, "download failed: {e}");
                }
                observer.on_phase(Phase::Failed);
                observer.on_error(kind, &e);
                Outcome::Failed(e)
            }
        }
    }

    /// Run one download to a terminal outcome. Errors never escape: they
    /// are reported through `observer` and returned in the outcome.
    pub async fn run(
        &self,
        request: &DownloadRequest,
        observer: &mut dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Outcome {
        let result = self.drive(request, observer, cancel).await;
        self.conclude(request, result, observer)
    }

    /// Like [`DownloadOrchestrator::run`], for a backend the caller already
    /// opened with [`DownloadOrchestrator::fetch_info`].
    pub async fn run_opened(
        &self,
        backend: Arc<dyn Backend>,
        request: &DownloadRequest,
        observer: &mut dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Outcome {
        let result = self.drive_opened(backend, request, observer, cancel).await;
        self.conclude(request, result, observer)
    }
}
