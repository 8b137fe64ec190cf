use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;

use crate::core::Platform;
use crate::error::{ErrorKind, Result, VidQueueError};
use crate::orchestrator::{DownloadObserver, DownloadOrchestrator, DownloadRequest, Downloaded, Outcome};
use crate::store::QueueItem;

/// An item set aside during a run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub item: QueueItem,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
pub enum ItemResult<'a> {
    Downloaded(&'a Downloaded),
    Problem(&'a Problem),
}

#[derive(Debug, Clone)]
pub struct QueueSummary {
    pub success_count: usize,
    pub problems: Vec<Problem>,
    /// Items never attempted, plus the interrupted one, in queue order.
    pub remaining: Vec<QueueItem>,
    /// The run ended on a stop request rather than an empty queue.
    pub stopped: bool,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

pub trait QueueObserver: DownloadObserver {
    fn on_item_advanced(&mut self, _item: &QueueItem, _result: ItemResult<'_>) {}
    fn on_queue_finished(&mut self, _summary: &QueueSummary) {}
}

impl QueueObserver for () {}

/// Runs queued items one at a time. Failures go to the problem list and
/// never stop the run; only `cancel` does.
#[derive(Debug, Clone)]
pub struct QueueOrchestrator {
    downloads: DownloadOrchestrator,
}

fn request_for(item: &QueueItem, target_dir: &Path) -> Result<DownloadRequest> {
    let platform = Platform::from_str(&item.platform)
        .map_err(|_| VidQueueError::UnknownPlatform(item.platform.clone()))?;
    Ok(DownloadRequest {
        url: item.url.clone(),
        platform,
        selector: item.format_selector.clone(),
        target_dir: PathBuf::from(target_dir),
    })
}

impl QueueOrchestrator {
    pub fn new(downloads: DownloadOrchestrator) -> Self {
        Self { downloads }
    }

    pub fn downloads(&self) -> &DownloadOrchestrator {
        &self.downloads
    }

    pub async fn run<O: QueueObserver>(
        &self,
        items: impl IntoIterator<Item = QueueItem>,
        target_dir: &Path,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> QueueSummary {
        let started_at = Local::now();
        let mut queue: VecDeque<QueueItem> = items.into_iter().collect();
        let mut success_count = 0;
        let mut problems = Vec::new();
        let mut stopped = false;
        tracing::info!(items = queue.len(), dir = %target_dir.display(), "queue run started");

        while let Some(item) = queue.pop_front() {
            if cancel.is_cancelled() {
                queue.push_front(item);
                stopped = true;
                break;
            }

            let outcome = match request_for(&item, target_dir) {
                Ok(request) => self.downloads.run(&request, &mut *observer, cancel).await,
                Err(e) => {
                    observer.on_error(e.kind(), &e);
                    Outcome::Failed(e)
                }
            };

            match outcome {
                Outcome::Done(done) => {
                    success_count += 1;
                    observer.on_item_advanced(&item, ItemResult::Downloaded(&done));
                }
                Outcome::Failed(e) => {
                    let problem = Problem {
                        kind: e.kind(),
                        message: e.user_message(),
                        item,
                    };
                    observer.on_item_advanced(&problem.item, ItemResult::Problem(&problem));
                    problems.push(problem);
                }
                Outcome::Cancelled => {
                    queue.push_front(item);
                    stopped = true;
                    break;
                }
            }
        }

        let summary = QueueSummary {
            success_count,
            problems,
            remaining: queue.into_iter().collect(),
            stopped,
            started_at,
            finished_at: Local::now(),
        };
        tracing::info!(
            succeeded = summary.success_count,
            problems = summary.problems.len(),
            stopped = summary.stopped,
            "queue run finished"
        );
        observer.on_queue_finished(&summary);
        summary
    }
}
