pub mod config;
pub mod core;
mod download;
pub mod engine;
pub mod error;
pub mod format;
pub mod media;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod resolver;
pub mod store;
#[cfg(feature = "twitter")]
pub mod twitter;
pub mod utils;
#[cfg(feature = "youtube")]
pub mod youtube;

#[cfg(test)]
mod fakes;

pub use config::Config;
pub use crate::core::{Backend, BackendContext, DownloadStatus, Platform, Progress};
pub use engine::{ExtractionEngine, YtDlpEngine};
pub use error::{ErrorKind, Result, VidQueueError};
pub use orchestrator::{DownloadObserver, DownloadOrchestrator, DownloadRequest, Outcome, Phase};
pub use queue::{QueueObserver, QueueOrchestrator, QueueSummary};
pub use store::{JsonStore, MemoryStore, QueueItem, QueueStore, SettingsStore};

/// The named platform, or the first platform whose domain matches `url`.
pub fn pick_platform(url: &str, platform: Option<&str>) -> Result<Platform> {
    match platform {
        Some(name) => name
            .parse::<Platform>()
            .map_err(|_| VidQueueError::UnknownPlatform(name.to_string())),
        None => Platform::detect(url).ok_or_else(|| {
            VidQueueError::IncorrectLink(format!("No platform found for: {}", url))
        }),
    }
}
