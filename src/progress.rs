use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::engine::{EngineProgress, EngineStatus};

/// Status of a download session as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Preparing,
    Downloading,
    Finished,
    Error,
}

/// One progress report. `total_bytes` is 0 when nothing is known about the size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub status: DownloadStatus,
}

impl Progress {
    pub fn error() -> Self {
        Self {
            total_bytes: 0,
            downloaded_bytes: 0,
            status: DownloadStatus::Error,
        }
    }

    /// Completed fraction in percent, when the total is known.
    pub fn percent(&self) -> Option<f64> {
        (self.total_bytes > 0)
            .then(|| (self.downloaded_bytes as f64 / self.total_bytes as f64 * 100.0).min(100.0))
    }
}

/// Turns raw engine events into caller-facing reports.
///
/// The engine restarts its byte counter for every stream of a merged
/// download. Whenever the raw counter drops, the value it dropped from is
/// added to a running offset, so reported `downloaded_bytes` never
/// decreases. Engine `finished` events only mark the end of one stream;
/// the single terminal report comes from [`ProgressTracker::finish`] or
/// [`ProgressTracker::fail`].
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    known_total: Option<u64>,
    total: u64,
    last_raw: u64,
    offset: u64,
    stopped: bool,
}

impl ProgressTracker {
    /// `known_total` is the resolved format's size; it wins over engine totals.
    pub fn new(known_total: Option<u64>) -> Self {
        Self {
            known_total,
            total: known_total.unwrap_or(0),
            ..Default::default()
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn observe(&mut self, event: &EngineProgress) -> Option<Progress> {
        if self.stopped {
            return None;
        }

        match event.status {
            EngineStatus::Downloading | EngineStatus::Finished => {}
            _ => return self.fail(),
        }

        if let Some(total) = self
            .known_total
            .or(event.total_bytes)
            .or(event.total_bytes_estimate)
        {
            self.total = total;
        }

        let raw = event.downloaded_bytes.unwrap_or(self.last_raw);
        if raw < self.last_raw {
            self.offset += self.last_raw;
        }
        self.last_raw = raw;

        match event.status {
            EngineStatus::Downloading => Some(Progress {
                total_bytes: self.total,
                downloaded_bytes: self.downloaded(),
                status: DownloadStatus::Downloading,
            }),
            _ => None,
        }
    }

    /// Terminal success report. `None` once the session has stopped.
    pub fn finish(&mut self) -> Option<Progress> {
        if self.stopped {
            return None;
        }
        self.stopped = true;
        Some(Progress {
            total_bytes: self.total,
            downloaded_bytes: self.downloaded(),
            status: DownloadStatus::Finished,
        })
    }

    /// Terminal error report, `(0, 0, error)`. `None` once the session has stopped.
    pub fn fail(&mut self) -> Option<Progress> {
        if self.stopped {
            return None;
        }
        self.stopped = true;
        Some(Progress::error())
    }

    fn downloaded(&self) -> u64 {
        self.last_raw + self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: EngineStatus, downloaded: u64, total: Option<u64>) -> EngineProgress {
        EngineProgress {
            status,
            downloaded_bytes: Some(downloaded),
            total_bytes: total,
            total_bytes_estimate: None,
        }
    }

    fn feed(tracker: &mut ProgressTracker, events: &[EngineProgress]) -> Vec<Progress> {
        let mut out: Vec<Progress> = events.iter().filter_map(|e| tracker.observe(e)).collect();
        out.extend(tracker.finish());
        out
    }

    #[test]
    fn test_restarted_counter_scenario() {
        let mut tracker = ProgressTracker::new(None);
        let out = feed(
            &mut tracker,
            &[
                event(EngineStatus::Downloading, 400, Some(1000)),
                event(EngineStatus::Downloading, 900, Some(1000)),
                event(EngineStatus::Downloading, 50, Some(1000)),
                event(EngineStatus::Finished, 200, Some(1000)),
            ],
        );
        let seen: Vec<_> = out
            .iter()
            .map(|p| (p.total_bytes, p.downloaded_bytes, p.status))
            .collect();
        assert_eq!(
            seen,
            vec![
                (1000, 400, DownloadStatus::Downloading),
                (1000, 900, DownloadStatus::Downloading),
                (1000, 950, DownloadStatus::Downloading),
                (1000, 1100, DownloadStatus::Finished),
            ]
        );
    }

    #[test]
    fn test_monotonic_over_several_resets() {
        let raw = [100, 300, 10, 250, 5, 5, 400, 0, 20];
        let mut tracker = ProgressTracker::new(Some(2000));
        let events: Vec<_> = raw
            .iter()
            .map(|b| event(EngineStatus::Downloading, *b, None))
            .collect();
        let out = feed(&mut tracker, &events);
        assert_eq!(out.len(), raw.len() + 1);
        assert!(out.windows(2).all(|w| w[0].downloaded_bytes <= w[1].downloaded_bytes));
        assert!(out.iter().all(|p| p.total_bytes == 2000));
        assert_eq!(out.last().unwrap().status, DownloadStatus::Finished);
    }

    #[test]
    fn test_total_fallback_order() {
        let mut tracker = ProgressTracker::new(None);
        let estimate_only = EngineProgress {
            status: EngineStatus::Downloading,
            downloaded_bytes: Some(1),
            total_bytes: None,
            total_bytes_estimate: Some(77),
        };
        assert_eq!(tracker.observe(&estimate_only).unwrap().total_bytes, 77);

        let both = EngineProgress {
            total_bytes: Some(80),
            ..estimate_only.clone()
        };
        assert_eq!(tracker.observe(&both).unwrap().total_bytes, 80);

        let mut known = ProgressTracker::new(Some(5));
        assert_eq!(known.observe(&both).unwrap().total_bytes, 5);
    }

    #[test]
    fn test_error_status_reported_once() {
        let mut tracker = ProgressTracker::new(Some(10));
        assert!(tracker.observe(&event(EngineStatus::Downloading, 3, None)).is_some());
        let err = tracker.observe(&event(EngineStatus::Error, 3, None));
        assert_eq!(err, Some(Progress::error()));
        assert!(tracker.observe(&event(EngineStatus::Downloading, 4, None)).is_none());
        assert!(tracker.finish().is_none());
        assert!(tracker.fail().is_none());
    }

    #[test]
    fn test_unknown_status_is_an_error() {
        let mut tracker = ProgressTracker::new(None);
        let out = tracker.observe(&event(EngineStatus::Other("paused".into()), 0, None));
        assert_eq!(out.map(|p| p.status), Some(DownloadStatus::Error));
    }

    #[test]
    fn test_missing_counter_keeps_last_value() {
        let mut tracker = ProgressTracker::new(Some(10));
        tracker.observe(&event(EngineStatus::Downloading, 6, None));
        let blank = EngineProgress {
            status: EngineStatus::Downloading,
            downloaded_bytes: None,
            total_bytes: None,
            total_bytes_estimate: None,
        };
        assert_eq!(tracker.observe(&blank).unwrap().downloaded_bytes, 6);
    }

    #[test]
    fn test_percent() {
        let p = Progress {
            total_bytes: 200,
            downloaded_bytes: 50,
            status: DownloadStatus::Downloading,
        };
        assert_eq!(p.percent(), Some(25.0));
        assert_eq!(Progress::error().percent(), None);
    }
}
