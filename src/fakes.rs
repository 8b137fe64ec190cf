//! Scripted extraction engine for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::engine::{
    EngineError, EngineProgress, EngineStatus, ExtractionEngine, MediaInfo, ProgressHook,
    StreamRequest,
};
use crate::format::RawFormat;

#[derive(Default)]
pub struct ScriptedEngine {
    infos: HashMap<String, Result<MediaInfo, EngineError>>,
    events: Vec<EngineProgress>,
    download_error: Option<EngineError>,
    info_delay: Duration,
    event_delay: Duration,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_info(mut self, url: &str, info: MediaInfo) -> Self {
        self.infos.insert(url.to_string(), Ok(info));
        self
    }

    pub fn with_info_error(mut self, url: &str, error: EngineError) -> Self {
        self.infos.insert(url.to_string(), Err(error));
        self
    }

    pub fn with_events(mut self, events: Vec<EngineProgress>) -> Self {
        self.events = events;
        self
    }

    pub fn with_download_error(mut self, error: EngineError) -> Self {
        self.download_error = Some(error);
        self
    }

    pub fn with_info_delay(mut self, delay: Duration) -> Self {
        self.info_delay = delay;
        self
    }

    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn extract_info(&self, url: &str) -> Result<MediaInfo, EngineError> {
        if !self.info_delay.is_zero() {
            tokio::time::sleep(self.info_delay).await;
        }
        self.infos
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(EngineError::NotThisPlatform(format!("Unsupported URL: {url}"))))
    }

    async fn stream_download(
        &self,
        request: &StreamRequest,
        hook: ProgressHook<'_>,
    ) -> Result<(), EngineError> {
        self.requests.lock().unwrap().push(request.clone());
        for event in &self.events {
            if !self.event_delay.is_zero() {
                tokio::time::sleep(self.event_delay).await;
            }
            hook(event.clone());
        }
        if let Some(e) = &self.download_error {
            return Err(e.clone());
        }
        tokio::fs::write(request.output_path(), b"")
            .await
            .map_err(|e| EngineError::Failed(e.to_string()))
    }
}

pub fn progress_event(status: EngineStatus, downloaded: u64, total: Option<u64>) -> EngineProgress {
    EngineProgress {
        status,
        downloaded_bytes: Some(downloaded),
        total_bytes: total,
        total_bytes_estimate: None,
    }
}

fn raw(id: &str, ext: &str, vcodec: &str, acodec: &str, height: Option<f64>, size: u64) -> RawFormat {
    RawFormat {
        format_id: id.to_string(),
        protocol: "https".to_string(),
        ext: ext.to_string(),
        vcodec: Some(vcodec.to_string()),
        acodec: Some(acodec.to_string()),
        height,
        fps: height.map(|_| 30.0),
        filesize: Some(size),
        ..Default::default()
    }
}

/// A 1080p30 webm video-only stream, a 1080p30 mp4 progressive stream and
/// a 128kbps audio stream.
pub fn scenario_a_info() -> MediaInfo {
    let mut audio = raw("140", "m4a", "none", "mp4a", None, 50);
    audio.abr = Some(128.0);
    MediaInfo {
        extractor: "youtube".to_string(),
        id: "abcdefghijk".to_string(),
        title: Some("Scenario A".to_string()),
        formats: Some(vec![
            raw("137", "webm", "vp9", "none", Some(1080.0), 500),
            raw("22", "mp4", "avc1", "aac", Some(1080.0), 900),
            audio,
        ]),
        ..Default::default()
    }
}

pub fn twitter_info() -> MediaInfo {
    let mut hls = raw("hls-832", "mp4", "avc1", "mp4a", Some(480.0), 10);
    hls.protocol = "m3u8_native".to_string();
    MediaInfo {
        extractor: "twitter".to_string(),
        id: "1234567890".to_string(),
        title: Some("A tweet".to_string()),
        uploader: Some("someone".to_string()),
        formats: Some(vec![
            hls,
            raw("http-256", "mp4", "avc1", "mp4a", Some(240.0), 20),
            raw("http-832", "mp4", "avc1", "mp4a", Some(480.0), 40),
            raw("http-2176", "mp4", "avc1", "mp4a", Some(720.0), 80),
        ]),
        ..Default::default()
    }
}
