//! Turns the engine's raw format list into the labelled, user-selectable set.

use std::collections::HashMap;

use tracing::warn;

use crate::format::{AUDIO_ONLY_LABEL, RawFormat, ResolvedFormat, Selector};

/// Ordered result of a resolution.
///
/// Entries keep insertion order: audio+video, then video-only, then the
/// audio-only entry. Labels are unique inside each bucket. An audio+video
/// and a video-only entry can still share a label; both are kept and the
/// label is reported by [`ResolvedFormats::collisions`]. Label lookups
/// return the earlier entry, selector lookups are always exact.
#[derive(Debug, Clone, Default)]
pub struct ResolvedFormats {
    entries: Vec<ResolvedFormat>,
    collisions: Vec<String>,
}

impl ResolvedFormats {
    fn push(&mut self, entry: ResolvedFormat) {
        if self.entries.iter().any(|e| e.label == entry.label) {
            warn!(label = %entry.label, "format label shared by two streams, keeping both");
            if !self.collisions.contains(&entry.label) {
                self.collisions.push(entry.label.clone());
            }
        }
        self.entries.push(entry);
    }

    /// Insert or replace by label, keeping the first position.
    fn upsert(&mut self, entry: ResolvedFormat) {
        match self.entries.iter_mut().find(|e| e.label == entry.label) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedFormat> {
        self.entries.iter()
    }

    pub fn get(&self, label: &str) -> Option<&ResolvedFormat> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn by_selector(&self, selector: &str) -> Option<&ResolvedFormat> {
        self.entries
            .iter()
            .find(|e| e.selector.as_engine_string() == selector)
    }

    /// Distinct labels in insertion order.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::with_capacity(self.entries.len());
        for e in &self.entries {
            if !labels.contains(&e.label) {
                labels.push(e.label.clone());
            }
        }
        labels
    }

    /// Labels carried by more than one entry.
    pub fn collisions(&self) -> &[String] {
        &self.collisions
    }

    pub fn audio(&self) -> Option<&ResolvedFormat> {
        self.entries.iter().find(|e| e.label == AUDIO_ONLY_LABEL)
    }
}

/// Keep allowed extensions only and one entry per label: the one whose
/// extension sits latest in `allowed`. Equal extensions: the later entry wins.
fn prefer_extensions<'a, S: AsRef<str>>(
    formats: &[&'a RawFormat],
    allowed: &[S],
) -> Vec<&'a RawFormat> {
    let rank = |ext: &str| allowed.iter().position(|a| a.as_ref() == ext);

    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, (usize, &'a RawFormat)> = HashMap::new();

    for &f in formats {
        let Some(r) = rank(&f.ext) else {
            continue;
        };
        let label = f.label();
        match best.get(&label).map(|(current, _)| *current) {
            Some(current) if current > r => {}
            Some(_) => {
                best.insert(label, (r, f));
            }
            None => {
                order.push(label.clone());
                best.insert(label, (r, f));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|label| best.remove(&label).map(|(_, f)| f))
        .collect()
}

/// Audio-only entry with the highest average bitrate; the first wins ties.
fn best_audio<'a>(formats: &[&'a RawFormat]) -> Option<&'a RawFormat> {
    formats.iter().copied().fold(None, |best: Option<&RawFormat>, f| match best {
        Some(b) if b.abr.unwrap_or(0.0) >= f.abr.unwrap_or(0.0) => Some(b),
        _ => Some(f),
    })
}

/// Resolve formats for platforms serving separate audio and video streams.
///
/// Video-only entries are merged with the best audio stream at download
/// time, and their total size includes that stream.
pub fn resolve<S: AsRef<str>>(formats: &[RawFormat], allowed: &[S]) -> ResolvedFormats {
    let mut audio_video = Vec::new();
    let mut video_only = Vec::new();
    let mut audio_only = Vec::new();

    for f in formats {
        if f.is_empty() {
            continue;
        }
        if f.is_audio_only() {
            audio_only.push(f);
        } else if f.is_video_only() {
            video_only.push(f);
        } else {
            audio_video.push(f);
        }
    }

    let audio = best_audio(&audio_only);
    let mut resolved = ResolvedFormats::default();

    for f in prefer_extensions(&audio_video, allowed) {
        resolved.push(ResolvedFormat {
            label: f.label(),
            selector: Selector::Single(f.format_id.clone()),
            format: f.clone(),
            total_bytes: f.size(),
        });
    }

    for f in prefer_extensions(&video_only, allowed) {
        let (selector, total_bytes) = match audio {
            Some(a) => (
                Selector::Merged {
                    video: f.format_id.clone(),
                    audio: a.format_id.clone(),
                },
                f.size().zip(a.size()).map(|(v, a)| v + a),
            ),
            None => (Selector::Single(f.format_id.clone()), f.size()),
        };
        resolved.push(ResolvedFormat {
            label: f.label(),
            selector,
            format: f.clone(),
            total_bytes,
        });
    }

    if let Some(a) = audio {
        resolved.push(ResolvedFormat {
            label: AUDIO_ONLY_LABEL.to_string(),
            selector: Selector::Single(a.format_id.clone()),
            format: a.clone(),
            total_bytes: a.size(),
        });
    }

    resolved
}

/// Resolve formats for platforms serving progressive files over plain http:
/// one entry per `"{height}p"`, no merging, later entries replace earlier ones.
pub fn resolve_direct(formats: &[RawFormat]) -> ResolvedFormats {
    let mut resolved = ResolvedFormats::default();
    for f in formats.iter().filter(|f| f.protocol.starts_with("http")) {
        resolved.upsert(ResolvedFormat {
            label: f.height_label(),
            selector: Selector::Single(f.format_id.clone()),
            format: f.clone(),
            total_bytes: f.size(),
        });
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALLOWED: [&str; 3] = ["mp4", "webm", "mp3"];

    fn video(id: &str, h: f64, fps: f64, ext: &str, acodec: &str, size: Option<u64>) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            protocol: "https".to_string(),
            ext: ext.to_string(),
            vcodec: Some("avc1".to_string()),
            acodec: Some(acodec.to_string()),
            height: Some(h),
            fps: Some(fps),
            filesize: size,
            ..Default::default()
        }
    }

    fn audio(id: &str, abr: f64, size: Option<u64>) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            protocol: "https".to_string(),
            ext: "m4a".to_string(),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a".to_string()),
            abr: Some(abr),
            filesize: size,
            ..Default::default()
        }
    }

    #[test]
    fn test_scenario_separate_buckets() {
        let formats = vec![
            RawFormat {
                vcodec: Some("vp9".into()),
                ..video("248", 1080.0, 30.0, "webm", "none", Some(500))
            },
            video("22", 1080.0, 30.0, "mp4", "aac", Some(900)),
            audio("140", 128.0, Some(50)),
        ];
        let resolved = resolve(&formats, &["webm", "mp4"]);

        assert_eq!(resolved.len(), 3);
        let entries: Vec<_> = resolved.iter().collect();

        assert_eq!(entries[0].label, "1080p 30fps");
        assert_eq!(entries[0].format.ext, "mp4");
        assert_eq!(entries[0].total_bytes, Some(900));
        assert_eq!(entries[0].selector, Selector::Single("22".into()));

        assert_eq!(entries[1].label, "1080p 30fps");
        assert_eq!(entries[1].total_bytes, Some(550));
        assert_eq!(entries[1].selector.to_string(), "248+140");

        assert_eq!(entries[2].label, AUDIO_ONLY_LABEL);
        assert_eq!(entries[2].total_bytes, Some(50));

        assert_eq!(resolved.collisions(), ["1080p 30fps".to_string()]);
        assert_eq!(resolved.get("1080p 30fps").map(|e| e.total_bytes), Some(Some(900)));
        assert_eq!(
            resolved.by_selector("248+140").map(|e| e.total_bytes),
            Some(Some(550))
        );
        assert_eq!(resolved.labels(), vec!["1080p 30fps", AUDIO_ONLY_LABEL]);
    }

    #[test]
    fn test_extension_preference_inside_bucket() {
        let formats = vec![
            video("1", 720.0, 30.0, "mp4", "none", Some(10)),
            video("2", 720.0, 30.0, "webm", "none", Some(20)),
            video("3", 480.0, 30.0, "flv", "none", Some(5)),
        ];
        let resolved = resolve(&formats, &ALLOWED);

        assert_eq!(resolved.len(), 1);
        let only = resolved.get("720p 30fps").unwrap();
        assert_eq!(only.format.format_id, "2");
        assert!(resolved.collisions().is_empty());
    }

    #[test]
    fn test_same_extension_later_entry_wins() {
        let formats = vec![
            video("1", 720.0, 30.0, "mp4", "none", Some(10)),
            video("2", 720.0, 30.0, "mp4", "none", Some(11)),
        ];
        let resolved = resolve(&formats, &ALLOWED);
        assert_eq!(resolved.get("720p 30fps").unwrap().format.format_id, "2");
    }

    #[test]
    fn test_labels_unique_per_bucket() {
        let formats = vec![
            video("1", 720.0, 30.0, "mp4", "none", Some(1)),
            video("2", 720.0, 30.0, "webm", "none", Some(2)),
            video("3", 720.0, 60.0, "mp4", "none", Some(3)),
            video("4", 1080.0, 30.0, "mp4", "aac", Some(4)),
            video("5", 1080.0, 30.0, "webm", "aac", Some(5)),
            audio("a", 50.0, Some(1)),
        ];
        let resolved = resolve(&formats, &ALLOWED);
        let labels: Vec<_> = resolved.iter().map(|e| e.label.clone()).collect();
        let mut dedup = labels.clone();
        dedup.dedup();
        assert_eq!(labels, dedup);
        assert_eq!(resolved.len(), 4);
    }

    #[test]
    fn test_best_audio_by_bitrate() {
        let formats = vec![
            audio("low", 48.0, Some(5)),
            audio("high", 160.0, Some(20)),
            audio("mid", 128.0, Some(15)),
            video("v", 360.0, 25.0, "mp4", "none", Some(100)),
        ];
        let resolved = resolve(&formats, &ALLOWED);
        let a = resolved.audio().unwrap();
        assert_eq!(a.format.format_id, "high");
        let v = resolved.get("360p 25fps").unwrap();
        assert_eq!(v.total_bytes, Some(120));
        assert_eq!(v.selector.to_string(), "v+high");
    }

    #[test]
    fn test_unknown_size_propagates() {
        let formats = vec![
            audio("a", 128.0, None),
            video("v", 720.0, 30.0, "mp4", "none", Some(100)),
            video("w", 480.0, 30.0, "mp4", "none", None),
        ];
        let resolved = resolve(&formats, &ALLOWED);
        assert_eq!(resolved.get("720p 30fps").unwrap().total_bytes, None);
        assert_eq!(resolved.get("480p 30fps").unwrap().total_bytes, None);
    }

    #[test]
    fn test_video_only_without_audio_keeps_own_size() {
        let formats = vec![video("v", 720.0, 30.0, "mp4", "none", Some(100))];
        let resolved = resolve(&formats, &ALLOWED);
        let v = resolved.get("720p 30fps").unwrap();
        assert_eq!(v.total_bytes, Some(100));
        assert_eq!(v.selector, Selector::Single("v".into()));
        assert!(resolved.audio().is_none());
    }

    #[test]
    fn test_storyboards_are_ignored() {
        let storyboard = RawFormat {
            format_id: "sb0".into(),
            ext: "mhtml".into(),
            vcodec: Some("none".into()),
            acodec: Some("none".into()),
            ..Default::default()
        };
        let resolved = resolve(&[storyboard], &ALLOWED);
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let resolved = resolve::<&str>(&[], &[]);
        assert!(resolved.is_empty());
        assert!(resolved.labels().is_empty());
    }

    #[test]
    fn test_direct_resolution() {
        let mut hls = video("hls-832", 480.0, 30.0, "mp4", "aac", None);
        hls.protocol = "m3u8_native".into();
        let formats = vec![
            video("http-256", 360.0, 30.0, "mp4", "aac", Some(10)),
            hls,
            video("http-832", 480.0, 30.0, "mp4", "aac", Some(20)),
            video("http-833", 480.0, 30.0, "mp4", "aac", Some(21)),
        ];
        let resolved = resolve_direct(&formats);
        let labels: Vec<_> = resolved.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["360p", "480p"]);
        assert_eq!(
            resolved.get("480p").unwrap().selector,
            Selector::Single("http-833".into())
        );
    }
}
