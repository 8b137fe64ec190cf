use serde::{Deserialize, Serialize};

/// Codec id the engine uses for a missing stream.
pub const NO_CODEC: &str = "none";

/// Label of the single audio-only entry of a resolved set.
pub const AUDIO_ONLY_LABEL: &str = "Only audio";

/// One encoding variant as reported by the extraction engine.
///
/// Every field is optional on the wire: unknown sizes are common, and
/// the engine omits codecs it could not identify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
    /// Average audio bitrate, kbps.
    #[serde(default)]
    pub abr: Option<f64>,
}

fn is_none_codec(codec: &Option<String>) -> bool {
    codec.as_deref() == Some(NO_CODEC)
}

/// Whole-number view of an engine number; fractional or missing values are `None`.
pub fn whole(value: Option<f64>) -> Option<u64> {
    value.filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0).map(|v| v as u64)
}

fn render_number(value: f64) -> String {
    match whole(Some(value)) {
        Some(n) => n.to_string(),
        None => value.to_string(),
    }
}

impl RawFormat {
    /// The stream carries video only.
    pub fn is_video_only(&self) -> bool {
        is_none_codec(&self.acodec)
    }

    /// The stream carries audio only.
    pub fn is_audio_only(&self) -> bool {
        is_none_codec(&self.vcodec)
    }

    /// The stream carries both audio and video.
    pub fn is_audio_video(&self) -> bool {
        !self.is_video_only() && !self.is_audio_only()
    }

    /// Neither stream is present (storyboards and similar).
    pub fn is_empty(&self) -> bool {
        self.is_video_only() && self.is_audio_only()
    }

    /// Byte size, exact when known, approximate otherwise.
    pub fn size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }

    /// `"{height}p {fps}fps"`, or `"{height}p"` without a frame rate.
    /// A missing height renders as `0`.
    pub fn label(&self) -> String {
        let height = self.height_label();
        match self.fps {
            Some(fps) => format!("{height} {}fps", render_number(fps)),
            None => height,
        }
    }

    /// `"{height}p"` regardless of frame rate.
    pub fn height_label(&self) -> String {
        let height = self.height.map(render_number).unwrap_or_else(|| "0".to_string());
        format!("{height}p")
    }

    /// Sort key: (height, fps), non-integer or missing values count as 0.
    pub fn sort_key(&self) -> (u64, u64) {
        (whole(self.height).unwrap_or(0), whole(self.fps).unwrap_or(0))
    }
}

/// What the engine is asked to fetch for a resolved format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    Single(String),
    /// Video stream merged with an audio stream at download time.
    Merged { video: String, audio: String },
}

impl Selector {
    /// Engine selector string: `"id"` or `"videoId+audioId"`.
    pub fn as_engine_string(&self) -> String {
        match self {
            Selector::Single(id) => id.clone(),
            Selector::Merged { video, audio } => format!("{video}+{audio}"),
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, Selector::Merged { .. })
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_engine_string())
    }
}

/// A selectable format: a raw format annotated with its label, its
/// selector and the total bytes the user will receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFormat {
    pub label: String,
    pub selector: Selector,
    pub format: RawFormat,
    pub total_bytes: Option<u64>,
}

impl ResolvedFormat {
    pub fn is_audio_only(&self) -> bool {
        self.format.is_audio_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(vcodec: &str, acodec: &str) -> RawFormat {
        RawFormat {
            vcodec: Some(vcodec.to_string()),
            acodec: Some(acodec.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_stream_predicates() {
        let av = fmt("avc1", "mp4a");
        assert!(av.is_audio_video() && !av.is_audio_only() && !av.is_video_only());

        let v = fmt("vp9", "none");
        assert!(v.is_video_only() && !v.is_audio_video());

        let a = fmt("none", "opus");
        assert!(a.is_audio_only() && !a.is_audio_video());

        assert!(fmt("none", "none").is_empty());
    }

    #[test]
    fn test_missing_codecs_count_as_present() {
        let implicit = RawFormat::default();
        assert!(implicit.is_audio_video());
    }

    #[test]
    fn test_labels() {
        let mut f = fmt("avc1", "none");
        f.height = Some(1080.0);
        f.fps = Some(30.0);
        assert_eq!(f.label(), "1080p 30fps");

        f.fps = None;
        assert_eq!(f.label(), "1080p");

        f.fps = Some(29.97);
        assert_eq!(f.label(), "1080p 29.97fps");
        assert_eq!(f.sort_key(), (1080, 0));
        assert_eq!(f.height_label(), "1080p");
    }

    #[test]
    fn test_size_prefers_exact() {
        let f = RawFormat {
            filesize: Some(10),
            filesize_approx: Some(12),
            ..Default::default()
        };
        assert_eq!(f.size(), Some(10));
        let approx = RawFormat {
            filesize_approx: Some(12),
            ..Default::default()
        };
        assert_eq!(approx.size(), Some(12));
    }

    #[test]
    fn test_selector_strings() {
        assert_eq!(Selector::Single("22".into()).as_engine_string(), "22");
        let merged = Selector::Merged {
            video: "137".into(),
            audio: "140".into(),
        };
        assert_eq!(merged.to_string(), "137+140");
        assert!(merged.is_merged());
    }

    #[test]
    fn test_deserialize_engine_json() {
        let json = r#"{"format_id":"137","ext":"mp4","vcodec":"avc1.640028","acodec":"none",
            "height":1080,"fps":30,"filesize":null,"protocol":"https","tbr":4400.1}"#;
        let f: RawFormat = serde_json::from_str(json).unwrap();
        assert_eq!(f.label(), "1080p 30fps");
        assert_eq!(f.size(), None);
        assert!(f.is_video_only());
    }
}
