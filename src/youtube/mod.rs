use crate::core::{Backend, BackendContext, Platform};
use crate::error::Result;
use crate::media::Media;
use crate::resolver::resolve;

pub mod utils;

pub use utils::is_youtube_url;

/// YouTube serves separate audio and video streams; video-only formats are
/// merged with the best audio stream at download time.
#[derive(Debug)]
pub struct YoutubeBackend {
    media: Media,
}

impl YoutubeBackend {
    pub async fn open(url: &str, ctx: &BackendContext) -> Result<Self> {
        let media = Media::fetch(Platform::YouTube, url, ctx, resolve::<String>).await?;
        Ok(Self { media })
    }
}

#[async_trait::async_trait]
impl Backend for YoutubeBackend {
    fn media(&self) -> &Media {
        &self.media
    }
}
