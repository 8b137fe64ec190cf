use crate::core::{Backend, BackendContext, Platform};
use crate::error::Result;
use crate::format::RawFormat;
use crate::media::Media;
use crate::resolver::{ResolvedFormats, resolve_direct};
use crate::utils::{is_domain_of, url_domain};

/// Check if URL points at Twitter / X
pub fn is_twitter_url(url: &str) -> bool {
    url_domain(url).is_some_and(|d| {
        ["twitter.com", "x.com", "t.co"]
            .iter()
            .any(|base| is_domain_of(&d, base))
    })
}

fn resolve_progressive(formats: &[RawFormat], _allowed: &[String]) -> ResolvedFormats {
    resolve_direct(formats)
}

/// Twitter serves progressive files with audio; only the plain http
/// variants are offered, one per height.
#[derive(Debug)]
pub struct TwitterBackend {
    media: Media,
}

impl TwitterBackend {
    pub async fn open(url: &str, ctx: &BackendContext) -> Result<Self> {
        let media = Media::fetch(Platform::Twitter, url, ctx, resolve_progressive).await?;
        Ok(Self { media })
    }
}

#[async_trait::async_trait]
impl Backend for TwitterBackend {
    fn media(&self) -> &Media {
        &self.media
    }
}
