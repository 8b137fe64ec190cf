use crate::utils::{is_domain_of, url_domain};

/// Check if URL is a YouTube link using strict domain validation
pub fn is_youtube_url(url: &str) -> bool {
    url_domain(url).is_some_and(|d| {
        ["youtube.com", "youtu.be", "youtube-nocookie.com"]
            .iter()
            .any(|base| is_domain_of(&d, base))
    })
}
