use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, VidQueueError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

/// Initialize HTTP client with default configuration
fn get_http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(DEFAULT_TIMEOUT)
        .default_headers(get_default_headers())
        .build()?)
}

fn get_default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers
}

/// GET `url`, failing on non-success status codes.
pub async fn get_response(url: &str) -> Result<reqwest::Response> {
    let client = get_http_client()?;
    let response = client.get(url).send().await?;

    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(VidQueueError::HttpError {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

/// Stream the body of `url` into `path`, returning the number of bytes written.
///
/// A partially written file is left in place when the transfer fails.
pub async fn download_to_file(url: &str, path: &Path) -> Result<u64> {
    let response = get_response(url).await?;
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    tracing::debug!(url, path = %path.display(), written, "downloaded file");
    Ok(written)
}
