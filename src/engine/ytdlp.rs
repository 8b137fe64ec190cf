use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{EngineError, EngineProgress, EngineStatus, ExtractionEngine, MediaInfo, ProgressHook, StreamRequest};

/// Prefix of the machine-readable progress lines requested from yt-dlp.
const PROGRESS_PREFIX: &str = "vidqueue-progress";

/// `ERROR: [extractor] video-id: message`, extractor and id optional.
static ERROR_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^ERROR:\s*(?:\[[^\]]+\]\s*(?:[\w-]+:\s+)?)?(.+)$").ok());

/// Extraction engine backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: PathBuf,
    socket_timeout_secs: u64,
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new("yt-dlp", 30)
    }
}

impl YtDlpEngine {
    pub fn new(program: impl Into<PathBuf>, socket_timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            socket_timeout_secs,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--no-warnings")
            .arg("--no-playlist")
            .arg("--socket-timeout")
            .arg(self.socket_timeout_secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn download_args(request: &StreamRequest) -> Vec<String> {
        let mut args = vec![
            "--newline".to_string(),
            "--no-part".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{PROGRESS_PREFIX} %(progress.status)s %(progress.downloaded_bytes)s \
                 %(progress.total_bytes)s %(progress.total_bytes_estimate)s"
            ),
            "-f".to_string(),
            request.format.clone(),
            "-o".to_string(),
            format!("{}.%(ext)s", request.output_stem.to_string_lossy()),
        ];
        if request.merge {
            args.push("--merge-output-format".to_string());
            args.push(request.container.clone());
        }
        args.push("--recode-video".to_string());
        args.push(request.container.clone());
        args.push(request.url.clone());
        args
    }
}

/// Parse one `vidqueue-progress <status> <downloaded> <total> <estimate>` line.
/// yt-dlp prints `NA` for unknown fields.
pub fn parse_progress_line(line: &str) -> Option<EngineProgress> {
    let mut parts = line.split_whitespace();
    if parts.next()? != PROGRESS_PREFIX {
        return None;
    }
    let status = EngineStatus::from(parts.next()?);
    let mut number = || {
        parts
            .next()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    };
    let downloaded_bytes = number();
    let total_bytes = number();
    let total_bytes_estimate = number();
    Some(EngineProgress {
        status,
        downloaded_bytes,
        total_bytes,
        total_bytes_estimate,
    })
}

/// Map yt-dlp's stderr onto an engine error.
pub fn classify_stderr(stderr: &str) -> EngineError {
    let last_error = stderr
        .lines()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("unknown error")
        .trim();
    let last_error = ERROR_LINE
        .as_ref()
        .and_then(|re| re.captures(last_error))
        .and_then(|c| c.get(1))
        .map_or(last_error, |m| m.as_str())
        .to_string();

    let network_cause = ["Errno", "timed out", "getaddrinfo", "Connection"]
        .iter()
        .any(|c| stderr.contains(c));
    if stderr.contains("Unable to download API page")
        || (stderr.contains("Unable to download webpage") && network_cause)
    {
        EngineError::ApiUnreachable(last_error)
    } else if stderr.contains("Unsupported URL")
        || stderr.contains("is not a valid URL")
        || (stderr.contains("Incomplete") && stderr.contains("ID"))
    {
        EngineError::NotThisPlatform(last_error)
    } else {
        EngineError::Failed(last_error)
    }
}

/// Next line of `reader` with invalid UTF-8 replaced, `None` at EOF.
///
/// yt-dlp writes titles in the console encoding, so lines are not
/// guaranteed to be UTF-8; the pipe must still be drained to the end.
async fn next_lossy_line<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> Option<String> {
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => Some(
            String::from_utf8_lossy(buf)
                .trim_end_matches(['\r', '\n'])
                .to_string(),
        ),
        Err(e) => {
            tracing::debug!(target: "yt-dlp", "pipe read failed: {e}");
            None
        }
    }
}

async fn collect_stderr(pipe: Option<tokio::process::ChildStderr>) -> String {
    let Some(pipe) = pipe else {
        return String::new();
    };
    let mut out = String::new();
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    while let Some(line) = next_lossy_line(&mut reader, &mut buf).await {
        tracing::debug!(target: "yt-dlp", "{line}");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

#[async_trait]
impl ExtractionEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract_info(&self, url: &str) -> Result<MediaInfo, EngineError> {
        tracing::debug!(url, "yt-dlp: dumping info");
        let output = self
            .command()
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg(url)
            .output()
            .await
            .map_err(|e| EngineError::Launch(e.to_string()))?;

        if !output.status.success() {
            return Err(classify_stderr(&String::from_utf8_lossy(&output.stderr)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| EngineError::Failed(format!("invalid info json: {e}")))
    }

    async fn stream_download(
        &self,
        request: &StreamRequest,
        hook: ProgressHook<'_>,
    ) -> Result<(), EngineError> {
        let args = Self::download_args(request);
        tracing::debug!(?args, "yt-dlp: starting download");

        let mut child = self
            .command()
            .args(&args)
            .spawn()
            .map_err(|e| EngineError::Launch(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Launch("stdout not captured".to_string()))?;
        let stderr_reader = tokio::spawn(collect_stderr(child.stderr.take()));

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(&mut reader, &mut buf).await {
            match parse_progress_line(&line) {
                Some(event) => hook(event),
                None => tracing::trace!(target: "yt-dlp", "{line}"),
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::Failed(e.to_string()))?;
        let stderr = stderr_reader.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(classify_stderr(&stderr))
        }
    }
}
