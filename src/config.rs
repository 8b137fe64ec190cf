use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::core::BackendContext;
use crate::engine::YtDlpEngine;
use crate::error::{Result, VidQueueError};
use crate::orchestrator::OrchestratorSettings;

/// Contents of `config.toml`. Missing keys take their defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Container extensions offered for selection; later entries win label clashes.
    pub allowed_extensions: Vec<String>,
    pub info_timeout_ms: u64,
    pub thumbnail_timeout_margin_ms: u64,
    pub output_template: String,
    pub output_container: String,
    pub thumbnail_index: i64,
    pub high_quality_thumbnails: bool,
    pub thumbnails_dir: PathBuf,
    pub queue_file: PathBuf,
    pub ytdlp_path: PathBuf,
    pub socket_timeout_secs: u64,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "vidqueue", "vidqueue")
}

fn data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".vidqueue"))
}

impl Default for Config {
    fn default() -> Self {
        let data = data_dir();
        Config {
            allowed_extensions: vec!["mp4".into(), "webm".into(), "mp3".into()],
            info_timeout_ms: 16_000,
            thumbnail_timeout_margin_ms: 7_000,
            output_template: "{title}".into(),
            output_container: "mp4".into(),
            thumbnail_index: -2,
            high_quality_thumbnails: false,
            thumbnails_dir: data.join("thumbnails"),
            queue_file: data.join("queue.json"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            socket_timeout_secs: 30,
            log_level: "info".into(),
            log_file: None,
        }
    }
}

/// Default location of the configuration file.
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = project_dirs().ok_or_else(|| {
        VidQueueError::ConfigParseError(
            "could not find a home directory to store the config".to_string(),
        )
    })?;
    Ok(dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Load `path`, writing a default config there first when it does not exist.
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config file found. Creating a default one at: {}", path.display());
            let config = Config::default();
            config.save(path).await?;
            return Ok(config);
        }
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            VidQueueError::ConfigParseError(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, toml::to_string_pretty(self)?).await?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.allowed_extensions.is_empty() {
            return Err(VidQueueError::ConfigParseError(
                "allowed_extensions must not be empty".to_string(),
            ));
        }
        if self.output_container.trim().is_empty() {
            return Err(VidQueueError::ConfigParseError(
                "output_container must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn backend_context(&self) -> BackendContext {
        let engine = YtDlpEngine::new(&self.ytdlp_path, self.socket_timeout_secs);
        BackendContext {
            engine: Arc::new(engine),
            allowed_extensions: self.allowed_extensions.clone(),
            container: self.output_container.clone(),
            thumbnail_index: self.thumbnail_index,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            info_timeout: Duration::from_millis(self.info_timeout_ms),
            thumbnail_timeout_margin: Duration::from_millis(self.thumbnail_timeout_margin_ms),
            high_quality_thumbnails: self.high_quality_thumbnails,
            thumbnails_dir: self.thumbnails_dir.clone(),
            output_template: self.output_template.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.toml");
        let config = Config::load_or_create(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());
        assert_eq!(Config::load_or_create(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "info_timeout_ms = 500\nallowed_extensions = [\"webm\"]\n").unwrap();
        let config = Config::load_or_create(&path).await.unwrap();
        assert_eq!(config.info_timeout_ms, 500);
        assert_eq!(config.allowed_extensions, vec!["webm"]);
        assert_eq!(config.thumbnail_index, -2);

        let settings = config.orchestrator_settings();
        assert_eq!(settings.info_timeout, Duration::from_millis(500));
        assert_eq!(settings.thumbnail_timeout_margin, Duration::from_millis(7_000));
        let ctx = config.backend_context();
        assert_eq!(ctx.engine.name(), "yt-dlp");
        assert_eq!(ctx.container, "mp4");
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "info_timeout_ms = \"soon\"").unwrap();
        assert!(matches!(
            Config::load_or_create(&path).await,
            Err(VidQueueError::ConfigParseError(_))
        ));

        std::fs::write(&path, "allowed_extensions = []").unwrap();
        assert!(matches!(
            Config::load_or_create(&path).await,
            Err(VidQueueError::ConfigParseError(_))
        ));
    }
}
