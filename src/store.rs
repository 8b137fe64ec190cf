//! Queue and settings persistence.
//!
//! The orchestrators never touch a store; the caller reads items out,
//! hands them over, and applies the results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VidQueueError};

/// Setting gating the confirmation prompt before a queue run, `"1"` or `"0"`.
pub const CONFIRM_DOWNLOAD_KEY: &str = "confirm_download";

/// One queued download request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Assigned by the store on insertion.
    #[serde(default)]
    pub id: i64,
    pub url: String,
    pub platform: String,
    #[serde(default)]
    pub format_label: Option<String>,
    #[serde(default)]
    pub format_selector: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub title: String,
}

impl QueueItem {
    pub fn new(url: impl Into<String>, platform: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            url: url.into(),
            platform: platform.into(),
            format_label: None,
            format_selector: None,
            thumbnail: None,
            title: title.into(),
        }
    }

    pub fn with_format(mut self, label: impl Into<String>, selector: impl Into<String>) -> Self {
        self.format_label = Some(label.into());
        self.format_selector = Some(selector.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }
}

pub trait QueueStore {
    /// Store `item` under a fresh id and return it.
    fn add(&mut self, item: QueueItem) -> Result<i64>;
    fn get_all(&self) -> Result<Vec<QueueItem>>;
    fn get_by_id(&self, id: i64) -> Result<QueueItem>;
    fn update(&mut self, item: &QueueItem) -> Result<()>;
    fn delete_by_id(&mut self, id: i64) -> Result<()>;
    fn delete_all(&mut self) -> Result<()>;
    /// An item with this URL and format label is already queued.
    fn exists(&self, url: &str, format_label: Option<&str>) -> Result<bool>;
}

pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Whether a queue run asks for confirmation first. Defaults to yes.
    fn confirm_download(&self) -> Result<bool> {
        Ok(self.get(CONFIRM_DOWNLOAD_KEY)?.as_deref() != Some("0"))
    }

    fn set_confirm_download(&mut self, confirm: bool) -> Result<()> {
        self.set(CONFIRM_DOWNLOAD_KEY, if confirm { "1" } else { "0" })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
    next_id: i64,
    items: Vec<QueueItem>,
    settings: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryStore {
    fn add(&mut self, mut item: QueueItem) -> Result<i64> {
        self.next_id += 1;
        item.id = self.next_id;
        self.items.push(item);
        Ok(self.next_id)
    }

    fn get_all(&self) -> Result<Vec<QueueItem>> {
        Ok(self.items.clone())
    }

    fn get_by_id(&self, id: i64) -> Result<QueueItem> {
        self.items
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or(VidQueueError::ItemNotFound(id))
    }

    fn update(&mut self, item: &QueueItem) -> Result<()> {
        let slot = self
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or(VidQueueError::ItemNotFound(item.id))?;
        *slot = item.clone();
        Ok(())
    }

    fn delete_by_id(&mut self, id: i64) -> Result<()> {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        if self.items.len() == before {
            return Err(VidQueueError::ItemNotFound(id));
        }
        Ok(())
    }

    fn delete_all(&mut self) -> Result<()> {
        self.items.clear();
        Ok(())
    }

    fn exists(&self, url: &str, format_label: Option<&str>) -> Result<bool> {
        Ok(self
            .items
            .iter()
            .any(|i| i.url == url && i.format_label.as_deref() == format_label))
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.settings.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// [`MemoryStore`] persisted as pretty JSON after every change.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    data: MemoryStore,
}

impl JsonStore {
    /// Open the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            MemoryStore::default()
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.data)?)?;
        Ok(())
    }
}

impl QueueStore for JsonStore {
    fn add(&mut self, item: QueueItem) -> Result<i64> {
        let id = self.data.add(item)?;
        self.save()?;
        Ok(id)
    }

    fn get_all(&self) -> Result<Vec<QueueItem>> {
        self.data.get_all()
    }

    fn get_by_id(&self, id: i64) -> Result<QueueItem> {
        self.data.get_by_id(id)
    }

    fn update(&mut self, item: &QueueItem) -> Result<()> {
        self.data.update(item)?;
        self.save()
    }

    fn delete_by_id(&mut self, id: i64) -> Result<()> {
        self.data.delete_by_id(id)?;
        self.save()
    }

    fn delete_all(&mut self) -> Result<()> {
        self.data.delete_all()?;
        self.save()
    }

    fn exists(&self, url: &str, format_label: Option<&str>) -> Result<bool> {
        self.data.exists(url, format_label)
    }
}

impl SettingsStore for JsonStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.data.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.data.set(key, value)?;
        self.save()
    }
}
