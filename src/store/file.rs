use super::{StateStore, StoreError};
use crate::models::{State, StoredState};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::borrow::Cow;
use std::io::ErrorKind;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Text encoding of a profile file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Pretty-printed JSON, two-space indent.
    Json,
    /// Block-style YAML.
    Yaml,
}

impl DocumentFormat {
    /// Pick the encoding from the file extension. Anything that is not
    /// `.yaml`/`.yml` is treated as JSON.
    pub fn from_path(path: &Utf8Path) -> Self {
        match path.extension().map(str::to_ascii_lowercase).as_deref() {
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Json,
        }
    }

    /// Encode `state`. Unknown keys that collide with a modelled field are
    /// left out so the output always decodes again.
    pub fn encode(self, state: &State) -> Result<String, StoreError> {
        let state = state.without_shadowed_extra();
        if let Cow::Owned(_) = state {
            warn!("Dropping unknown profile keys that shadow known fields");
        }
        let state = state.as_ref();

        match self {
            Self::Json => serde_json::to_string_pretty(state)
                .map(|mut text| {
                    text.push('\n');
                    text
                })
                .map_err(|e| StoreError::Serialize(e.to_string())),
            Self::Yaml => {
                serde_yaml_ng::to_string(state).map_err(|e| StoreError::Serialize(e.to_string()))
            }
        }
    }

    /// Decode `text`, returning the decoder's message on failure.
    pub fn decode(self, text: &str) -> Result<StoredState, String> {
        if text.trim().is_empty() {
            return Err("document is empty".to_string());
        }

        match self {
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml_ng::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

/// Durable backend persisting the profile to exactly one file.
///
/// # Write protocol
///
/// 1. Encode the document and write it in full to `<path>.swap`
/// 2. `fsync` the swap file
/// 3. Rename `<path>.swap` onto `<path>` (atomic replace)
///
/// A crash before step 3 leaves the previous file untouched; after step 3 the
/// new file is complete. A stale swap file from an interrupted write is simply
/// overwritten by the next write.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: Utf8PathBuf,
    swap_path: Utf8PathBuf,
    format: DocumentFormat,
    backup_corrupt: bool,
}

impl FileStateStore {
    /// Create a store for `path`, encoding chosen by [`DocumentFormat::from_path`].
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        Self {
            swap_path: Utf8PathBuf::from(format!("{}.swap", path)),
            format: DocumentFormat::from_path(&path),
            backup_corrupt: false,
            path,
        }
    }

    /// Copy unreadable documents aside before they are overwritten.
    pub fn with_corrupt_backup(mut self, enabled: bool) -> Self {
        self.backup_corrupt = enabled;
        self
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn swap_path(&self) -> &Utf8Path {
        &self.swap_path
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    /// Write the encoded document to the swap file and flush it to disk.
    ///
    /// The target file is not touched. Creates missing parent directories.
    pub async fn stage(&self, state: &State) -> Result<(), StoreError> {
        let encoded = self.format.encode(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let mut file = fs::File::create(&self.swap_path)
            .await
            .map_err(|e| StoreError::io(&self.swap_path, e))?;
        file.write_all(encoded.as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.swap_path, e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(&self.swap_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::io(&self.swap_path, e))?;

        debug!(swap = %self.swap_path, bytes = encoded.len(), "Staged profile document");
        Ok(())
    }

    /// Atomically move the staged swap file onto the target path.
    pub async fn commit(&self) -> Result<(), StoreError> {
        fs::rename(&self.swap_path, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        self.sync_parent_dir().await;
        debug!(path = %self.path, "Committed profile document");
        Ok(())
    }

    #[cfg(unix)]
    async fn sync_parent_dir(&self) {
        let parent = match self.path.parent() {
            Some(p) if !p.as_str().is_empty() => p,
            _ => Utf8Path::new("."),
        };

        let result = match fs::File::open(parent).await {
            Ok(dir) => dir.sync_all().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!(dir = %parent, "Could not sync directory after rename: {}", e);
        }
    }

    #[cfg(not(unix))]
    async fn sync_parent_dir(&self) {}
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn read(&self) -> Result<StoredState, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let text = String::from_utf8(bytes).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let stored = self
            .format
            .decode(&text)
            .map_err(|message| StoreError::Parse {
                path: self.path.clone(),
                message,
            })?;

        debug!(path = %self.path, "Read profile document");
        Ok(stored)
    }

    async fn write(&self, state: &State) -> Result<(), StoreError> {
        self.stage(state).await?;
        self.commit().await
    }

    async fn preserve_corrupt(&self) -> Result<Option<Utf8PathBuf>, StoreError> {
        if !self.backup_corrupt {
            return Ok(None);
        }

        let contents = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let base = format!("{}.corrupt.{}", self.path, stamp);

        // Never replace an earlier backup taken within the same millisecond.
        let mut attempt = 0u32;
        loop {
            let backup = match attempt {
                0 => Utf8PathBuf::from(base.clone()),
                n => Utf8PathBuf::from(format!("{}-{}", base, n)),
            };

            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&backup)
                .await;
            let mut file = match opened {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(StoreError::io(&backup, e)),
            };

            file.write_all(&contents)
                .await
                .map_err(|e| StoreError::io(&backup, e))?;
            file.sync_all()
                .await
                .map_err(|e| StoreError::io(&backup, e))?;

            return Ok(Some(backup));
        }
    }
}
