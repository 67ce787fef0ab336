use crate::error_handling::types::StorageError;
use crate::session_management::session::{Session, SessionKey};
use crate::storage::storage_trait::SessionStorage;
use crate::storage::types::SessionRecord;
use log::{debug, error, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// JSON snapshot file keyed by `"<ip>|<mac-or-empty>"`.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn decode(&self, content: &str) -> Result<Vec<Session>, StorageError> {
        let entries: Map<String, Value> = serde_json::from_str(content).map_err(|e| {
            error!("Failed to parse session snapshot {}: {}", self.path.display(), e);
            StorageError::ReadFailed(format!("{}: {}", self.path.display(), e))
        })?;

        let mut sessions = Vec::with_capacity(entries.len());
        for (raw_key, raw_value) in entries {
            let Some(key) = SessionKey::parse(&raw_key) else {
                warn!("Dropping persisted session with invalid key {:?}", raw_key);
                continue;
            };
            let record: SessionRecord = match serde_json::from_value(raw_value) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Dropping invalid persisted session {}: {}", raw_key, e);
                    continue;
                }
            };
            match record.into_session(key) {
                Some(session) => sessions.push(session),
                None => warn!(
                    "Dropping persisted session {} with blank username or out-of-range time",
                    raw_key
                ),
            }
        }
        Ok(sessions)
    }
}

impl SessionStorage for FileStorage {
    fn load_all(&self) -> Result<Vec<Session>, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No session snapshot at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                error!("Failed to read session snapshot {}: {}", self.path.display(), e);
                return Err(StorageError::ReadFailed(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let sessions = self.decode(&content)?;
        debug!("Loaded {} session(s) from {}", sessions.len(), self.path.display());
        Ok(sessions)
    }

    fn save_all(&self, sessions: &[&Session]) -> Result<(), StorageError> {
        let payload: BTreeMap<String, SessionRecord> = sessions
            .iter()
            .map(|s| (s.key().to_string(), SessionRecord::from_session(s)))
            .collect();
        let json = serde_json::to_string_pretty(&payload)
            .map_err(|e| StorageError::SerializationFailed(e.to_string()))?;

        let dir = self.parent_dir();
        let write_failed = |e: std::io::Error| {
            error!("Failed to write session snapshot {}: {}", self.path.display(), e);
            StorageError::WriteFailed(format!("{}: {}", self.path.display(), e))
        };
        fs::create_dir_all(&dir).map_err(write_failed)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_failed)?;
        tmp.write_all(json.as_bytes()).map_err(write_failed)?;
        tmp.write_all(b"\n").map_err(write_failed)?;
        tmp.as_file().sync_all().map_err(write_failed)?;
        tmp.persist(&self.path).map_err(|e| write_failed(e.error))?;

        debug!("Saved {} session(s) to {}", sessions.len(), self.path.display());
        Ok(())
    }
}
