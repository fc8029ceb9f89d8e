//! Plugin state store — one JSON document mapping plugin name → blob.
//!
//! Plugins never touch the file: the registry pulls blobs out at enable
//! time and pushes them back on the external save trigger. The on-disk
//! write is temp-file-then-rename so a crash mid-save leaves the previous
//! document intact.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::BotError;

pub struct StateStore {
    path: PathBuf,
    blobs: Mutex<HashMap<String, Value>>,
}

impl StateStore {
    /// Open the store at `path`. A missing file is an empty store; a file
    /// that exists but does not parse is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BotError> {
        let path = path.into();
        let blobs = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| BotError::State(format!("cannot parse {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(BotError::State(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self {
            path,
            blobs: Mutex::new(blobs),
        })
    }

    /// Last-saved blob for `name`, or an empty object — plugins default
    /// missing keys, so an empty object is always a valid load input.
    pub fn get(&self, name: &str) -> Value {
        self.blobs
            .lock()
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    pub fn put(&self, name: &str, blob: Value) {
        self.blobs.lock().insert(name.to_string(), blob);
    }

    /// Write the whole document atomically.
    pub fn flush(&self) -> Result<(), BotError> {
        let doc = {
            let blobs = self.blobs.lock();
            serde_json::to_string_pretty(&*blobs)
                .map_err(|e| BotError::State(format!("cannot serialise state: {e}")))?
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, doc)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::open(dir.path().join("state.json")).expect("open");
        assert_eq!(store.get("echo"), json!({}));
    }

    #[test]
    fn roundtrip_through_flush() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");

        let store = StateStore::open(&path).expect("open");
        store.put("ticket", json!({"trackers": [{"project": "HUB"}]}));
        store.flush().expect("flush");

        let reopened = StateStore::open(&path).expect("reopen");
        assert_eq!(reopened.get("ticket"), json!({"trackers": [{"project": "HUB"}]}));
        assert_eq!(reopened.get("unknown"), json!({}));
    }

    #[test]
    fn unparseable_file_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").expect("write");
        assert!(StateStore::open(&path).is_err());
    }

    #[test]
    fn flush_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        let store = StateStore::open(&path).expect("open");
        store.put("echo", json!({}));
        store.flush().expect("flush");
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
