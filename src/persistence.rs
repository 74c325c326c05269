// Durable storage for an in-progress discount
//
// The applied code and the pre-discount snapshot are one record, so they are
// always written and cleared together.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::quote::CarQuote;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDiscount {
    pub code: String,
    pub snapshot: CarQuote,
}

/// Persisted-state port used by the discount coordinator.
pub trait DiscountStore: Send + Sync + 'static {
    fn load(&self, key: &str) -> Result<Option<PersistedDiscount>, StoreError>;

    fn save(&self, key: &str, discount: &PersistedDiscount) -> Result<(), StoreError>;

    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

// Session-scoped storage key
pub fn discount_storage_key(session_id: &str) -> String {
    format!("booking:{}:discount", session_id)
}

#[derive(Debug, Default)]
pub struct MemoryDiscountStore {
    entries: DashMap<String, PersistedDiscount>,
}

impl MemoryDiscountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DiscountStore for MemoryDiscountStore {
    fn load(&self, key: &str) -> Result<Option<PersistedDiscount>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn save(&self, key: &str, discount: &PersistedDiscount) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), discount.clone());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key. Writes go to a temp file that is renamed into
/// place, so a reader sees either the old record or the new one.
#[derive(Debug, Clone)]
pub struct FileDiscountStore {
    dir: PathBuf,
}

impl FileDiscountStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl DiscountStore for FileDiscountStore {
    fn load(&self, key: &str) -> Result<Option<PersistedDiscount>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, discount: &PersistedDiscount) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        write_synced(&tmp, &serde_json::to_vec(discount)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
