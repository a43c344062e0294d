//! Persistence of the last successful connection.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use super::api::Result;
use crate::service::model::ClusterConnection;

/// Name under which the connection record is persisted.
pub const STORAGE_KEY: &str = "kafka-connection";

pub trait ConnectionStore: std::fmt::Debug + Send + Sync {
    fn load(&self) -> Result<Option<ClusterConnection>>;

    fn save(&self, connection: &ClusterConnection) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// One JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/kafka-connection.json`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{STORAGE_KEY}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionStore for FileStore {
    fn load(&self) -> Result<Option<ClusterConnection>> {
        match std::fs::read(&self.path) {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, connection: &ClusterConnection) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(connection)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<ClusterConnection>>,
}

impl MemoryStore {
    pub fn new(record: Option<ClusterConnection>) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }
}

impl ConnectionStore for MemoryStore {
    fn load(&self) -> Result<Option<ClusterConnection>> {
        Ok(self.record.lock().clone())
    }

    fn save(&self, connection: &ClusterConnection) -> Result<()> {
        *self.record.lock() = Some(connection.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.lock() = None;
        Ok(())
    }
}
