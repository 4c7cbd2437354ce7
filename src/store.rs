//! Session persistence seam. The engine only needs get/set by session key;
//! how records are stored is up to the gateway.
//!
//! Two gateways ship with the crate: `MemoryGateway` (the default) and
//! `FileGateway`, one JSON file per session under a directory.

use std::{collections::HashMap, io::ErrorKind, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::SessionRecord;
use crate::error::EngineError;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
  async fn load(&self, key: &str) -> Result<Option<SessionRecord>, EngineError>;
  async fn save(&self, key: &str, record: SessionRecord) -> Result<(), EngineError>;
}

/// In-memory gateway backing the server and tests.
#[derive(Clone, Default)]
pub struct MemoryGateway {
  records: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl MemoryGateway {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn record_count(&self) -> usize {
    self.records.read().await.len()
  }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
  #[instrument(level = "debug", skip(self))]
  async fn load(&self, key: &str) -> Result<Option<SessionRecord>, EngineError> {
    Ok(self.records.read().await.get(key).cloned())
  }

  #[instrument(level = "debug", skip(self, record), fields(stage = record.current_stage_index, score = record.score))]
  async fn save(&self, key: &str, record: SessionRecord) -> Result<(), EngineError> {
    self.records.write().await.insert(key.to_string(), record);
    debug!(target: "session", %key, "Session record saved");
    Ok(())
  }
}

/// One `<key>.json` file per session. Keys are escaped so any key maps to a
/// single flat file name.
#[derive(Clone, Debug)]
pub struct FileGateway {
  dir: PathBuf,
}

impl FileGateway {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn path_for(&self, key: &str) -> PathBuf {
    let mut name = String::with_capacity(key.len() + 5);
    for b in key.bytes() {
      match b {
        b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => name.push(b as char),
        _ => name.push_str(&format!("_{b:02x}")),
      }
    }
    name.push_str(".json");
    self.dir.join(name)
  }
}

fn io_error(path: &std::path::Path, e: impl std::fmt::Display) -> EngineError {
  EngineError::Persistence(format!("{}: {e}", path.display()))
}

#[async_trait]
impl PersistenceGateway for FileGateway {
  #[instrument(level = "debug", skip(self))]
  async fn load(&self, key: &str) -> Result<Option<SessionRecord>, EngineError> {
    let path = self.path_for(key);
    match tokio::fs::read(&path).await {
      Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| io_error(&path, e)),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(io_error(&path, e)),
    }
  }

  /// Writes to a temp file first so a crash never leaves a half-written record.
  #[instrument(level = "debug", skip(self, record), fields(stage = record.current_stage_index, score = record.score))]
  async fn save(&self, key: &str, record: SessionRecord) -> Result<(), EngineError> {
    let path = self.path_for(key);
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(&record).map_err(|e| io_error(&path, e))?;
    tokio::fs::create_dir_all(&self.dir).await.map_err(|e| io_error(&self.dir, e))?;
    tokio::fs::write(&tmp, bytes).await.map_err(|e| io_error(&tmp, e))?;
    tokio::fs::rename(&tmp, &path).await.map_err(|e| io_error(&path, e))?;
    debug!(target: "session", %key, path = %path.display(), "Session record written");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  fn record(stage: i64, score: u32) -> SessionRecord {
    SessionRecord {
      started: true,
      completed: false,
      current_stage_index: stage,
      score,
      last_played_at: Utc::now(),
      auxiliary_data: Default::default(),
    }
  }

  #[tokio::test]
  async fn test_memory_gateway_roundtrip() {
    let gw = MemoryGateway::new();
    assert!(gw.load("u:g").await.unwrap().is_none());
    let rec = record(1, 10);
    gw.save("u:g", rec.clone()).await.unwrap();
    assert_eq!(gw.load("u:g").await.unwrap(), Some(rec));
    assert_eq!(gw.record_count().await, 1);
  }

  #[tokio::test]
  async fn test_file_gateway_roundtrip_and_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let gw = FileGateway::new(dir.path().join("sessions"));
    assert!(gw.load("kid:dragon-cave").await.unwrap().is_none());

    gw.save("kid:dragon-cave", record(1, 10)).await.unwrap();
    let latest = record(2, 20);
    gw.save("kid:dragon-cave", latest.clone()).await.unwrap();
    assert_eq!(gw.load("kid:dragon-cave").await.unwrap(), Some(latest));

    // escaped keys stay distinct
    gw.save("kid_3adragon-cave", record(0, 0)).await.unwrap();
    assert_eq!(gw.load("kid:dragon-cave").await.unwrap().unwrap().score, 20);
  }

  #[tokio::test]
  async fn test_file_gateway_unreadable_record_is_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let gw = FileGateway::new(dir.path());
    tokio::fs::write(gw.path_for("u:g"), b"not json").await.unwrap();
    let err = gw.load("u:g").await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert_eq!(err.code(), "persistence");
  }
}
