//! JSON snapshot store
//!
//! Format: `{"last_processed_block": 123, "processed_nonces": ["0x1", ...]}`.
//! Writes go to a sibling temp file that is flushed to disk and then renamed
//! over the target, so a crash mid-write leaves the previous snapshot intact.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{RelayState, StateStore};
use crate::error::StoreError;

pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn load(&self) -> Result<Option<RelayState>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &RelayState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(
            path = %self.path.display(),
            last_processed_block = state.last_processed_block(),
            nonces = state.processed_nonces().len(),
            "State snapshot written"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("state.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_round_trips_both_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("state.json"));

        let mut state = RelayState::new(18_000_000);
        state.mark_processed(U256::from(1u64));
        state.mark_processed(U256::MAX);
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonFileStateStore::new(path.clone());

        store.save(&RelayState::new(1)).await.unwrap();
        let mut state = RelayState::new(1);
        state.advance_to(9);
        state.mark_processed(U256::from(4u64));
        store.save(&state).await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let on_disk: RelayState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(on_disk, state);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let store = JsonFileStateStore::new(path);
        assert!(matches!(store.load().await, Err(StoreError::Format(_))));
    }
}
