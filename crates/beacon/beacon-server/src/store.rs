use std::{
    io::ErrorKind,
    path::PathBuf,
};

use beacon_core::DeploymentRecord;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to write deployment record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode deployment record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable "has deployment happened" flag: a single JSON file holding the
/// [`DeploymentRecord`].
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the persisted record. Absence and corruption both come back as
    /// `None`; corruption is logged, since it leads to a redeploy on the
    /// same chain.
    pub fn load(&self) -> Option<DeploymentRecord> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(target: "store", path = %self.path.display(), "No deployment record on disk");
                return None;
            }
            Err(err) => {
                tracing::warn!(
                    target: "store",
                    path = %self.path.display(),
                    %err,
                    "Failed to read deployment record, treating as absent"
                );
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(
                    target: "store",
                    path = %self.path.display(),
                    %err,
                    "Deployment record is corrupt, treating as absent"
                );
                None
            }
        }
    }

    /// Overwrite the record on disk. Plain write, no rename/fsync; a crash
    /// mid-write can corrupt the file.
    pub fn save(&self, record: &DeploymentRecord) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{
        B256,
        address,
    };
    use tempfile::TempDir;

    fn record() -> DeploymentRecord {
        DeploymentRecord {
            address: address!("feedfacefeedfacefeedfacefeedfacefeedface"),
            transaction_hash: B256::repeat_byte(0x12),
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = DeploymentStore::new(dir.path().join("deployed.json"));

        store.save(&record()).unwrap();
        assert_eq!(store.load(), Some(record()));
    }

    #[test]
    fn absent_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = DeploymentStore::new(dir.path().join("deployed.json"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn corrupt_file_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deployed.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = DeploymentStore::new(path);
        assert_eq!(store.load(), None);
    }

    #[test]
    fn missing_fields_are_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deployed.json");
        std::fs::write(&path, r#"{"address": "0xfeedfacefeedfacefeedfacefeedfacefeedface"}"#)
            .unwrap();

        let store = DeploymentStore::new(path);
        assert_eq!(store.load(), None);
    }

    #[test]
    fn persisted_file_uses_the_documented_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deployed.json");
        let store = DeploymentStore::new(path.clone());

        store.save(&record()).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(json.get("address").is_some());
        assert!(json.get("tx").is_some());
    }

    #[test]
    fn save_overwrites_a_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deployed.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = DeploymentStore::new(path);
        store.save(&record()).unwrap();
        assert_eq!(store.load(), Some(record()));
    }
}
