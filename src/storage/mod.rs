use crate::error::{FaceGateError, Result};
use crate::provider::Embedding;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

const STORAGE_VERSION: u32 = 1;

/// A stored identity-to-embedding binding. Never mutated in place; an update
/// is a delete followed by a fresh insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub version: u32,
    pub identity: String,
    /// Model/configuration that produced the embedding. Matching skips
    /// records tagged with a different model than the active provider.
    pub model_id: String,
    pub embedding: Embedding,
    /// JPEG bytes of the frame captured at enrollment, kept for image-pair
    /// verification.
    pub reference_jpeg: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl EnrollmentRecord {
    pub fn new(
        identity: String,
        model_id: String,
        embedding: Embedding,
        reference_jpeg: Option<Vec<u8>>,
    ) -> Self {
        Self {
            version: STORAGE_VERSION,
            identity,
            model_id,
            embedding,
            reference_jpeg,
            created_at: Utc::now(),
        }
    }
}

/// Persistence for enrollment records.
///
/// `list_all` iterates in enrollment order (oldest first); the matching
/// engine's first-match policy binds to exactly this order. Reads may run
/// concurrently; implementations serialize the uniqueness check and insert so
/// two concurrent enrollments of the same identity cannot both succeed.
pub trait EnrollmentStore: Send + Sync {
    fn list_all(&self) -> Result<Vec<EnrollmentRecord>>;

    fn get(&self, identity: &str) -> Result<Option<EnrollmentRecord>>;

    /// Fails with `DuplicateIdentity` if the identity exists, or
    /// `PersistenceFailed` if the write fails.
    fn insert(&self, record: &EnrollmentRecord) -> Result<()>;

    /// Returns whether a record was removed.
    fn delete(&self, identity: &str) -> Result<bool>;
}

/// File-per-identity store: one bincode file per enrollment under a data
/// directory. The file name doubles as the uniqueness constraint.
pub struct BincodeStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl BincodeStore {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)
            .map_err(|e| FaceGateError::PersistenceFailed(format!("Create data dir: {}", e)))?;
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Store rooted at the platform data directory.
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "facegate", "FaceGate")
            .ok_or_else(|| FaceGateError::PersistenceFailed("Failed to get project dirs".into()))?;
        Self::new(dirs.data_dir().join("enrollments"))
    }

    fn record_path(&self, identity: &str) -> Result<PathBuf> {
        // Identities become file names; reject anything that could escape the
        // data dir.
        if identity.is_empty()
            || identity.contains(std::path::MAIN_SEPARATOR)
            || identity.contains("..")
            || identity.starts_with('.')
        {
            return Err(FaceGateError::PersistenceFailed(format!(
                "Invalid identity name: {:?}",
                identity
            )));
        }
        Ok(self.data_dir.join(format!("{}.bincode", identity)))
    }

    fn read_record(path: &std::path::Path) -> Result<EnrollmentRecord> {
        let data = fs::read(path)?;
        let mut record: EnrollmentRecord = bincode::deserialize(&data)
            .map_err(|e| FaceGateError::PersistenceFailed(format!("Failed to deserialize: {}", e)))?;
        if record.version < STORAGE_VERSION {
            record.version = STORAGE_VERSION;
        }
        Ok(record)
    }
}

impl EnrollmentStore for BincodeStore {
    fn list_all(&self) -> Result<Vec<EnrollmentRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bincode") {
                continue;
            }
            records.push(Self::read_record(&path)?);
        }
        // Enrollment order, with the name as a tie-break for equal timestamps.
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        Ok(records)
    }

    fn get(&self, identity: &str) -> Result<Option<EnrollmentRecord>> {
        let path = self.record_path(identity)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    fn insert(&self, record: &EnrollmentRecord) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = self.record_path(&record.identity)?;
        if path.exists() {
            return Err(FaceGateError::DuplicateIdentity(record.identity.clone()));
        }
        let encoded = bincode::serialize(record)
            .map_err(|e| FaceGateError::PersistenceFailed(format!("Failed to serialize: {}", e)))?;
        fs::write(&path, encoded)
            .map_err(|e| FaceGateError::PersistenceFailed(format!("Failed to write: {}", e)))?;
        tracing::info!("Enrolled identity {:?}", record.identity);
        Ok(())
    }

    fn delete(&self, identity: &str) -> Result<bool> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = self.record_path(identity)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .map_err(|e| FaceGateError::PersistenceFailed(format!("Failed to delete: {}", e)))?;
        tracing::info!("Removed identity {:?}", identity);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> (tempfile::TempDir, BincodeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BincodeStore::new(dir.path().join("enrollments")).unwrap();
        (dir, store)
    }

    fn record(identity: &str) -> EnrollmentRecord {
        EnrollmentRecord::new(
            identity.to_string(),
            "facenet".to_string(),
            vec![0.1, 0.2, 0.3],
            Some(vec![0xFF, 0xD8]),
        )
    }

    #[test]
    fn insert_then_get_round_trips() {
        let (_dir, store) = store();
        store.insert(&record("alice")).unwrap();
        let loaded = store.get("alice").unwrap().unwrap();
        assert_eq!(loaded.identity, "alice");
        assert_eq!(loaded.embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(loaded.model_id, "facenet");
        assert_eq!(loaded.reference_jpeg, Some(vec![0xFF, 0xD8]));
    }

    #[test]
    fn duplicate_insert_is_rejected_and_first_record_survives() {
        let (_dir, store) = store();
        store.insert(&record("alice")).unwrap();

        let mut second = record("alice");
        second.embedding = vec![9.0];
        match store.insert(&second) {
            Err(FaceGateError::DuplicateIdentity(name)) => assert_eq!(name, "alice"),
            other => panic!("expected DuplicateIdentity, got {:?}", other),
        }

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].embedding, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn list_all_returns_enrollment_order() {
        let (_dir, store) = store();
        let mut first = record("zoe");
        first.created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut second = record("adam");
        second.created_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        store.insert(&second).unwrap();
        store.insert(&first).unwrap();

        let names: Vec<_> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|r| r.identity)
            .collect();
        assert_eq!(names, vec!["zoe", "adam"]);
    }

    #[test]
    fn delete_removes_record_and_reports_absence() {
        let (_dir, store) = store();
        store.insert(&record("alice")).unwrap();
        assert!(store.delete("alice").unwrap());
        assert!(!store.delete("alice").unwrap());
        assert!(store.get("alice").unwrap().is_none());
    }

    #[test]
    fn rejects_path_escaping_identities() {
        let (_dir, store) = store();
        assert!(store.insert(&record("../evil")).is_err());
        assert!(store.get("").is_err());
    }
}
