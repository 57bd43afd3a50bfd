//! Snapshot persistence.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{SnapshotError, SnapshotResult};
use crate::snapshot::{PolicySnapshot, SNAPSHOT_VERSION};

/// Reads and writes snapshot files.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// A store over one snapshot file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a snapshot atomically: serialize to a sibling temp file,
    /// then rename over the destination, so a crashed run never leaves a
    /// half-written snapshot behind.
    pub async fn save(&self, snapshot: &PolicySnapshot) -> SnapshotResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        info!(
            path = %self.path.display(),
            cells = snapshot.cell_count(),
            "snapshot written"
        );
        Ok(())
    }

    /// Load and validate a snapshot.
    pub async fn load(&self) -> SnapshotResult<PolicySnapshot> {
        let bytes = tokio::fs::read(&self.path).await?;
        let snapshot: PolicySnapshot = serde_json::from_slice(&bytes)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }

        Ok(snapshot)
    }

    /// Whether the snapshot file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rowshield_config::{Expectation, Op};
    use rowshield_probe::{ProbeObservation, ProbeOutcome, TestResult, TestResults};

    fn snapshot() -> PolicySnapshot {
        let results = TestResults::aggregate(
            vec![TestResult::evaluate(
                "public.todos",
                "anonymous",
                "anon",
                Op::Select,
                Expectation::Deny,
                ProbeObservation {
                    outcome: ProbeOutcome::Deny,
                    detail: None,
                },
                1,
            )],
            Vec::new(),
            1,
        );
        PolicySnapshot::capture(&results, "postgresql://probe@localhost/app")
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("baseline.json"));

        let original = snapshot();
        store.save(&original).await.unwrap();
        assert!(store.exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.database, original.database);
        assert_eq!(loaded.cell_count(), original.cell_count());
        assert_eq!(
            loaded.outcome("public.todos", "anonymous", Op::Select),
            original.outcome("public.todos", "anonymous", Op::Select)
        );
    }

    #[tokio::test]
    async fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/dir/baseline.json"));
        store.save(&snapshot()).await.unwrap();
        assert!(store.exists());
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");

        let mut future = snapshot();
        future.version = SNAPSHOT_VERSION + 1;
        tokio::fs::write(&path, serde_json::to_vec(&future).unwrap())
            .await
            .unwrap();

        let store = SnapshotStore::new(&path);
        match store.load().await {
            Err(SnapshotError::UnsupportedVersion { found, .. }) => {
                assert_eq!(found, SNAPSHOT_VERSION + 1);
            }
            other => panic!("expected UnsupportedVersion, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = SnapshotStore::new(&path);
        assert!(matches!(
            store.load().await,
            Err(SnapshotError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let store = SnapshotStore::new("/nonexistent/path/baseline.json");
        assert!(matches!(store.load().await, Err(SnapshotError::Io(_))));
    }
}
