use async_trait::async_trait;
use sl_core::ports::{ShardStoreError, ShardStorePort};
use sl_core::{SessionId, Shard};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One JSON file per session under `dir`, written via a temp file and rename.
pub struct FileShardStore {
    dir: PathBuf,
}

impl FileShardStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!("shard-{session_id}.json"))
    }
}

#[async_trait]
impl ShardStorePort for FileShardStore {
    async fn persist_shard(&self, shard: &Shard) -> Result<(), ShardStoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&shard.session_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(shard)
            .map_err(|err| ShardStoreError::Corrupt(err.to_string()))?;

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(session_id = %shard.session_id, index = shard.index, path = %path.display(), "shard persisted");
        Ok(())
    }

    async fn load_shard(&self, session_id: &SessionId) -> Result<Option<Shard>, ShardStoreError> {
        let path = self.path_for(session_id);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let shard: Shard = serde_json::from_slice(&content)
            .map_err(|err| ShardStoreError::Corrupt(err.to_string()))?;
        Ok(Some(shard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_core::DeviceId;

    fn sample_shard(session: &str) -> Shard {
        Shard {
            session_id: SessionId::from(session),
            version: 3,
            index: 2,
            threshold: 2,
            total: 3,
            holder_device_id: DeviceId::from("holder"),
            payload: vec![7, 8, 9],
        }
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileShardStore::new(dir.path().to_path_buf());

        let loaded = store.load_shard(&SessionId::from("absent")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn persist_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileShardStore::new(dir.path().join("nested"));
        let shard = sample_shard("s1");

        store.persist_shard(&shard).await.unwrap();

        let loaded = store.load_shard(&shard.session_id).await.unwrap();
        assert_eq!(loaded, Some(shard));

        let tmp = dir.path().join("nested").join("shard-s1.json.tmp");
        assert!(!tmp.exists(), "tmp file should be removed after rename");
    }

    #[tokio::test]
    async fn persisting_again_replaces_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileShardStore::new(dir.path().to_path_buf());
        let mut shard = sample_shard("s1");
        store.persist_shard(&shard).await.unwrap();

        shard.version = 4;
        store.persist_shard(&shard).await.unwrap();

        let loaded = store.load_shard(&shard.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 4);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileShardStore::new(dir.path().to_path_buf());
        tokio::fs::write(dir.path().join("shard-bad.json"), "not-json")
            .await
            .unwrap();

        let err = store.load_shard(&SessionId::from("bad")).await.unwrap_err();
        assert!(matches!(err, ShardStoreError::Corrupt(_)));
    }
}
