//! Artifact and collection persistence.
//!
//! Each artifact lives in its own directory as a `responses.json` plus an
//! optional `eval.json`; collections are manifest files under
//! `collections/`. Writes go through a temp file and an atomic rename so
//! readers never observe partial artifacts, and writes to the same
//! artifact id are serialized through a per-id lock. Reads are
//! concurrent.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use docbench_domain::{
    Artifact, ArtifactId, Collection, CollectionName, Error, EvalResult, Result,
};

const RESPONSES_FILE: &str = "responses.json";
const EVAL_FILE: &str = "eval.json";
const COLLECTIONS_DIR: &str = "collections";

/// Persistence operations the harness depends on.
#[async_trait]
pub trait Store: Send + Sync {
    async fn write_artifact(&self, artifact: &Artifact) -> Result<()>;
    async fn read_artifact(&self, id: &ArtifactId) -> Result<Artifact>;
    async fn list_artifacts(&self) -> Result<Vec<ArtifactId>>;
    /// Refused with `BadRequest` while any non-empty collection references
    /// the artifact.
    async fn delete_artifact(&self, id: &ArtifactId) -> Result<()>;

    async fn write_eval_result(&self, result: &EvalResult) -> Result<()>;
    async fn read_eval_result(&self, id: &ArtifactId) -> Result<Option<EvalResult>>;

    async fn create_collection(
        &self,
        name: &CollectionName,
        ids: &[ArtifactId],
    ) -> Result<Collection>;
    async fn add_to_collection(&self, name: &CollectionName, id: &ArtifactId) -> Result<()>;
    async fn remove_from_collection(&self, name: &CollectionName, id: &ArtifactId) -> Result<()>;
    async fn delete_collection(&self, name: &CollectionName) -> Result<()>;
    async fn read_collection(&self, name: &CollectionName) -> Result<Collection>;
    async fn list_collections(&self) -> Result<Vec<Collection>>;
}

/// Filesystem-backed store.
pub struct FsStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn artifact_dir(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn collection_path(&self, name: &CollectionName) -> PathBuf {
        self.root.join(COLLECTIONS_DIR).join(format!("{name}.json"))
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Serialize `value` and atomically replace `path` with it.
    async fn write_json_atomic<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::StorePersist(format!("no parent for {}", path.display())))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::StorePersist(format!("create {}: {e}", parent.display())))?;

        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| Error::StorePersist(format!("serialize {}: {e}", path.display())))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| Error::StorePersist(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::StorePersist(format!("rename to {}: {e}", path.display())))?;
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
        what: &str,
    ) -> Result<T> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound(what.to_string())
            } else {
                Error::StorePersist(format!("read {}: {e}", path.display()))
            }
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::StorePersist(format!("parse {}: {e}", path.display())))
    }

    /// Collections that currently reference the given artifact.
    async fn referencing_collections(&self, id: &ArtifactId) -> Result<Vec<CollectionName>> {
        let mut referencing = Vec::new();
        for collection in self.list_collections().await? {
            if collection.contains(id) {
                referencing.push(collection.name);
            }
        }
        Ok(referencing)
    }
}

#[async_trait]
impl Store for FsStore {
    #[instrument(skip(self, artifact), fields(artifact_id = %artifact.id))]
    async fn write_artifact(&self, artifact: &Artifact) -> Result<()> {
        let guard = self.lock_for(artifact.id.as_str());
        let _held = guard.lock().await;
        let path = self.artifact_dir(&artifact.id).join(RESPONSES_FILE);
        self.write_json_atomic(&path, artifact).await?;
        debug!("artifact persisted");
        Ok(())
    }

    async fn read_artifact(&self, id: &ArtifactId) -> Result<Artifact> {
        let path = self.artifact_dir(id).join(RESPONSES_FILE);
        self.read_json(&path, &format!("artifact {id}")).await
    }

    async fn list_artifacts(&self) -> Result<Vec<ArtifactId>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::StorePersist(format!("list artifacts: {e}"))),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::StorePersist(format!("list artifacts: {e}")))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == COLLECTIONS_DIR {
                continue;
            }
            if entry.path().join(RESPONSES_FILE).exists() {
                ids.push(ArtifactId::from(name));
            }
        }
        ids.sort();
        Ok(ids)
    }

    #[instrument(skip(self), fields(artifact_id = %id))]
    async fn delete_artifact(&self, id: &ArtifactId) -> Result<()> {
        let referencing = self.referencing_collections(id).await?;
        if let Some(name) = referencing.first() {
            return Err(Error::BadRequest(format!(
                "artifact {id} is referenced by collection '{name}'"
            )));
        }

        let guard = self.lock_for(id.as_str());
        let _held = guard.lock().await;
        let dir = self.artifact_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("artifact {id}")))
            }
            Err(e) => Err(Error::StorePersist(format!("delete {}: {e}", dir.display()))),
        }
    }

    #[instrument(skip(self, result), fields(artifact_id = %result.artifact_id))]
    async fn write_eval_result(&self, result: &EvalResult) -> Result<()> {
        let dir = self.artifact_dir(&result.artifact_id);
        if !dir.join(RESPONSES_FILE).exists() {
            return Err(Error::NotFound(format!("artifact {}", result.artifact_id)));
        }
        let guard = self.lock_for(result.artifact_id.as_str());
        let _held = guard.lock().await;
        self.write_json_atomic(&dir.join(EVAL_FILE), result).await
    }

    async fn read_eval_result(&self, id: &ArtifactId) -> Result<Option<EvalResult>> {
        let path = self.artifact_dir(id).join(EVAL_FILE);
        match self.read_json(&path, &format!("evaluation of {id}")).await {
            Ok(result) => Ok(Some(result)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, ids), fields(collection = %name, members = ids.len()))]
    async fn create_collection(
        &self,
        name: &CollectionName,
        ids: &[ArtifactId],
    ) -> Result<Collection> {
        let path = self.collection_path(name);
        if path.exists() {
            return Err(Error::BadRequest(format!("collection '{name}' already exists")));
        }
        for id in ids {
            // Members must exist; collections hold references, not copies.
            self.read_artifact(id).await?;
        }
        let metadata = match ids.first() {
            Some(first) => Some(self.read_artifact(first).await?.metadata),
            None => None,
        };

        let collection = Collection::new(
            name.clone(),
            ids.to_vec(),
            metadata,
            chrono::Utc::now(),
        );
        let guard = self.lock_for(&format!("{COLLECTIONS_DIR}/{name}"));
        let _held = guard.lock().await;
        self.write_json_atomic(&path, &collection).await?;
        Ok(collection)
    }

    async fn add_to_collection(&self, name: &CollectionName, id: &ArtifactId) -> Result<()> {
        let artifact = self.read_artifact(id).await?;
        let guard = self.lock_for(&format!("{COLLECTIONS_DIR}/{name}"));
        let _held = guard.lock().await;

        let mut collection = self.read_collection(name).await?;
        collection.add(id.clone());
        if collection.metadata.is_none() {
            collection.metadata = Some(artifact.metadata);
        }
        self.write_json_atomic(&self.collection_path(name), &collection)
            .await
    }

    async fn remove_from_collection(&self, name: &CollectionName, id: &ArtifactId) -> Result<()> {
        let guard = self.lock_for(&format!("{COLLECTIONS_DIR}/{name}"));
        let _held = guard.lock().await;

        let mut collection = self.read_collection(name).await?;
        if !collection.remove(id) {
            warn!(collection = %name, artifact_id = %id, "remove of non-member ignored");
        }
        self.write_json_atomic(&self.collection_path(name), &collection)
            .await
    }

    async fn delete_collection(&self, name: &CollectionName) -> Result<()> {
        let guard = self.lock_for(&format!("{COLLECTIONS_DIR}/{name}"));
        let _held = guard.lock().await;
        match tokio::fs::remove_file(self.collection_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::StorePersist(format!("delete collection '{name}': {e}"))),
        }
    }

    async fn read_collection(&self, name: &CollectionName) -> Result<Collection> {
        self.read_json(&self.collection_path(name), &format!("collection '{name}'"))
            .await
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let dir = self.root.join(COLLECTIONS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::StorePersist(format!("list collections: {e}"))),
        };

        let mut collections = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::StorePersist(format!("list collections: {e}")))?
        {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_json::<Collection>(&entry.path(), "collection").await {
                Ok(collection) => collections.push(collection),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping unreadable collection"),
            }
        }
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(collections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docbench_domain::{ArtifactMetadata, RunId};
    use std::collections::BTreeMap;

    fn artifact(id: &str) -> Artifact {
        let mut responses = BTreeMap::new();
        responses.insert("t1".to_string(), "code".to_string());
        Artifact {
            id: ArtifactId::from(id),
            run_id: RunId::new(),
            responses,
            metadata: ArtifactMetadata {
                model: "m".into(),
                variant: "core".into(),
                suite: "full".into(),
                total_tests: 1,
                num_batches: 1,
                batch_size: Some(1),
                custom_batch_sizes: None,
                temperature: 0.1,
                max_tokens: 16_000,
                created_at: Utc::now(),
                missing: vec![],
            },
        }
    }

    fn name(s: &str) -> CollectionName {
        CollectionName::new(s).unwrap()
    }

    #[tokio::test]
    async fn artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        let a = artifact("m-core-20240101_000000");
        store.write_artifact(&a).await.unwrap();

        let back = store.read_artifact(&a.id).await.unwrap();
        assert_eq!(back.responses["t1"], "code");
        assert_eq!(back.metadata.model, "m");

        let ids = store.list_artifacts().await.unwrap();
        assert_eq!(ids, vec![a.id.clone()]);
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let err = store.read_artifact(&ArtifactId::from("nope")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn eval_result_absent_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let a = artifact("m-core-20240101_000001");
        store.write_artifact(&a).await.unwrap();

        assert!(store.read_eval_result(&a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_refused_while_referenced() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let a = artifact("m-core-20240101_000002");
        store.write_artifact(&a).await.unwrap();
        store
            .create_collection(&name("keepers"), std::slice::from_ref(&a.id))
            .await
            .unwrap();

        let err = store.delete_artifact(&a.id).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        store
            .remove_from_collection(&name("keepers"), &a.id)
            .await
            .unwrap();
        store.delete_artifact(&a.id).await.unwrap();
        assert!(store.list_artifacts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collection_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let a = artifact("m-core-20240101_000003");
        let b = artifact("m-core-20240101_000004");
        store.write_artifact(&a).await.unwrap();
        store.write_artifact(&b).await.unwrap();

        let created = store
            .create_collection(&name("baseline"), std::slice::from_ref(&a.id))
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert!(created.metadata.is_some());

        store.add_to_collection(&name("baseline"), &b.id).await.unwrap();
        let read = store.read_collection(&name("baseline")).await.unwrap();
        assert_eq!(read.len(), 2);

        assert!(store
            .create_collection(&name("baseline"), &[])
            .await
            .is_err());

        store.delete_collection(&name("baseline")).await.unwrap();
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collection_rejects_unknown_members() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let err = store
            .create_collection(&name("ghosts"), &[ArtifactId::from("missing")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
