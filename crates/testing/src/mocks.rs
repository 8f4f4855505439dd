//! In-memory mock implementations for the harness seams.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use docbench_application::{CheckOutcome, SyntaxChecker};
use docbench_domain::{
    Artifact, ArtifactId, Collection, CollectionName, Error, EvalResult, Result, Variant,
};
use docbench_harness::{Clock, ModelClient, ModelResponse, TokenUsage};
use docbench_infrastructure::{Store, VariantCatalog};

/// Scripted model client.
///
/// Answers are keyed by test id; each invocation returns a JSON object for
/// the ids it finds quoted in the prompt. Failures and delays are scripted
/// against prompt substrings, so a test can target the batch containing a
/// particular test id.
pub struct MockModelClient {
    answers: BTreeMap<String, String>,
    failures: Mutex<Vec<(String, VecDeque<Error>)>>,
    delays: Vec<(String, Duration)>,
    calls: AtomicU32,
}

impl MockModelClient {
    pub fn new(answers: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            failures: Mutex::new(Vec::new()),
            delays: Vec::new(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn answering(pairs: &[(&str, &str)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(id, code)| (id.to_string(), code.to_string())),
        )
    }

    /// Queue failures for every invocation whose prompt contains
    /// `needle`; once the queue drains, those invocations succeed.
    pub fn fail_for(self, needle: &str, errors: Vec<Error>) -> Self {
        self.failures
            .lock()
            .push((needle.to_string(), errors.into()));
        self
    }

    /// Delay every invocation whose prompt contains `needle`.
    pub fn delay_for(mut self, needle: &str, delay: Duration) -> Self {
        self.delays.push((needle.to_string(), delay));
        self
    }

    /// Delay every invocation.
    pub fn delay_all(self, delay: Duration) -> Self {
        self.delay_for("", delay)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn invoke(
        &self,
        prompt: &str,
        _temperature: f64,
        _max_tokens: u32,
        _timeout: Duration,
    ) -> Result<ModelResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .delays
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, d)| *d);
        match delay {
            // Always suspend so cancellation has a point to land on.
            Some(d) => tokio::time::sleep(d).await,
            None => tokio::task::yield_now().await,
        }

        let scripted = {
            let mut failures = self.failures.lock();
            failures
                .iter_mut()
                .find(|(needle, queue)| prompt.contains(needle.as_str()) && !queue.is_empty())
                .and_then(|(_, queue)| queue.pop_front())
        };
        if let Some(error) = scripted {
            return Err(error);
        }

        let mut object = serde_json::Map::new();
        for (id, code) in &self.answers {
            if prompt.contains(&format!("\"{id}\"")) {
                object.insert(id.clone(), serde_json::Value::String(code.clone()));
            }
        }
        let text = serde_json::to_string(&serde_json::Value::Object(object))
            .expect("mock response serialization");

        Ok(ModelResponse {
            text,
            usage: TokenUsage {
                prompt_tokens: prompt.len() as u32 / 4,
                completion_tokens: 64,
            },
        })
    }
}

/// In-memory store with the same semantics as the filesystem store.
#[derive(Default)]
pub struct MemoryStore {
    artifacts: RwLock<HashMap<ArtifactId, Artifact>>,
    evals: RwLock<HashMap<ArtifactId, EvalResult>>,
    collections: RwLock<HashMap<CollectionName, Collection>>,
    fail_artifact_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent artifact writes fail with `StorePersist`.
    pub fn fail_artifact_writes(&self) {
        self.fail_artifact_writes.store(true, Ordering::SeqCst);
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.read().len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn write_artifact(&self, artifact: &Artifact) -> Result<()> {
        if self.fail_artifact_writes.load(Ordering::SeqCst) {
            return Err(Error::StorePersist("simulated write failure".into()));
        }
        self.artifacts
            .write()
            .insert(artifact.id.clone(), artifact.clone());
        Ok(())
    }

    async fn read_artifact(&self, id: &ArtifactId) -> Result<Artifact> {
        self.artifacts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("artifact {id}")))
    }

    async fn list_artifacts(&self) -> Result<Vec<ArtifactId>> {
        let mut ids: Vec<ArtifactId> = self.artifacts.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete_artifact(&self, id: &ArtifactId) -> Result<()> {
        let referencing = self
            .collections
            .read()
            .values()
            .find(|c| c.contains(id))
            .map(|c| c.name.clone());
        if let Some(name) = referencing {
            return Err(Error::BadRequest(format!(
                "artifact {id} is referenced by collection '{name}'"
            )));
        }
        self.artifacts
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("artifact {id}")))
    }

    async fn write_eval_result(&self, result: &EvalResult) -> Result<()> {
        if !self.artifacts.read().contains_key(&result.artifact_id) {
            return Err(Error::NotFound(format!("artifact {}", result.artifact_id)));
        }
        self.evals
            .write()
            .insert(result.artifact_id.clone(), result.clone());
        Ok(())
    }

    async fn read_eval_result(&self, id: &ArtifactId) -> Result<Option<EvalResult>> {
        Ok(self.evals.read().get(id).cloned())
    }

    async fn create_collection(
        &self,
        name: &CollectionName,
        ids: &[ArtifactId],
    ) -> Result<Collection> {
        if self.collections.read().contains_key(name) {
            return Err(Error::BadRequest(format!("collection '{name}' already exists")));
        }
        let artifacts = self.artifacts.read();
        for id in ids {
            if !artifacts.contains_key(id) {
                return Err(Error::NotFound(format!("artifact {id}")));
            }
        }
        let metadata = ids.first().map(|id| artifacts[id].metadata.clone());
        drop(artifacts);

        let collection = Collection::new(name.clone(), ids.to_vec(), metadata, Utc::now());
        self.collections
            .write()
            .insert(name.clone(), collection.clone());
        Ok(collection)
    }

    async fn add_to_collection(&self, name: &CollectionName, id: &ArtifactId) -> Result<()> {
        let metadata = self
            .artifacts
            .read()
            .get(id)
            .map(|a| a.metadata.clone())
            .ok_or_else(|| Error::NotFound(format!("artifact {id}")))?;

        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))?;
        collection.add(id.clone());
        if collection.metadata.is_none() {
            collection.metadata = Some(metadata);
        }
        Ok(())
    }

    async fn remove_from_collection(&self, name: &CollectionName, id: &ArtifactId) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))?;
        collection.remove(id);
        Ok(())
    }

    async fn delete_collection(&self, name: &CollectionName) -> Result<()> {
        self.collections.write().remove(name);
        Ok(())
    }

    async fn read_collection(&self, name: &CollectionName) -> Result<Collection> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let mut collections: Vec<Collection> = self.collections.read().values().cloned().collect();
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(collections)
    }
}

/// Catalog with fixed in-memory variants.
#[derive(Default)]
pub struct StaticVariantCatalog {
    variants: HashMap<String, String>,
}

impl StaticVariantCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variant(mut self, name: &str, content: &str) -> Self {
        self.variants.insert(name.to_string(), content.to_string());
        self
    }
}

#[async_trait]
impl VariantCatalog for StaticVariantCatalog {
    async fn get(&self, name: &str) -> Result<Variant> {
        let content = self
            .variants
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("variant '{name}'")))?;
        Ok(Variant::new(name, content.len() as u64, name))
    }

    async fn list(&self) -> Result<Vec<Variant>> {
        let mut variants: Vec<Variant> = self
            .variants
            .iter()
            .map(|(name, content)| Variant::new(name, content.len() as u64, name))
            .collect();
        variants.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(variants)
    }

    async fn content(&self, variant: &Variant) -> Result<String> {
        self.variants
            .get(&variant.blob)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("variant blob '{}'", variant.blob)))
    }
}

/// Syntax checker that fails when the code contains a scripted needle.
#[derive(Default)]
pub struct MockSyntaxChecker {
    fail_needles: Vec<String>,
}

impl MockSyntaxChecker {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_needles: vec![needle.to_string()],
        }
    }
}

#[async_trait]
impl SyntaxChecker for MockSyntaxChecker {
    async fn check(&self, code: &str) -> CheckOutcome {
        for needle in &self.fail_needles {
            if code.contains(needle) {
                return CheckOutcome::fail(vec![format!("Error: found '{needle}'")]);
            }
        }
        CheckOutcome::pass()
    }
}

/// Clock pinned to a fixed wall time.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}
