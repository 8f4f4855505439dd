//! Documentation variant catalog.
//!
//! Variants are documentation files named `<prefix><variant>.txt` in a
//! release directory. The catalog exposes their byte sizes as metadata
//! and resolves blobs to content on demand.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

use docbench_domain::{Error, Result, Variant};

/// Lookup of documentation variants.
#[async_trait]
pub trait VariantCatalog: Send + Sync {
    async fn get(&self, name: &str) -> Result<Variant>;
    async fn list(&self) -> Result<Vec<Variant>>;
    /// Resolve a variant's blob reference to the documentation text.
    async fn content(&self, variant: &Variant) -> Result<String>;
}

/// Catalog over a directory of documentation files.
pub struct FsVariantCatalog {
    dir: PathBuf,
    prefix: String,
}

impl FsVariantCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "llmdocs-".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}.txt", self.prefix, name))
    }
}

#[async_trait]
impl VariantCatalog for FsVariantCatalog {
    async fn get(&self, name: &str) -> Result<Variant> {
        let path = self.path_for(name);
        let meta = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound(format!("variant '{name}'"))
            } else {
                Error::StorePersist(format!("stat {}: {e}", path.display()))
            }
        })?;
        Ok(Variant::new(name, meta.len(), path.display().to_string()))
    }

    async fn list(&self) -> Result<Vec<Variant>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::StorePersist(format!("list variants: {e}"))),
        };

        let mut variants = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::StorePersist(format!("list variants: {e}")))?
        {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = file_name
                .strip_prefix(&self.prefix)
                .and_then(|rest| rest.strip_suffix(".txt"))
            else {
                continue;
            };
            let meta = entry
                .metadata()
                .await
                .map_err(|e| Error::StorePersist(format!("stat {file_name}: {e}")))?;
            variants.push(Variant::new(stem, meta.len(), entry.path().display().to_string()));
        }
        variants.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(variants)
    }

    async fn content(&self, variant: &Variant) -> Result<String> {
        tokio::fs::read_to_string(&variant.blob).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound(format!("variant blob '{}'", variant.blob))
            } else {
                Error::StorePersist(format!("read {}: {e}", variant.blob))
            }
        })
    }
}
