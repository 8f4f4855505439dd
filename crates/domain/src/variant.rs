//! Documentation variant metadata.

use serde::{Deserialize, Serialize};

/// One version of the reference documentation given to the model.
///
/// The harness only cares about the name and byte size; `blob` is an
/// opaque reference resolved by the variant catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub size_bytes: u64,
    /// Opaque reference to the documentation blob (a path, URL, or key).
    pub blob: String,
}

impl Variant {
    pub fn new(name: impl Into<String>, size_bytes: u64, blob: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            blob: blob.into(),
        }
    }
}
