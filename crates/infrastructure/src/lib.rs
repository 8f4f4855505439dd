//! Infrastructure adapters: the artifact store, the documentation
//! variant catalog, and the external syntax-check command.
//!
//! The orchestration layer depends only on the traits defined here (and
//! on `SyntaxChecker` from the application layer); the filesystem and
//! subprocess implementations are the defaults wired in by binaries.

pub mod catalog;
pub mod store;
pub mod syntax_check;

pub use catalog::{FsVariantCatalog, VariantCatalog};
pub use store::{FsStore, Store};
pub use syntax_check::CommandSyntaxChecker;
