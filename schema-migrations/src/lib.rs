//! # Schema Migrations
//!
//! Versioned, reversible structural changes for the Learnmap schema registry.
//!
//! A [`Migrator`] owns the ordered migration list, a [`MigrationStore`] that
//! persists the schema state, and the shared [`auth_rules::SchemaRegistry`].
//! Each step is atomic: the new snapshot is fully built and validated before it
//! is persisted and swapped into the registry.
//!
//! ```no_run
//! use auth_rules::SchemaRegistry;
//! use schema_migrations::{learnmap_migrations, JsonFileMigrationStore, Migrator};
//! use std::sync::Arc;
//!
//! # async fn run() -> schema_migrations::Result<()> {
//! let registry = Arc::new(SchemaRegistry::new());
//! let store = Arc::new(JsonFileMigrationStore::new("learnmap-schema.json"));
//! let migrator = Migrator::open(registry, store, learnmap_migrations()).await?;
//! migrator.up().await?;
//! println!("{}", migrator.status());
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod change;
pub mod error;
pub mod migration;
pub mod migrator;
pub mod store;

pub use builtin::learnmap_migrations;
pub use change::SchemaChange;
pub use error::{MigrationError, Result};
pub use migration::Migration;
pub use migrator::{MigrationStatus, Migrator, PendingMigration};
pub use store::{InMemoryMigrationStore, JsonFileMigrationStore, MigrationStore};
