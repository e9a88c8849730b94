use crate::change::SchemaChange;
use crate::error::{MigrationError, Result};
use crate::migration::Migration;
use crate::store::MigrationStore;
use auth_rules::{AppliedMigration, AuthzError, SchemaRegistry, SchemaSnapshot, SchemaState};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMigration {
    pub version: u64,
    pub name: String,
}

/// Where the schema stands relative to the known migration set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub current_version: Option<u64>,
    pub applied: Vec<AppliedMigration>,
    pub pending: Vec<PendingMigration>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current_version {
            Some(v) => writeln!(f, "Current version: {v}")?,
            None => writeln!(f, "Current version: none")?,
        }
        for m in &self.applied {
            writeln!(
                f,
                "  [applied] {}_{} at {}",
                m.version,
                m.name,
                m.applied_at.to_rfc3339()
            )?;
        }
        for m in &self.pending {
            writeln!(f, "  [pending] {}_{}", m.version, m.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// Applies migrations to the registry one atomic step at a time
///
/// Every step builds a complete [`SchemaSnapshot`] from a working copy of the
/// state, persists it, and only then installs it. A failing step leaves the
/// store and the registry untouched.
pub struct Migrator {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn MigrationStore>,
    migrations: Vec<Migration>,
    /// Serialises migrations; holds whether the store has been read
    loaded: Mutex<bool>,
}

impl Migrator {
    /// # Errors
    ///
    /// Returns [`MigrationError::DuplicateVersion`] when two migrations share a version.
    pub fn new(
        registry: Arc<SchemaRegistry>,
        store: Arc<dyn MigrationStore>,
        mut migrations: Vec<Migration>,
    ) -> Result<Self> {
        migrations.sort_by_key(|m| m.version);
        let mut seen = BTreeSet::new();
        for m in &migrations {
            if !seen.insert(m.version) {
                return Err(MigrationError::DuplicateVersion(m.version));
            }
        }

        Ok(Self {
            registry,
            store,
            migrations,
            loaded: Mutex::new(false),
        })
    }

    /// [`Migrator::new`] followed by [`Migrator::load`]
    ///
    /// # Errors
    ///
    /// Duplicate versions, store failures, or a persisted schema that no longer builds.
    pub async fn open(
        registry: Arc<SchemaRegistry>,
        store: Arc<dyn MigrationStore>,
        migrations: Vec<Migration>,
    ) -> Result<Self> {
        let migrator = Self::new(registry, store, migrations)?;
        migrator.load().await?;
        Ok(migrator)
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Install the persisted state into the registry
    ///
    /// # Errors
    ///
    /// Store failures, or a persisted schema that no longer builds.
    pub async fn load(&self) -> Result<SchemaState> {
        let mut loaded = self.loaded.lock().await;
        let state = self.install_persisted().await?;
        *loaded = true;
        Ok(state)
    }

    async fn install_persisted(&self) -> Result<SchemaState> {
        let state = self.store.load().await?;
        let snapshot = SchemaSnapshot::build(state.clone())?;
        self.registry.install(snapshot);
        info!(version = ?state.version(), "Loaded schema state");
        Ok(state)
    }

    /// Read the store once before the first step, so applied versions come
    /// from what was persisted
    async fn ensure_loaded(&self, loaded: &mut bool) -> Result<()> {
        if !*loaded {
            self.install_persisted().await?;
            *loaded = true;
        }
        Ok(())
    }

    /// Apply every pending migration in version order
    ///
    /// # Errors
    ///
    /// The first failing step; earlier steps stay applied.
    pub async fn up(&self) -> Result<Vec<u64>> {
        self.up_to(u64::MAX).await
    }

    /// Apply pending migrations with a version up to and including `target`
    ///
    /// # Errors
    ///
    /// The first failing step; earlier steps stay applied.
    pub async fn up_to(&self, target: u64) -> Result<Vec<u64>> {
        let mut loaded = self.loaded.lock().await;
        self.ensure_loaded(&mut loaded).await?;
        let mut applied = Vec::new();

        for migration in self.migrations.iter().filter(|m| m.version <= target) {
            if self.registry.snapshot().state().is_applied(migration.version) {
                debug!("Skipping applied migration {}", migration);
                continue;
            }
            self.step(migration, Direction::Up).await?;
            applied.push(migration.version);
        }

        if applied.is_empty() {
            info!("Schema is up to date");
        }
        Ok(applied)
    }

    /// Revert the `steps` most recently applied migrations
    ///
    /// # Errors
    ///
    /// [`MigrationError::InconsistentState`] when an applied version has no
    /// known migration, or the first failing step.
    pub async fn down(&self, steps: usize) -> Result<Vec<u64>> {
        let mut loaded = self.loaded.lock().await;
        self.ensure_loaded(&mut loaded).await?;
        let mut versions: Vec<u64> = self
            .registry
            .snapshot()
            .state()
            .applied
            .iter()
            .map(|m| m.version)
            .collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));

        let mut reverted = Vec::new();
        for version in versions.into_iter().take(steps) {
            let migration = self
                .migrations
                .iter()
                .find(|m| m.version == version)
                .ok_or_else(|| {
                    MigrationError::InconsistentState(format!(
                        "Applied version {version} has no known migration"
                    ))
                })?;
            self.step(migration, Direction::Down).await?;
            reverted.push(version);
        }
        Ok(reverted)
    }

    /// Status of the installed schema; call [`Migrator::load`] first to
    /// report on a persisted state
    pub fn status(&self) -> MigrationStatus {
        let snapshot = self.registry.snapshot();
        let state = snapshot.state();

        let mut applied = state.applied.clone();
        applied.sort_by_key(|m| m.version);

        let pending = self
            .migrations
            .iter()
            .filter(|m| !state.is_applied(m.version))
            .map(|m| PendingMigration {
                version: m.version,
                name: m.name.clone(),
            })
            .collect();

        MigrationStatus {
            current_version: state.version(),
            applied,
            pending,
        }
    }

    async fn step(&self, migration: &Migration, direction: Direction) -> Result<()> {
        let mut state = self.registry.snapshot().state().clone();

        let changes: &[SchemaChange] = match direction {
            Direction::Up => &migration.up,
            Direction::Down => &migration.down,
        };
        for change in changes {
            change.apply(&mut state).map_err(|e| match e {
                MigrationError::InvalidChange(message) => {
                    MigrationError::step(migration.version, &migration.name, AuthzError::InvalidSchema(message))
                }
                other => other,
            })?;
        }

        match direction {
            Direction::Up => state.applied.push(AppliedMigration {
                version: migration.version,
                name: migration.name.clone(),
                applied_at: Utc::now(),
            }),
            Direction::Down => state.applied.retain(|m| m.version != migration.version),
        }

        let snapshot = SchemaSnapshot::build(state).map_err(|e| {
            warn!("Migration {} rejected: {}", migration, e);
            MigrationError::step(migration.version, &migration.name, e)
        })?;

        self.store.save(snapshot.state()).await?;
        self.registry.install(snapshot);

        info!(
            version = migration.version,
            name = %migration.name,
            direction = ?direction,
            "Migration step committed"
        );
        Ok(())
    }
}
