use anyhow::{bail, Context, Result};
use auth_rules::{
    AccessDecisionPoint, AccessRequest, Identity, InMemoryRecordRepository, OperationKind, Record,
    SchemaRegistry,
};
use colored::Colorize;
use config_engine::EngineConfig;
use schema_migrations::{learnmap_migrations, JsonFileMigrationStore, Migrator};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Registry and migrator bound to the configured state file
pub struct Workspace {
    config: EngineConfig,
    migrator: Migrator,
}

impl Workspace {
    /// Open the state file and install its schema
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let store = Arc::new(JsonFileMigrationStore::new(&config.migrations.state_path));
        let migrator = Migrator::open(Arc::new(SchemaRegistry::new()), store, learnmap_migrations())
            .await
            .with_context(|| {
                format!(
                    "failed to load schema state from {}",
                    config.migrations.state_path.display()
                )
            })?;
        Ok(Self { config, migrator })
    }

    fn registry(&self) -> &Arc<SchemaRegistry> {
        self.migrator.registry()
    }

    // =========================================================================
    // migrate
    // =========================================================================

    pub async fn migrate_up(&self, to: Option<u64>) -> Result<String> {
        let applied = self.migrator.up_to(to.unwrap_or(u64::MAX)).await?;
        if applied.is_empty() {
            return Ok(format!("{}", "Schema is up to date".green()));
        }
        Ok(self.report("Applied", &applied))
    }

    pub async fn migrate_down(&self, steps: usize) -> Result<String> {
        let reverted = self.migrator.down(steps).await?;
        if reverted.is_empty() {
            return Ok(format!("{}", "Nothing to revert".yellow()));
        }
        Ok(self.report("Reverted", &reverted))
    }

    pub fn migrate_status(&self) -> String {
        self.migrator.status().to_string()
    }

    fn report(&self, verb: &str, versions: &[u64]) -> String {
        let mut out = format!("{} {} migration(s)", verb.green().bold(), versions.len());
        for version in versions {
            let name = self
                .migrator
                .migrations()
                .iter()
                .find(|m| m.version == *version)
                .map_or("", |m| m.name.as_str());
            out.push_str(&format!("\n  {version}_{name}"));
        }
        out
    }

    // =========================================================================
    // schema / rule
    // =========================================================================

    pub fn schema_show(&self, collection: Option<&str>) -> Result<String> {
        let yaml = match collection {
            Some(name) => serde_yaml::to_string(&self.registry().get_collection(name)?)?,
            None => serde_yaml::to_string(self.registry().snapshot().collections())?,
        };
        Ok(yaml)
    }

    pub fn rule_compile(&self, collection: &str, op: OperationKind, rule: &str) -> Result<String> {
        let predicate = self.registry().compile_rule(collection, op, rule)?;
        let lookups = if predicate.needs_lookups() { "yes" } else { "no" };
        Ok(format!(
            "{}\n{} {}\nrelation lookups: {}",
            "Rule compiled".green().bold(),
            format!("{}.{}:", predicate.collection(), op.rule_key()).bold(),
            predicate,
            lookups
        ))
    }

    // =========================================================================
    // authorize
    // =========================================================================

    pub async fn authorize(
        &self,
        collection: &str,
        op: OperationKind,
        identity: Identity,
        record: &Path,
        data: Option<&Path>,
        trace: bool,
    ) -> Result<String> {
        let record: Record = read_json(record)?;
        let repository = match data {
            Some(path) => {
                let dataset: HashMap<String, Vec<Record>> = read_json(path)?;
                InMemoryRecordRepository::from_dataset(dataset)?
            }
            None => InMemoryRecordRepository::new(),
        };
        debug!(records = repository.len(), "Loaded dataset");

        let adp = AccessDecisionPoint::new(self.registry().clone(), Arc::new(repository))
            .with_lookup_timeout(self.config.authz.lookup_timeout())
            .with_debug(trace || self.config.authz.debug);

        let request = AccessRequest {
            collection: collection.to_string(),
            operation: op,
            identity,
            record,
        };
        let Some(response) = adp.batch_authorize(vec![request]).await.into_iter().next() else {
            bail!("no decision returned");
        };

        let mut out = if response.decision.is_allowed() {
            format!("{}", response.decision.to_string().green().bold())
        } else {
            format!("{}", response.decision.to_string().red().bold())
        };
        for line in response.debug_trace.unwrap_or_default() {
            out.push_str(&format!("\n  {}", line.dimmed()));
        }
        Ok(out)
    }
}

/// Identity from the `--identity`/`--role` flags
pub fn identity_from_flags(id: Option<&str>, role: Option<&str>) -> Identity {
    match (id, role) {
        (Some(id), Some(role)) => Identity::new(id).with_role(role),
        (Some(id), None) => Identity::new(id),
        (None, _) => Identity::anonymous(),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("invalid JSON in {}", path.display()))
}
