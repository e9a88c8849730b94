use crate::{
    error::{AuthzError, Result},
    graph::RelationGraph,
    models::OperationKind,
    rules::Predicate,
    schema::{CollectionDef, SchemaState},
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// An immutable, fully validated view of the schema.
///
/// Every rule text in the state is compiled when the snapshot is built, so a
/// snapshot that exists never holds a malformed rule or an unresolvable path.
#[derive(Debug, Default)]
pub struct SchemaSnapshot {
    state: SchemaState,
    graph: RelationGraph,
    rules: HashMap<(String, OperationKind), Arc<Predicate>>,
}

impl SchemaSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate a schema state and compile all of its rules
    ///
    /// # Errors
    ///
    /// [`AuthzError::InvalidSchema`] for structural problems,
    /// [`AuthzError::Config`] for dangling relations or rule paths and
    /// [`AuthzError::Parse`] for malformed rule text.
    pub fn build(state: SchemaState) -> Result<Self> {
        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for collection in &state.collections {
            collection.validate()?;
            if !names.insert(collection.name.as_str()) {
                return Err(AuthzError::InvalidSchema(format!(
                    "Duplicate collection name '{}'",
                    collection.name
                )));
            }
            if !ids.insert(collection.id.as_str()) {
                return Err(AuthzError::InvalidSchema(format!(
                    "Duplicate collection id '{}'",
                    collection.id
                )));
            }
        }

        let graph = RelationGraph::build(&state.collections)?;

        let mut rules = HashMap::new();
        for collection in &state.collections {
            for (op, text) in collection.rules.iter() {
                let predicate = Predicate::compile(&graph, &collection.name, op, text)?;
                rules.insert((collection.name.clone(), op), Arc::new(predicate));
            }
        }

        Ok(Self {
            state,
            graph,
            rules,
        })
    }

    pub fn state(&self) -> &SchemaState {
        &self.state
    }

    pub fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    /// Highest applied migration version
    pub fn version(&self) -> Option<u64> {
        self.state.version()
    }

    pub fn collections(&self) -> &[CollectionDef] {
        &self.state.collections
    }

    /// Look up a collection by name or id
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::CollectionNotFound`] when absent.
    pub fn get_collection(&self, name: &str) -> Result<&CollectionDef> {
        self.state
            .find_collection(name)
            .ok_or_else(|| AuthzError::CollectionNotFound(name.to_string()))
    }

    /// Compiled rule for a slot; `Ok(None)` when the slot is unset
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::CollectionNotFound`] for unknown collections.
    pub fn get_rule(&self, collection: &str, op: OperationKind) -> Result<Option<Arc<Predicate>>> {
        let def = self.get_collection(collection)?;
        Ok(self.rules.get(&(def.name.clone(), op)).cloned())
    }

    /// Compile rule text against this snapshot without registering it
    ///
    /// # Errors
    ///
    /// Unknown collection, parse and path resolution errors.
    pub fn compile_rule(&self, collection: &str, op: OperationKind, text: &str) -> Result<Predicate> {
        let def = self.get_collection(collection)?;
        Predicate::compile(&self.graph, &def.name, op, text)
    }
}

/// Read-mostly holder of the current schema snapshot.
///
/// Readers take an `Arc` to the current snapshot and keep it for the whole
/// decision. The migration engine builds a new snapshot off to the side and
/// installs it with a single pointer swap.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    current: RwLock<Arc<SchemaSnapshot>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded from a persisted schema state
    ///
    /// # Errors
    ///
    /// Any error from [`SchemaSnapshot::build`].
    pub fn from_state(state: SchemaState) -> Result<Self> {
        Ok(Self {
            current: RwLock::new(Arc::new(SchemaSnapshot::build(state)?)),
        })
    }

    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        self.current.read().clone()
    }

    /// Replace the current snapshot. Only the migration engine calls this.
    pub fn install(&self, snapshot: SchemaSnapshot) {
        let version = snapshot.version();
        let collections = snapshot.collections().len();
        *self.current.write() = Arc::new(snapshot);
        info!(?version, collections, "Installed schema snapshot");
    }

    /// # Errors
    ///
    /// Returns [`AuthzError::CollectionNotFound`] when absent.
    pub fn get_collection(&self, name: &str) -> Result<CollectionDef> {
        self.snapshot().get_collection(name).cloned()
    }

    /// # Errors
    ///
    /// Returns [`AuthzError::CollectionNotFound`] for unknown collections.
    pub fn get_rule(&self, collection: &str, op: OperationKind) -> Result<Option<Arc<Predicate>>> {
        self.snapshot().get_rule(collection, op)
    }

    /// # Errors
    ///
    /// Unknown collection, parse and path resolution errors.
    pub fn compile_rule(&self, collection: &str, op: OperationKind, text: &str) -> Result<Predicate> {
        self.snapshot().compile_rule(collection, op, text)
    }
}
