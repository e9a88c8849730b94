use crate::change::SchemaChange;
use std::fmt;

/// A versioned, reversible set of schema changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u64,
    pub name: String,
    pub up: Vec<SchemaChange>,
    /// Must exactly invert `up`
    pub down: Vec<SchemaChange>,
}

impl Migration {
    pub fn new(version: u64, name: &str) -> Self {
        Self {
            version,
            name: name.to_string(),
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    pub fn up(mut self, change: SchemaChange) -> Self {
        self.up.push(change);
        self
    }

    pub fn down(mut self, change: SchemaChange) -> Self {
        self.down.push(change);
        self
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.version, self.name)
    }
}
