use crate::error::AuthzError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Attribute name under which the identity's role is carried
pub const ROLE_ATTRIBUTE: &str = "role";

/// The authenticated caller of an operation, or the anonymous sentinel
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Empty for the anonymous sentinel
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Identity {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn teacher(id: &str) -> Self {
        Self::new(id).with_role("teacher")
    }

    pub fn student(id: &str) -> Self {
        Self::new(id).with_role("student")
    }

    pub fn with_role(self, role: &str) -> Self {
        self.with_attribute(ROLE_ATTRIBUTE, role)
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_empty()
    }

    pub fn role(&self) -> Option<&str> {
        self.attributes.get(ROLE_ATTRIBUTE).map(String::as_str)
    }

    /// Resolve `auth.<name>`; `id` is the identity id, everything else an attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        if name == "id" {
            return Some(self.id.as_str());
        }
        self.attributes.get(name).map(String::as_str)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            return write!(f, "anonymous");
        }
        match self.role() {
            Some(role) => write!(f, "user:{}({})", self.id, role),
            None => write!(f, "user:{}", self.id),
        }
    }
}

/// A stored record or a candidate record submitted for create/update.
///
/// Field values are plain JSON: relation fields hold an id string (single) or
/// an array of id strings (multi-valued).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            fields: Map::new(),
        }
    }

    /// A record that has not been stored yet
    pub fn candidate() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Ids held by a relation field. Absent, null and empty references are
    /// the empty set.
    pub fn relation_ids(&self, name: &str) -> BTreeSet<String> {
        match self.fields.get(name) {
            Some(Value::String(id)) if !id.is_empty() => BTreeSet::from([id.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(ToString::to_string)
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Comparison values of a scalar field. An absent or null value compares
    /// as the empty string.
    pub fn scalar_values(&self, name: &str) -> BTreeSet<String> {
        match self.fields.get(name) {
            None | Some(Value::Null) => BTreeSet::from([String::new()]),
            Some(Value::Array(items)) => items.iter().map(scalar_text).collect(),
            Some(other) => BTreeSet::from([scalar_text(other)]),
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The five rule slots of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    List,
    View,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::List,
        OperationKind::View,
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::View => "view",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Name of the rule slot in the persisted collection layout
    pub fn rule_key(self) -> &'static str {
        match self {
            Self::List => "listRule",
            Self::View => "viewRule",
            Self::Create => "createRule",
            Self::Update => "updateRule",
            Self::Delete => "deleteRule",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|op| s.eq_ignore_ascii_case(op.as_str()) || s.eq_ignore_ascii_case(op.rule_key()))
            .ok_or_else(|| AuthzError::Validation(format!("Unknown operation kind: {s}")))
    }
}

/// Outcome of an authorization check; a denial carries nothing else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("ALLOW"),
            Decision::Deny => f.write_str("DENY"),
        }
    }
}

/// Authorization request for batch checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub collection: String,
    pub operation: OperationKind,
    pub identity: Identity,
    pub record: Record,
}

/// Authorization response for batch checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessResponse {
    pub decision: Decision,
    pub debug_trace: Option<Vec<String>>,
}
