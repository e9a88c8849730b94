use crate::{
    error::{AuthzError, Result},
    models::{Decision, OperationKind, Record},
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// System field present on every collection; cannot be declared
pub const ID_FIELD: &str = "id";

/// A typed field of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(flatten)]
    pub kind: FieldType,
}

/// Field type tag and its constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    Text {
        /// Minimum length in characters, 0 for none
        #[serde(default)]
        min: usize,
        /// Maximum length in characters, 0 for none
        #[serde(default)]
        max: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Email,
    Password,
    Bool,
    Json,
    Select {
        values: Vec<String>,
        #[serde(rename = "maxSelect", default = "default_max_select")]
        max_select: usize,
    },
    Relation {
        /// Id of the target collection
        #[serde(rename = "collectionId")]
        collection_id: String,
        /// `None` for an unbounded, multi-valued relation
        #[serde(rename = "maxSelect", default, skip_serializing_if = "Option::is_none")]
        max_select: Option<usize>,
    },
}

fn default_max_select() -> usize {
    1
}

impl FieldDef {
    fn with_kind(id: &str, name: &str, kind: FieldType) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            required: false,
            hidden: false,
            kind,
        }
    }

    pub fn text(id: &str, name: &str) -> Self {
        Self::with_kind(id, name, FieldType::Text { min: 0, max: 0, pattern: None })
    }

    pub fn email(id: &str, name: &str) -> Self {
        Self::with_kind(id, name, FieldType::Email)
    }

    pub fn password(id: &str, name: &str) -> Self {
        Self::with_kind(id, name, FieldType::Password).hidden()
    }

    pub fn bool(id: &str, name: &str) -> Self {
        Self::with_kind(id, name, FieldType::Bool)
    }

    pub fn json(id: &str, name: &str) -> Self {
        Self::with_kind(id, name, FieldType::Json)
    }

    pub fn select(id: &str, name: &str, values: &[&str]) -> Self {
        Self::with_kind(
            id,
            name,
            FieldType::Select {
                values: values.iter().map(ToString::to_string).collect(),
                max_select: 1,
            },
        )
    }

    /// Single-valued relation
    pub fn relation(id: &str, name: &str, collection_id: &str) -> Self {
        Self::with_kind(
            id,
            name,
            FieldType::Relation {
                collection_id: collection_id.to_string(),
                max_select: Some(1),
            },
        )
    }

    /// Unbounded, multi-valued relation
    pub fn multi_relation(id: &str, name: &str, collection_id: &str) -> Self {
        Self::with_kind(
            id,
            name,
            FieldType::Relation {
                collection_id: collection_id.to_string(),
                max_select: None,
            },
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Constrain a text field with a regular expression
    pub fn with_pattern(mut self, regex: &str) -> Self {
        if let FieldType::Text { ref mut pattern, .. } = self.kind {
            *pattern = Some(regex.to_string());
        }
        self
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldType::Relation { .. })
    }

    /// Target collection id of a relation field
    pub fn relation_target(&self) -> Option<&str> {
        match self.kind {
            FieldType::Relation { ref collection_id, .. } => Some(collection_id),
            _ => None,
        }
    }

    fn validate_definition(&self, collection: &str) -> Result<()> {
        if self.name.is_empty() || self.id.is_empty() {
            return Err(AuthzError::InvalidSchema(format!(
                "Field in '{collection}' must have a non-empty id and name"
            )));
        }
        if self.name == ID_FIELD {
            return Err(AuthzError::InvalidSchema(format!(
                "Field name '{ID_FIELD}' is reserved in '{collection}'"
            )));
        }
        match self.kind {
            FieldType::Text { pattern: Some(ref pattern), .. } => {
                Regex::new(pattern).map_err(|e| {
                    AuthzError::InvalidSchema(format!(
                        "Invalid pattern for '{collection}.{}': {e}",
                        self.name
                    ))
                })?;
            }
            FieldType::Select { ref values, max_select } if values.is_empty() || max_select == 0 => {
                return Err(AuthzError::InvalidSchema(format!(
                    "Select field '{collection}.{}' needs values and maxSelect >= 1",
                    self.name
                )));
            }
            FieldType::Relation { max_select: Some(0), .. } => {
                return Err(AuthzError::InvalidSchema(format!(
                    "Relation field '{collection}.{}' has maxSelect 0",
                    self.name
                )));
            }
            _ => {}
        }
        Ok(())
    }

    fn validate_value(&self, value: Option<&Value>) -> std::result::Result<(), String> {
        let value = match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::Array(items)) if items.is_empty() => None,
            Some(other) => Some(other),
        };
        let Some(value) = value else {
            return if self.required {
                Err("is required".to_string())
            } else {
                Ok(())
            };
        };

        match self.kind {
            FieldType::Text { min, max, ref pattern } => {
                let text = value.as_str().ok_or("must be a string")?;
                let len = text.chars().count();
                if min > 0 && len < min {
                    return Err(format!("must be at least {min} characters"));
                }
                if max > 0 && len > max {
                    return Err(format!("must be at most {max} characters"));
                }
                if let Some(pattern) = pattern {
                    let regex = Regex::new(pattern).map_err(|e| e.to_string())?;
                    if !regex.is_match(text) {
                        return Err(format!("must match {pattern}"));
                    }
                }
                Ok(())
            }
            FieldType::Email => match value.as_str() {
                Some(email) if EMAIL_REGEX.is_match(email) => Ok(()),
                _ => Err("must be an e-mail address".to_string()),
            },
            FieldType::Password => value.as_str().map(|_| ()).ok_or_else(|| "must be a string".to_string()),
            FieldType::Bool => value.as_bool().map(|_| ()).ok_or_else(|| "must be a boolean".to_string()),
            FieldType::Json => Ok(()),
            FieldType::Select { ref values, max_select } => {
                let chosen = string_items(value).ok_or("must be a string or list of strings")?;
                if chosen.len() > max_select {
                    return Err(format!("accepts at most {max_select} value(s)"));
                }
                match chosen.iter().find(|v| !values.contains(v)) {
                    Some(bad) => Err(format!("'{bad}' is not one of {values:?}")),
                    None => Ok(()),
                }
            }
            FieldType::Relation { max_select, .. } => {
                let ids = string_items(value).ok_or("must be an id or list of ids")?;
                match max_select {
                    Some(limit) if ids.len() > limit => {
                        Err(format!("references at most {limit} record(s)"))
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

fn string_items(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(ToString::to_string))
            .collect(),
        _ => None,
    }
}

/// Rule text of the five operation slots; `None` is an unset slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    #[serde(default)]
    pub list_rule: Option<String>,
    #[serde(default)]
    pub view_rule: Option<String>,
    #[serde(default)]
    pub create_rule: Option<String>,
    #[serde(default)]
    pub update_rule: Option<String>,
    #[serde(default)]
    pub delete_rule: Option<String>,
}

impl RuleSet {
    pub fn get(&self, op: OperationKind) -> Option<&str> {
        match op {
            OperationKind::List => self.list_rule.as_deref(),
            OperationKind::View => self.view_rule.as_deref(),
            OperationKind::Create => self.create_rule.as_deref(),
            OperationKind::Update => self.update_rule.as_deref(),
            OperationKind::Delete => self.delete_rule.as_deref(),
        }
    }

    pub fn set(&mut self, op: OperationKind, rule: Option<String>) {
        let slot = match op {
            OperationKind::List => &mut self.list_rule,
            OperationKind::View => &mut self.view_rule,
            OperationKind::Create => &mut self.create_rule,
            OperationKind::Update => &mut self.update_rule,
            OperationKind::Delete => &mut self.delete_rule,
        };
        *slot = rule;
    }

    /// Set slots with their rule text
    pub fn iter(&self) -> impl Iterator<Item = (OperationKind, &str)> {
        OperationKind::ALL
            .into_iter()
            .filter_map(move |op| self.get(op).map(|rule| (op, rule)))
    }
}

/// What an unset rule slot means for a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    #[default]
    DenyAll,
    /// The collection is explicitly marked open
    AllowAll,
}

impl DefaultPolicy {
    pub fn decision(self) -> Decision {
        match self {
            DefaultPolicy::DenyAll => Decision::Deny,
            DefaultPolicy::AllowAll => Decision::Allow,
        }
    }
}

/// A collection: ordered fields, rule slots and the unset-slot policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(flatten)]
    pub rules: RuleSet,
    #[serde(default)]
    pub default_policy: DefaultPolicy,
}

impl CollectionDef {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            fields: Vec::new(),
            rules: RuleSet::default(),
            default_policy: DefaultPolicy::DenyAll,
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_id(&self, id: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Structural checks on the definition itself
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidSchema`] for duplicate or reserved field
    /// names, duplicate field ids and uncompilable patterns.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() || self.name.is_empty() {
            return Err(AuthzError::InvalidSchema(
                "Collection must have a non-empty id and name".to_string(),
            ));
        }
        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for field in &self.fields {
            field.validate_definition(&self.name)?;
            if !names.insert(field.name.as_str()) {
                return Err(AuthzError::InvalidSchema(format!(
                    "Duplicate field name '{}' in '{}'",
                    field.name, self.name
                )));
            }
            if !ids.insert(field.id.as_str()) {
                return Err(AuthzError::InvalidSchema(format!(
                    "Duplicate field id '{}' in '{}'",
                    field.id, self.name
                )));
            }
        }
        Ok(())
    }

    /// Check a record's values against the field constraints
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Validation`] naming the first offending field.
    pub fn validate_record(&self, record: &Record) -> Result<()> {
        if let Some(unknown) = record.fields.keys().find(|name| self.field(name).is_none()) {
            return Err(AuthzError::Validation(format!(
                "Unknown field '{}' for collection '{}'",
                unknown, self.name
            )));
        }
        for field in &self.fields {
            field
                .validate_value(record.get(&field.name))
                .map_err(|reason| {
                    AuthzError::Validation(format!("{}.{} {}", self.name, field.name, reason))
                })?;
        }
        Ok(())
    }
}

/// Bookkeeping entry for an applied migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub version: u64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// The durable schema: collections plus applied migration versions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaState {
    #[serde(default)]
    pub applied: Vec<AppliedMigration>,
    #[serde(default)]
    pub collections: Vec<CollectionDef>,
}

impl SchemaState {
    /// Highest applied migration version
    pub fn version(&self) -> Option<u64> {
        self.applied.iter().map(|m| m.version).max()
    }

    pub fn is_applied(&self, version: u64) -> bool {
        self.applied.iter().any(|m| m.version == version)
    }

    pub fn find_collection(&self, name_or_id: &str) -> Option<&CollectionDef> {
        self.collections
            .iter()
            .find(|c| c.name == name_or_id || c.id == name_or_id)
    }

    pub fn find_collection_mut(&mut self, name_or_id: &str) -> Option<&mut CollectionDef> {
        self.collections
            .iter_mut()
            .find(|c| c.name == name_or_id || c.id == name_or_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> CollectionDef {
        CollectionDef::new("_pb_users_auth_", "users")
            .with_field(FieldDef::email("email_field", "email"))
            .with_field(FieldDef::select("role_field", "role", &["teacher", "student"]).required())
            .with_field(FieldDef::text("displayname_field", "displayName").required())
            .with_field(FieldDef::text("code_field", "code").with_pattern(r"^[A-Z0-9]{6}$"))
    }

    #[test]
    fn test_collection_json_layout() {
        let collection = users();
        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(value["fields"][1]["type"], "select");
        assert_eq!(value["fields"][1]["maxSelect"], 1);
        assert_eq!(value["listRule"], Value::Null);
        assert_eq!(value["defaultPolicy"], "deny_all");

        let back: CollectionDef = serde_json::from_value(value).unwrap();
        assert_eq!(back, collection);
    }

    #[test]
    fn test_relation_field_layout() {
        let field: FieldDef = serde_json::from_value(json!({
            "id": "students_field",
            "name": "students",
            "type": "relation",
            "collectionId": "_pb_users_auth_"
        }))
        .unwrap();
        assert_eq!(field.relation_target(), Some("_pb_users_auth_"));
        assert!(matches!(field.kind, FieldType::Relation { max_select: None, .. }));
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let collection = users().with_field(FieldDef::text("other", "code"));
        assert!(matches!(collection.validate(), Err(AuthzError::InvalidSchema(_))));

        let reserved = CollectionDef::new("c1", "things").with_field(FieldDef::text("x", "id"));
        assert!(reserved.validate().is_err());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let collection = CollectionDef::new("c1", "things")
            .with_field(FieldDef::text("f1", "code").with_pattern("[A-Z"));
        assert!(collection.validate().is_err());
    }

    #[test]
    fn test_validate_student_record() {
        let collection = users();
        let student = Record::new("s1")
            .with_field("role", "student")
            .with_field("displayName", "Quiet Otter")
            .with_field("code", "AB12CD");
        assert!(collection.validate_record(&student).is_ok());

        let bad_code = student.clone().with_field("code", "ab12cd");
        assert!(collection.validate_record(&bad_code).is_err());

        let bad_role = student.clone().with_field("role", "admin");
        assert!(collection.validate_record(&bad_role).is_err());

        let missing_name = Record::new("s2").with_field("role", "student");
        let err = collection.validate_record(&missing_name).unwrap_err();
        assert!(err.to_string().contains("displayName is required"));

        let unknown = student.with_field("managedBy", "u1");
        assert!(collection.validate_record(&unknown).is_err());
    }

    #[test]
    fn test_relation_cardinality() {
        let assignments = CollectionDef::new("c_assignments", "assignments")
            .with_field(FieldDef::relation("group_field", "group", "c_groups").required());
        let ok = Record::candidate().with_field("group", "g1");
        assert!(assignments.validate_record(&ok).is_ok());

        let too_many = Record::candidate().with_field("group", json!(["g1", "g2"]));
        assert!(assignments.validate_record(&too_many).is_err());

        let missing = Record::candidate();
        assert!(assignments.validate_record(&missing).is_err());
    }

    #[test]
    fn test_rule_set_slots() {
        let mut rules = RuleSet::default();
        rules.set(OperationKind::View, Some("@request.auth.id != \"\"".to_string()));
        assert_eq!(rules.get(OperationKind::View), Some("@request.auth.id != \"\""));
        assert_eq!(rules.get(OperationKind::List), None);
        assert_eq!(rules.iter().count(), 1);

        rules.set(OperationKind::View, None);
        assert_eq!(rules, RuleSet::default());
    }

    #[test]
    fn test_schema_state_lookup() {
        let state = SchemaState {
            applied: Vec::new(),
            collections: vec![users()],
        };
        assert!(state.find_collection("users").is_some());
        assert!(state.find_collection("_pb_users_auth_").is_some());
        assert!(state.find_collection("groups").is_none());
        assert_eq!(state.version(), None);
    }
}
