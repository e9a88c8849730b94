use crate::error::{MigrationError, Result};
use auth_rules::{CollectionDef, DefaultPolicy, FieldDef, OperationKind, SchemaState};
use std::collections::BTreeMap;

/// One structural mutation of the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    CreateCollection(CollectionDef),
    /// Removing an absent collection is a no-op
    DeleteCollection { collection: String },
    /// Insert a field, at `position` when given, else at the end
    AddField {
        collection: String,
        field: FieldDef,
        position: Option<usize>,
    },
    /// Removing an absent field id is a no-op
    RemoveField {
        collection: String,
        field_id: String,
    },
    /// Overwrite the listed rule slots; `None` unsets a slot
    SetRules {
        collection: String,
        rules: BTreeMap<OperationKind, Option<String>>,
    },
    SetDefaultPolicy {
        collection: String,
        policy: DefaultPolicy,
    },
}

impl SchemaChange {
    pub fn add_field(collection: &str, field: FieldDef) -> Self {
        Self::AddField {
            collection: collection.to_string(),
            field,
            position: None,
        }
    }

    pub fn add_field_at(collection: &str, field: FieldDef, position: usize) -> Self {
        Self::AddField {
            collection: collection.to_string(),
            field,
            position: Some(position),
        }
    }

    pub fn remove_field(collection: &str, field_id: &str) -> Self {
        Self::RemoveField {
            collection: collection.to_string(),
            field_id: field_id.to_string(),
        }
    }

    pub fn delete_collection(collection: &str) -> Self {
        Self::DeleteCollection {
            collection: collection.to_string(),
        }
    }

    /// Set the given slots to rule text
    pub fn set_rules(collection: &str, rules: &[(OperationKind, &str)]) -> Self {
        Self::SetRules {
            collection: collection.to_string(),
            rules: rules
                .iter()
                .map(|(op, rule)| (*op, Some((*rule).to_string())))
                .collect(),
        }
    }

    /// Unset the given slots
    pub fn clear_rules(collection: &str, ops: &[OperationKind]) -> Self {
        Self::SetRules {
            collection: collection.to_string(),
            rules: ops.iter().map(|op| (*op, None)).collect(),
        }
    }

    /// Apply the change to a working copy of the state
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidChange`] for unknown collections,
    /// conflicting definitions and conflicting field ids.
    pub fn apply(&self, state: &mut SchemaState) -> Result<()> {
        match self {
            SchemaChange::CreateCollection(def) => {
                match state
                    .collections
                    .iter()
                    .find(|c| c.name == def.name || c.id == def.id)
                {
                    Some(existing) if existing == def => Ok(()),
                    Some(existing) => Err(MigrationError::InvalidChange(format!(
                        "Collection '{}' conflicts with existing '{}' ({})",
                        def.name, existing.name, existing.id
                    ))),
                    None => {
                        state.collections.push(def.clone());
                        Ok(())
                    }
                }
            }
            SchemaChange::DeleteCollection { collection } => {
                state
                    .collections
                    .retain(|c| c.name != *collection && c.id != *collection);
                Ok(())
            }
            SchemaChange::AddField {
                collection,
                field,
                position,
            } => {
                let def = collection_mut(state, collection)?;
                if let Some(existing) = def.field_by_id(&field.id) {
                    if existing == field {
                        return Ok(());
                    }
                    return Err(MigrationError::InvalidChange(format!(
                        "Field id '{}' already exists in '{}' with a different definition",
                        field.id, def.name
                    )));
                }
                let index = position.map_or(def.fields.len(), |p| p.min(def.fields.len()));
                def.fields.insert(index, field.clone());
                Ok(())
            }
            SchemaChange::RemoveField {
                collection,
                field_id,
            } => {
                let def = collection_mut(state, collection)?;
                def.fields.retain(|f| f.id != *field_id);
                Ok(())
            }
            SchemaChange::SetRules { collection, rules } => {
                let def = collection_mut(state, collection)?;
                for (op, rule) in rules {
                    def.rules.set(*op, rule.clone());
                }
                Ok(())
            }
            SchemaChange::SetDefaultPolicy { collection, policy } => {
                collection_mut(state, collection)?.default_policy = *policy;
                Ok(())
            }
        }
    }
}

fn collection_mut<'a>(state: &'a mut SchemaState, name: &str) -> Result<&'a mut CollectionDef> {
    state
        .find_collection_mut(name)
        .ok_or_else(|| MigrationError::InvalidChange(format!("Unknown collection '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SchemaState {
        SchemaState {
            applied: Vec::new(),
            collections: vec![CollectionDef::new("_pb_users_auth_", "users")
                .with_field(FieldDef::email("email_field", "email"))
                .with_field(FieldDef::password("password_field", "password"))],
        }
    }

    #[test]
    fn test_add_field_at_position() {
        let mut state = state();
        SchemaChange::add_field_at("users", FieldDef::text("name_field", "displayName"), 1)
            .apply(&mut state)
            .unwrap();
        let names: Vec<_> = state.collections[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["email", "displayName", "password"]);

        // a position past the end appends
        SchemaChange::add_field_at("_pb_users_auth_", FieldDef::text("code_field", "code"), 99)
            .apply(&mut state)
            .unwrap();
        assert_eq!(state.collections[0].fields.last().unwrap().name, "code");
    }

    #[test]
    fn test_add_field_is_idempotent_per_id() {
        let mut state = state();
        let change = SchemaChange::add_field("users", FieldDef::text("name_field", "displayName"));
        change.apply(&mut state).unwrap();
        change.apply(&mut state).unwrap();
        assert_eq!(state.collections[0].fields.len(), 3);

        let conflicting = SchemaChange::add_field("users", FieldDef::bool("name_field", "displayName"));
        assert!(matches!(
            conflicting.apply(&mut state),
            Err(MigrationError::InvalidChange(_))
        ));
    }

    #[test]
    fn test_remove_missing_field_is_noop() {
        let mut state = state();
        SchemaChange::remove_field("users", "nope").apply(&mut state).unwrap();
        assert_eq!(state.collections[0].fields.len(), 2);

        assert!(SchemaChange::remove_field("groups", "nope").apply(&mut state).is_err());
    }

    #[test]
    fn test_set_and_clear_rules() {
        let mut state = state();
        SchemaChange::set_rules(
            "users",
            &[(OperationKind::List, "@request.auth.id != \"\""), (OperationKind::Update, "@request.auth.id = id")],
        )
        .apply(&mut state)
        .unwrap();
        assert_eq!(state.collections[0].rules.iter().count(), 2);

        SchemaChange::clear_rules("users", &[OperationKind::List, OperationKind::Update])
            .apply(&mut state)
            .unwrap();
        assert_eq!(state.collections[0].rules, auth_rules::RuleSet::default());
    }

    #[test]
    fn test_create_collection_conflicts() {
        let mut state = state();
        let groups = CollectionDef::new("pbc_groups", "groups");
        SchemaChange::CreateCollection(groups.clone()).apply(&mut state).unwrap();
        SchemaChange::CreateCollection(groups).apply(&mut state).unwrap();
        assert_eq!(state.collections.len(), 2);

        let clash = CollectionDef::new("other", "groups").with_field(FieldDef::text("f", "name"));
        assert!(SchemaChange::CreateCollection(clash).apply(&mut state).is_err());

        SchemaChange::delete_collection("groups").apply(&mut state).unwrap();
        SchemaChange::delete_collection("groups").apply(&mut state).unwrap();
        assert_eq!(state.collections.len(), 1);
    }
}
