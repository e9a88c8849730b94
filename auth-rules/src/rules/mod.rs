//! Rule predicate language: AST, parser, compilation against the relation
//! graph, evaluation, and list-filter folding.

pub mod ast;
pub mod eval;
pub mod filter;
pub mod parser;

pub use ast::{CompareOp, Expr, FieldPath, Literal, Operand};
pub use filter::ListFilter;
pub use parser::parse_rule;

use crate::{error::Result, graph::RelationGraph, models::OperationKind};
use std::fmt;

/// A parsed rule whose field paths are all resolved against a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    collection: String,
    operation: OperationKind,
    source: String,
    expr: Expr,
}

impl Predicate {
    /// Parse `text` and resolve every field path from `collection`
    ///
    /// # Errors
    ///
    /// [`AuthzError::Parse`](crate::AuthzError::Parse) for malformed text and
    /// [`AuthzError::Config`](crate::AuthzError::Config) for paths that do
    /// not exist in the graph.
    pub fn compile(
        graph: &RelationGraph,
        collection: &str,
        operation: OperationKind,
        text: &str,
    ) -> Result<Self> {
        let mut expr = parse_rule(text)?;
        for path in expr.field_paths_mut() {
            path.resolved = Some(graph.resolve_path(collection, &path.segments)?);
        }
        Ok(Self {
            collection: collection.to_string(),
            operation,
            source: text.to_string(),
            expr,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// The rule text as registered
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Whether evaluation may consult storage
    pub fn needs_lookups(&self) -> bool {
        self.expr.field_paths().iter().any(|path| {
            path.resolved
                .as_ref()
                .map_or(false, |resolved| resolved.is_traversal())
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use crate::schema::{CollectionDef, FieldDef};

    fn graph() -> RelationGraph {
        RelationGraph::build(&[
            CollectionDef::new("_pb_users_auth_", "users"),
            CollectionDef::new("c_groups", "groups")
                .with_field(FieldDef::multi_relation("students_field", "students", "_pb_users_auth_")),
            CollectionDef::new("c_assignments", "assignments")
                .with_field(FieldDef::relation("group_field", "group", "c_groups"))
                .with_field(FieldDef::relation("teacher_field", "teacher", "_pb_users_auth_")),
        ])
        .unwrap()
    }

    #[test]
    fn test_compile_resolves_every_path() {
        let predicate = Predicate::compile(
            &graph(),
            "assignments",
            OperationKind::View,
            "teacher = auth.id || group.students.id ?= auth.id",
        )
        .unwrap();

        assert!(predicate
            .expr()
            .field_paths()
            .iter()
            .all(|path| path.resolved.is_some()));
        assert!(predicate.needs_lookups());
        assert_eq!(predicate.operation(), OperationKind::View);
        assert_eq!(
            predicate.to_string(),
            "teacher = @request.auth.id || group.students.id ?= @request.auth.id"
        );
    }

    #[test]
    fn test_compile_rejects_unknown_path() {
        let err = Predicate::compile(
            &graph(),
            "assignments",
            OperationKind::View,
            "group.members.id ?= auth.id",
        )
        .unwrap_err();
        assert!(matches!(err, AuthzError::Config(_)));
    }

    #[test]
    fn test_identity_only_rule_needs_no_lookups() {
        let predicate =
            Predicate::compile(&graph(), "users", OperationKind::List, "auth.id != \"\"").unwrap();
        assert!(!predicate.needs_lookups());
    }
}
