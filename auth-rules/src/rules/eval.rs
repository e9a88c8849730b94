use super::ast::{CompareOp, Expr, FieldPath, Operand};
use crate::{
    error::{AuthzError, Result},
    graph::{ResolvedPath, Terminal},
    models::{Identity, Record},
    repository::RecordRepository,
};
use futures::future::BoxFuture;
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

/// Hop results memoised for the lifetime of one decision
#[derive(Default)]
struct HopCache {
    records: HashMap<(String, String), Option<Record>>,
    related: HashMap<(String, String, String), BTreeSet<String>>,
}

/// Evaluates one predicate against `{identity, record}`.
///
/// Relation hops are fetched lazily, only for comparisons that
/// short-circuiting actually reaches. A hop through a missing record yields
/// the empty set. Other storage failures are returned to the caller.
pub struct Evaluation<'a> {
    repository: &'a dyn RecordRepository,
    identity: &'a Identity,
    record: &'a Record,
    cache: HopCache,
    lookups: usize,
}

impl<'a> Evaluation<'a> {
    pub fn new(
        repository: &'a dyn RecordRepository,
        identity: &'a Identity,
        record: &'a Record,
    ) -> Self {
        Self {
            repository,
            identity,
            record,
            cache: HopCache::default(),
            lookups: 0,
        }
    }

    /// Storage round-trips made so far
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub fn evaluate<'b>(&'b mut self, expr: &'b Expr) -> BoxFuture<'b, Result<bool>> {
        Box::pin(async move {
            match expr {
                Expr::Const(value) => Ok(*value),
                Expr::Not(inner) => Ok(!self.evaluate(inner).await?),
                Expr::And(lhs, rhs) => {
                    if !self.evaluate(lhs).await? {
                        return Ok(false);
                    }
                    self.evaluate(rhs).await
                }
                Expr::Or(lhs, rhs) => {
                    if self.evaluate(lhs).await? {
                        return Ok(true);
                    }
                    self.evaluate(rhs).await
                }
                Expr::Compare { lhs, op, rhs } => {
                    let left = self.side(lhs, *op).await?;
                    if left.is_empty() {
                        // only `?=`/`?!=` keep an empty side; nothing on the left can match
                        return Ok(op.apply(&left, &left));
                    }
                    let right = self.side(rhs, *op).await?;
                    Ok(op.apply(&left, &right))
                }
            }
        })
    }

    /// Values of one comparison side. `=` and `!=` see an empty value as `""`.
    async fn side(&mut self, operand: &Operand, op: CompareOp) -> Result<BTreeSet<String>> {
        let values = self.operand(operand).await?;
        if values.is_empty() && matches!(op, CompareOp::Eq | CompareOp::NotEq) {
            return Ok(BTreeSet::from([String::new()]));
        }
        Ok(values)
    }

    async fn operand(&mut self, operand: &Operand) -> Result<BTreeSet<String>> {
        match operand {
            Operand::Auth(name) => Ok(BTreeSet::from([self
                .identity
                .attribute(name)
                .unwrap_or_default()
                .to_string()])),
            Operand::Literal(literal) => Ok(BTreeSet::from([literal.as_text()])),
            Operand::Field(path) => self.field(path).await,
        }
    }

    async fn field(&mut self, path: &FieldPath) -> Result<BTreeSet<String>> {
        let resolved = path.resolved.as_ref().ok_or_else(|| {
            AuthzError::Config(format!("Field path '{}' was never resolved", path.dotted()))
        })?;

        let Some((first, rest)) = resolved.hops.split_first() else {
            return Ok(self.terminal_on_record(&resolved.terminal));
        };

        let mut ids = self.record.relation_ids(&first.field);
        let mut collection = first.target.as_str();
        for hop in rest {
            if ids.is_empty() {
                return Ok(ids);
            }
            let mut next = BTreeSet::new();
            for id in &ids {
                next.extend(self.related(collection, id, &hop.field).await?);
            }
            ids = next;
            collection = hop.target.as_str();
        }

        self.terminal_on_ids(resolved, collection, ids).await
    }

    fn terminal_on_record(&self, terminal: &Terminal) -> BTreeSet<String> {
        match terminal {
            Terminal::Id => self
                .record
                .id()
                .filter(|id| !id.is_empty())
                .map(|id| BTreeSet::from([id.to_string()]))
                .unwrap_or_default(),
            Terminal::Relation { field, .. } => self.record.relation_ids(field),
            Terminal::Scalar { field } => self.record.scalar_values(field),
        }
    }

    async fn terminal_on_ids(
        &mut self,
        resolved: &ResolvedPath,
        collection: &str,
        ids: BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        let mut values = BTreeSet::new();
        match &resolved.terminal {
            Terminal::Id => {
                // related ids only count while the records behind them exist
                for id in ids {
                    if self.fetch(collection, &id).await?.is_some() {
                        values.insert(id);
                    }
                }
            }
            Terminal::Relation { field, .. } => {
                for id in &ids {
                    values.extend(self.related(collection, id, field).await?);
                }
            }
            Terminal::Scalar { field } => {
                for id in &ids {
                    if let Some(record) = self.fetch(collection, id).await? {
                        values.extend(record.scalar_values(field));
                    }
                }
            }
        }
        Ok(values)
    }

    async fn fetch(&mut self, collection: &str, id: &str) -> Result<Option<Record>> {
        let key = (collection.to_string(), id.to_string());
        if let Some(cached) = self.cache.records.get(&key) {
            return Ok(cached.clone());
        }

        self.lookups += 1;
        trace!(collection, id, "fetch_record");
        let record = match self.repository.fetch_record(collection, id).await {
            Ok(record) => Some(record),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        self.cache.records.insert(key, record.clone());
        Ok(record)
    }

    async fn related(&mut self, collection: &str, id: &str, field: &str) -> Result<BTreeSet<String>> {
        let key = (collection.to_string(), id.to_string(), field.to_string());
        if let Some(cached) = self.cache.related.get(&key) {
            return Ok(cached.clone());
        }

        self.lookups += 1;
        trace!(collection, id, field, "fetch_related");
        let ids = match self.repository.fetch_related(collection, id, field).await {
            Ok(ids) => ids,
            Err(e) if e.is_not_found() => BTreeSet::new(),
            Err(e) => return Err(e),
        };
        self.cache.related.insert(key, ids.clone());
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RelationGraph;
    use crate::models::OperationKind;
    use crate::repository::InMemoryRecordRepository;
    use crate::rules::Predicate;
    use crate::schema::{CollectionDef, FieldDef};
    use serde_json::json;

    fn graph() -> RelationGraph {
        RelationGraph::build(&[
            CollectionDef::new("_pb_users_auth_", "users")
                .with_field(FieldDef::text("name_field", "displayName")),
            CollectionDef::new("c_groups", "groups")
                .with_field(FieldDef::relation("teacher_field", "teacher", "_pb_users_auth_"))
                .with_field(FieldDef::multi_relation("students_field", "students", "_pb_users_auth_")),
            CollectionDef::new("c_assignments", "assignments")
                .with_field(FieldDef::relation("group_field", "group", "c_groups"))
                .with_field(FieldDef::relation("teacher_field", "teacher", "_pb_users_auth_")),
        ])
        .unwrap()
    }

    fn repository() -> InMemoryRecordRepository {
        let repo = InMemoryRecordRepository::new();
        repo.insert("users", Record::new("u1").with_field("displayName", "Ms Rivera"))
            .unwrap();
        repo.insert("users", Record::new("s1")).unwrap();
        repo.insert("users", Record::new("s2")).unwrap();
        repo.insert(
            "groups",
            Record::new("g1")
                .with_field("teacher", "u1")
                .with_field("students", json!(["s1", "s2"])),
        )
        .unwrap();
        repo
    }

    async fn eval(rule: &str, identity: &Identity, record: &Record) -> (bool, usize) {
        let predicate = Predicate::compile(&graph(), "assignments", OperationKind::View, rule).unwrap();
        let repo = repository();
        let mut evaluation = Evaluation::new(&repo, identity, record);
        let result = evaluation.evaluate(predicate.expr()).await.unwrap();
        (result, evaluation.lookups())
    }

    fn assignment() -> Record {
        Record::new("a1").with_field("group", "g1").with_field("teacher", "u1")
    }

    #[tokio::test]
    async fn test_membership_through_two_hops() {
        let rule = "group.students.id ?= auth.id";
        assert!(eval(rule, &Identity::student("s1"), &assignment()).await.0);
        assert!(eval(rule, &Identity::student("s2"), &assignment()).await.0);
        assert!(!eval(rule, &Identity::student("s3"), &assignment()).await.0);
    }

    #[tokio::test]
    async fn test_plain_equality_uses_set_membership() {
        let rule = "group.students.id = auth.id";
        assert!(eval(rule, &Identity::student("s1"), &assignment()).await.0);
    }

    #[tokio::test]
    async fn test_scalar_through_relation() {
        let rule = "teacher.displayName = \"Ms Rivera\"";
        assert!(eval(rule, &Identity::anonymous(), &assignment()).await.0);
    }

    #[tokio::test]
    async fn test_missing_record_is_empty_set() {
        let orphan = Record::new("a2").with_field("group", "gone").with_field("teacher", "ghost");
        assert!(!eval("group.students.id ?= auth.id", &Identity::student("s1"), &orphan).await.0);
        assert!(!eval("teacher.id = auth.id", &Identity::teacher("ghost"), &orphan).await.0);
        // the stored id itself is still compared without a lookup
        assert!(eval("teacher = auth.id", &Identity::teacher("ghost"), &orphan).await.0);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_lookups() {
        let anonymous = Identity::anonymous();
        let (allowed, lookups) = eval(
            "auth.id != \"\" && group.students.id ?= auth.id",
            &anonymous,
            &assignment(),
        )
        .await;
        assert!(!allowed);
        assert_eq!(lookups, 0);

        let (allowed, lookups) = eval(
            "teacher = auth.id || group.students.id ?= auth.id",
            &Identity::teacher("u1"),
            &assignment(),
        )
        .await;
        assert!(allowed);
        assert_eq!(lookups, 0);
    }

    #[tokio::test]
    async fn test_empty_relation_skips_right_side() {
        let (allowed, lookups) = eval(
            "group.students.id ?= auth.id",
            &Identity::student("s1"),
            &Record::new("a3"),
        )
        .await;
        assert!(!allowed);
        assert_eq!(lookups, 0);
    }

    #[tokio::test]
    async fn test_hops_are_cached_within_a_decision() {
        let (allowed, lookups) = eval(
            "group.students.id ?= auth.id && group.teacher = \"u1\" && !(group.students.id ?= \"s9\")",
            &Identity::student("s2"),
            &assignment(),
        )
        .await;
        assert!(allowed);
        // g1.students, users s1 and s2, g1.teacher; the repeated path is served from cache
        assert_eq!(lookups, 4);
    }

    #[tokio::test]
    async fn test_empty_relation_compares_as_empty_string() {
        let absent = Record::new("a9").with_field("group", "g1");
        let blank = Record::new("a9").with_field("group", "g1").with_field("teacher", "");
        let null = Record::new("a9").with_field("teacher", json!(null));

        for record in [&absent, &blank, &null] {
            let anyone = Identity::teacher("u1");
            assert!(!eval("teacher != \"\"", &anyone, record).await.0, "{record:?} has no teacher");
            assert!(eval("teacher = \"\"", &anyone, record).await.0, "{record:?} has no teacher");
            assert!(!eval("teacher.id != \"\"", &anyone, record).await.0);
        }

        let owned = assignment();
        assert!(eval("teacher != \"\"", &Identity::anonymous(), &owned).await.0);
        assert!(!eval("teacher = \"\"", &Identity::anonymous(), &owned).await.0);
    }

    #[tokio::test]
    async fn test_any_operators_keep_empty_sets() {
        let absent = Record::new("a9");
        assert!(!eval("teacher ?= \"\"", &Identity::anonymous(), &absent).await.0);
        assert!(!eval("teacher ?!= \"u1\"", &Identity::anonymous(), &absent).await.0);
    }

    #[tokio::test]
    async fn test_deleted_member_drops_out_of_membership() {
        let predicate =
            Predicate::compile(&graph(), "assignments", OperationKind::View, "group.students.id ?= auth.id")
                .unwrap();
        let repo = repository();
        repo.remove("users", "s1");
        let record = assignment();

        let s1 = Identity::student("s1");
        let mut evaluation = Evaluation::new(&repo, &s1, &record);
        assert!(!evaluation.evaluate(predicate.expr()).await.unwrap(), "s1 no longer exists");

        let s2 = Identity::student("s2");
        let mut evaluation = Evaluation::new(&repo, &s2, &record);
        assert!(evaluation.evaluate(predicate.expr()).await.unwrap());
    }
}
