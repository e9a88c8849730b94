//! Shared classroom fixture: the learnmap schema and a small school.

#![allow(dead_code)]

use auth_rules::domain::collections::*;
use auth_rules::*;
use serde_json::json;
use std::sync::Arc;

pub const AUTHENTICATED: &str = "@request.auth.id != \"\"";

pub fn learnmap_state() -> SchemaState {
    let users = CollectionDef::new(USERS_ID, USERS)
        .with_field(FieldDef::email("users_email", "email"))
        .with_field(FieldDef::password("users_password", "password"))
        .with_field(FieldDef::select("users_role", "role", &["teacher", "student"]).required())
        .with_field(FieldDef::text("users_displayname", "displayName").required())
        .with_field(FieldDef::text("users_code", "code").with_pattern(r"^[A-Z0-9]{6}$"));

    let groups = CollectionDef::new("pbc_groups", GROUPS)
        .with_field(FieldDef::text("groups_name", "name").required())
        .with_field(FieldDef::relation("groups_teacher", "teacher", USERS_ID).required())
        .with_field(FieldDef::multi_relation("groups_students", "students", USERS_ID));

    let learningmaps = CollectionDef::new("pbc_learningmaps", LEARNING_MAPS)
        .with_field(FieldDef::text("maps_name", "name").required())
        .with_field(FieldDef::json("maps_data", "roadmapData").required())
        .with_field(FieldDef::relation("maps_teacher", "teacher", USERS_ID));

    let assignments = CollectionDef::new("pbc_assignments", ASSIGNMENTS)
        .with_field(FieldDef::relation("assign_group", "group", "pbc_groups").required())
        .with_field(FieldDef::relation("assign_map", "learningmap", "pbc_learningmaps").required())
        .with_field(FieldDef::relation("assign_teacher", "teacher", USERS_ID).required());

    let progress = CollectionDef::new("pbc_progress", PROGRESS)
        .with_field(FieldDef::relation("progress_student", "student", USERS_ID).required())
        .with_field(FieldDef::relation("progress_assignment", "assignment", "pbc_assignments").required())
        .with_field(FieldDef::json("progress_state", "roadmapState").required());

    let mut state = SchemaState {
        applied: Vec::new(),
        collections: vec![users, groups, learningmaps, assignments, progress],
    };

    set_rules(&mut state, USERS, &[
        (OperationKind::List, AUTHENTICATED.to_string()),
        (OperationKind::View, AUTHENTICATED.to_string()),
        (OperationKind::Update, "@request.auth.id = id".to_string()),
    ]);

    let assignment_read = format!(
        "{AUTHENTICATED} && (teacher = @request.auth.id || group.students.id ?= @request.auth.id)"
    );
    let assignment_write =
        format!("{AUTHENTICATED} && @request.auth.role = \"teacher\" && teacher = @request.auth.id");
    set_rules(&mut state, ASSIGNMENTS, &[
        (OperationKind::List, assignment_read.clone()),
        (OperationKind::View, assignment_read),
        (OperationKind::Create, assignment_write.clone()),
        (OperationKind::Update, assignment_write.clone()),
        (OperationKind::Delete, assignment_write),
    ]);

    let progress_read = format!(
        "{AUTHENTICATED} && (student = @request.auth.id || assignment.teacher = @request.auth.id)"
    );
    let progress_write =
        format!("{AUTHENTICATED} && @request.auth.role = \"student\" && student = @request.auth.id");
    set_rules(&mut state, PROGRESS, &[
        (OperationKind::List, progress_read.clone()),
        (OperationKind::View, progress_read),
        (OperationKind::Create, progress_write.clone()),
        (OperationKind::Update, progress_write.clone()),
        (OperationKind::Delete, progress_write),
    ]);

    state
}

fn set_rules(state: &mut SchemaState, collection: &str, rules: &[(OperationKind, String)]) {
    let def = state
        .find_collection_mut(collection)
        .expect("collection exists");
    for (op, rule) in rules {
        def.rules.set(*op, Some(rule.clone()));
    }
}

/// Ms Rivera (u1) teaches group g1 = {s1, s2}; Mr Okafor (u2) teaches g2 = {s3}
pub fn school() -> InMemoryRecordRepository {
    let repo = InMemoryRecordRepository::new();
    let insert = |collection: &str, record: Record| repo.insert(collection, record).unwrap();

    insert(USERS, Record::new("u1").with_field("role", "teacher").with_field("displayName", "Ms Rivera"));
    insert(USERS, Record::new("u2").with_field("role", "teacher").with_field("displayName", "Mr Okafor"));
    for (id, code) in [("s1", "AB12CD"), ("s2", "EF34GH"), ("s3", "IJ56KL")] {
        insert(
            USERS,
            Record::new(id)
                .with_field("role", "student")
                .with_field("displayName", id)
                .with_field("code", code),
        );
    }

    insert(
        GROUPS,
        Record::new("g1")
            .with_field("name", "Year 7 Blue")
            .with_field("teacher", "u1")
            .with_field("students", json!(["s1", "s2"])),
    );
    insert(
        GROUPS,
        Record::new("g2")
            .with_field("name", "Year 8 Red")
            .with_field("teacher", "u2")
            .with_field("students", json!(["s3"])),
    );

    insert(
        LEARNING_MAPS,
        Record::new("m1")
            .with_field("name", "Fractions")
            .with_field("roadmapData", json!({ "nodes": ["intro", "practice"] }))
            .with_field("teacher", "u1"),
    );

    insert(ASSIGNMENTS, assignment("a1", "g1", "u1"));
    insert(ASSIGNMENTS, assignment("a2", "g2", "u2"));

    insert(PROGRESS, progress("p1", "s1", "a1"));
    insert(PROGRESS, progress("p2", "s2", "a1"));

    repo
}

pub fn assignment(id: &str, group: &str, teacher: &str) -> Record {
    Record::new(id)
        .with_field("group", group)
        .with_field("learningmap", "m1")
        .with_field("teacher", teacher)
}

pub fn progress(id: &str, student: &str, assignment: &str) -> Record {
    Record::new(id)
        .with_field("student", student)
        .with_field("assignment", assignment)
        .with_field("roadmapState", json!({ "intro": "done" }))
}

pub fn registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::from_state(learnmap_state()).expect("learnmap schema compiles"))
}

pub fn decision_point(repository: Arc<dyn RecordRepository>) -> AccessDecisionPoint {
    AccessDecisionPoint::new(registry(), repository)
}
