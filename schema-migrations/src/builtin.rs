//! The learnmap schema as an ordered migration history.

use crate::change::SchemaChange;
use crate::migration::Migration;
use auth_rules::domain::collections::{ASSIGNMENTS, GROUPS, LEARNING_MAPS, PROGRESS, USERS, USERS_ID};
use auth_rules::domain::STUDENT_CODE_PATTERN;
use auth_rules::{CollectionDef, FieldDef, OperationKind};

pub const GROUPS_ID: &str = "pbc_groups";
pub const LEARNING_MAPS_ID: &str = "pbc_learningmaps";
pub const ASSIGNMENTS_ID: &str = "pbc_assignments";
pub const PROGRESS_ID: &str = "pbc_progress";

const AUTHENTICATED: &str = r#"@request.auth.id != """#;

/// Every built-in migration, oldest first
pub fn learnmap_migrations() -> Vec<Migration> {
    vec![
        created_users(),
        created_groups(),
        updated_users_roles(),
        created_learningmaps(),
        created_assignments(),
        created_progress(),
        users_rules(),
        assignments_rules(),
        progress_rules(),
        learningmaps_rules(),
    ]
}

fn created_users() -> Migration {
    let users = CollectionDef::new(USERS_ID, USERS)
        .with_field(FieldDef::email("email_field", "email"))
        .with_field(FieldDef::password("password_field", "password"));

    Migration::new(1760219400, "created_users")
        .up(SchemaChange::CreateCollection(users))
        .down(SchemaChange::delete_collection(USERS_ID))
}

fn created_groups() -> Migration {
    let groups = CollectionDef::new(GROUPS_ID, GROUPS)
        .with_field(FieldDef::text("groups_name", "name").required())
        .with_field(FieldDef::relation("groups_teacher", "teacher", USERS_ID).required())
        .with_field(FieldDef::multi_relation("groups_students", "students", USERS_ID));

    let read = format!(
        "{AUTHENTICATED} && (teacher = @request.auth.id || students ?= @request.auth.id)"
    );
    let write = teacher_owned();

    Migration::new(1760219450, "created_groups")
        .up(SchemaChange::CreateCollection(groups))
        .up(all_rules(GROUPS, &read, &write))
        .down(SchemaChange::delete_collection(GROUPS))
}

fn updated_users_roles() -> Migration {
    Migration::new(1760219460, "updated_users_roles")
        .up(SchemaChange::add_field_at(
            USERS_ID,
            FieldDef::select("role_field", "role", &["teacher", "student"]).required(),
            10,
        ))
        .up(SchemaChange::add_field_at(
            USERS_ID,
            FieldDef::text("displayname_field", "displayName").required(),
            11,
        ))
        .up(SchemaChange::add_field_at(
            USERS_ID,
            FieldDef::text("code_field", "code").with_pattern(STUDENT_CODE_PATTERN),
            12,
        ))
        .down(SchemaChange::remove_field(USERS_ID, "role_field"))
        .down(SchemaChange::remove_field(USERS_ID, "displayname_field"))
        .down(SchemaChange::remove_field(USERS_ID, "code_field"))
}

fn created_learningmaps() -> Migration {
    let maps = CollectionDef::new(LEARNING_MAPS_ID, LEARNING_MAPS)
        .with_field(FieldDef::text("learningmaps_name", "name").required())
        .with_field(FieldDef::json("learningmaps_roadmap", "roadmapData").required())
        .with_field(FieldDef::relation("learningmaps_teacher", "teacher", USERS_ID).required());

    Migration::new(1760219480, "created_learningmaps")
        .up(SchemaChange::CreateCollection(maps))
        .down(SchemaChange::delete_collection(LEARNING_MAPS))
}

fn created_assignments() -> Migration {
    let assignments = CollectionDef::new(ASSIGNMENTS_ID, ASSIGNMENTS)
        .with_field(FieldDef::relation("assignments_group", "group", GROUPS_ID).required())
        .with_field(
            FieldDef::relation("assignments_learningmap", "learningmap", LEARNING_MAPS_ID).required(),
        )
        .with_field(FieldDef::relation("assignments_teacher", "teacher", USERS_ID).required());

    Migration::new(1760219490, "created_assignments")
        .up(SchemaChange::CreateCollection(assignments))
        .down(SchemaChange::delete_collection(ASSIGNMENTS))
}

fn created_progress() -> Migration {
    let progress = CollectionDef::new(PROGRESS_ID, PROGRESS)
        .with_field(FieldDef::relation("progress_student", "student", USERS_ID).required())
        .with_field(
            FieldDef::relation("progress_assignment", "assignment", ASSIGNMENTS_ID).required(),
        )
        .with_field(FieldDef::json("progress_roadmap", "roadmapState").required());

    Migration::new(1760219500, "created_progress")
        .up(SchemaChange::CreateCollection(progress))
        .down(SchemaChange::delete_collection(PROGRESS))
}

fn users_rules() -> Migration {
    let ops = [OperationKind::List, OperationKind::View, OperationKind::Update];
    Migration::new(1760221510, "users_rules")
        .up(SchemaChange::set_rules(
            USERS_ID,
            &[
                (OperationKind::List, AUTHENTICATED),
                (OperationKind::View, AUTHENTICATED),
                (OperationKind::Update, "@request.auth.id = id"),
            ],
        ))
        .down(SchemaChange::clear_rules(USERS_ID, &ops))
}

fn assignments_rules() -> Migration {
    let read = format!(
        "{AUTHENTICATED} && (teacher = @request.auth.id || group.students.id ?= @request.auth.id)"
    );
    Migration::new(1760221540, "assignments_rules")
        .up(all_rules(ASSIGNMENTS, &read, &teacher_owned()))
        .down(SchemaChange::clear_rules(ASSIGNMENTS, &OperationKind::ALL))
}

fn progress_rules() -> Migration {
    let read = format!(
        "{AUTHENTICATED} && (student = @request.auth.id || assignment.teacher = @request.auth.id)"
    );
    let write = format!(
        r#"{AUTHENTICATED} && @request.auth.role = "student" && student = @request.auth.id"#
    );
    Migration::new(1760221550, "progress_rules")
        .up(all_rules(PROGRESS, &read, &write))
        .down(SchemaChange::clear_rules(PROGRESS, &OperationKind::ALL))
}

fn learningmaps_rules() -> Migration {
    Migration::new(1760221560, "learningmaps_rules")
        .up(all_rules(LEARNING_MAPS, AUTHENTICATED, &teacher_owned()))
        .down(SchemaChange::clear_rules(LEARNING_MAPS, &OperationKind::ALL))
}

fn teacher_owned() -> String {
    format!(r#"{AUTHENTICATED} && @request.auth.role = "teacher" && teacher = @request.auth.id"#)
}

/// List/view share `read`; create/update/delete share `write`
fn all_rules(collection: &str, read: &str, write: &str) -> SchemaChange {
    SchemaChange::set_rules(
        collection,
        &[
            (OperationKind::List, read),
            (OperationKind::View, read),
            (OperationKind::Create, write),
            (OperationKind::Update, write),
            (OperationKind::Delete, write),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_strictly_increasing() {
        let versions: Vec<u64> = learnmap_migrations().iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(versions.first(), Some(&1760219400));
    }

    #[test]
    fn test_every_migration_is_reversible() {
        for migration in learnmap_migrations() {
            assert!(!migration.up.is_empty(), "{migration} has no up changes");
            assert!(!migration.down.is_empty(), "{migration} has no down changes");
        }
    }
}
