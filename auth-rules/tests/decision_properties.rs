//! Property tests for the decision point.

mod common;

use auth_rules::domain::collections::*;
use auth_rules::*;
use common::*;
use proptest::prelude::*;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn identity_strategy() -> impl Strategy<Value = Identity> {
    (
        prop::sample::select(vec!["", "u1", "u2", "s1", "s2", "s3", "x9"]),
        prop::option::of(prop::sample::select(vec!["teacher", "student", "admin"])),
    )
        .prop_map(|(id, role)| match role {
            Some(role) => Identity::new(id).with_role(role),
            None => Identity::new(id),
        })
}

fn operation_strategy() -> impl Strategy<Value = OperationKind> {
    prop::sample::select(OperationKind::ALL.to_vec())
}

fn assignment_strategy() -> impl Strategy<Value = Record> {
    (
        prop::sample::select(vec!["g1", "g2", "gone", ""]),
        prop::sample::select(vec!["u1", "u2", "s1", ""]),
    )
        .prop_map(|(group, teacher)| assignment("a9", group, teacher))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn authorize_is_a_pure_function(
        identity in identity_strategy(),
        op in operation_strategy(),
        record in assignment_strategy(),
    ) {
        let rt = runtime();
        let repo = Arc::new(school());
        let adp = decision_point(repo.clone());
        let stored_before = repo.list(ASSIGNMENTS);

        let first = rt.block_on(adp.authorize(ASSIGNMENTS, op, &identity, &record));
        let second = rt.block_on(adp.authorize(ASSIGNMENTS, op, &identity, &record));

        prop_assert_eq!(first, second);
        prop_assert_eq!(stored_before, repo.list(ASSIGNMENTS));
    }

    #[test]
    fn anonymous_is_always_denied(op in operation_strategy(), record in assignment_strategy()) {
        let rt = runtime();
        let adp = decision_point(Arc::new(school()));
        for collection in [USERS, ASSIGNMENTS, PROGRESS] {
            let decision = rt.block_on(adp.authorize(collection, op, &Identity::anonymous(), &record));
            prop_assert_eq!(decision, Decision::Deny);
        }
    }

    #[test]
    fn ownership_matches_teacher_field(
        identity in identity_strategy(),
        record in assignment_strategy(),
    ) {
        let rt = runtime();
        let adp = decision_point(Arc::new(school()));
        let decision = rt.block_on(adp.authorize(ASSIGNMENTS, OperationKind::Update, &identity, &record));

        let expected = !identity.is_anonymous()
            && identity.role() == Some("teacher")
            && record.get_str("teacher") == Some(identity.id.as_str());
        prop_assert_eq!(decision.is_allowed(), expected);
    }
}
