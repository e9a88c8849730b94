//! Relational authorization rule engine for the Learnmap platform
//!
//! Decides, per operation (list/view/create/update/delete), whether an
//! identity may act on a record of a collection. Rules are boolean predicates
//! over identity attributes and record fields, including dotted paths that
//! follow relation fields into other collections:
//!
//! ```text
//! @request.auth.id != "" && (teacher = @request.auth.id || group.students.id ?= @request.auth.id)
//! ```
//!
//! # Core Concepts
//!
//! - **Collection**: a typed field list plus five rule slots ([`schema`])
//! - **Relation graph**: relation fields as edges between collections, used to
//!   resolve traversal paths when a rule is compiled ([`graph`])
//! - **Predicate**: a parsed, path-resolved rule ([`rules`])
//! - **Decision point**: evaluates the rule for a request and fails closed
//!   ([`AccessDecisionPoint`])
//!
//! # Example
//!
//! ```rust,no_run
//! use auth_rules::*;
//! use std::sync::Arc;
//!
//! # async fn run(state: SchemaState) -> Result<()> {
//! let registry = Arc::new(SchemaRegistry::from_state(state)?);
//! let repository = Arc::new(InMemoryRecordRepository::new());
//! let adp = AccessDecisionPoint::new(registry, repository);
//!
//! let assignment = Record::new("a1").with_field("teacher", "u1").with_field("group", "g1");
//! let decision = adp
//!     .authorize("assignments", OperationKind::Update, &Identity::teacher("u1"), &assignment)
//!     .await;
//! println!("{decision}");
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod graph;
pub mod models;
pub mod registry;
pub mod repository;
pub mod rules;
pub mod schema;

pub use engine::*;
pub use error::*;
pub use models::*;
pub use registry::{SchemaRegistry, SchemaSnapshot};
pub use repository::{InMemoryRecordRepository, RecordRepository};
pub use rules::{ListFilter, Predicate};
pub use schema::*;
