//! Common error handling utilities for the Learnmap engine
//!
//! Every crate in the workspace defines its own `thiserror` enum. This crate
//! gives those enums a shared vocabulary:
//!
//! - **Error Codes**: stable, machine-readable strings (`RULE_1001`, ...)
//!   grouped by failure category in [`codes`]
//! - **[`ErrorCode`] trait**: implemented by every crate error so callers can
//!   report a code without matching on foreign variants
//! - **[`EngineError`]**: the top-level error used by binaries, carrying the
//!   originating code alongside the rendered message
//!
//! # Error Categories
//!
//! - **Rule**: malformed rule text, rejected when a rule is registered
//! - **Schema**: configuration errors such as traversal paths that name a
//!   missing or non-relation field
//! - **NotFound**: absent collections or records
//! - **Authorization**: denials and lookup timeouts
//! - **Migration**: failed or inconsistent schema migrations
//! - **Config**: invalid engine configuration
//!
//! # Example
//!
//! ```rust
//! use error_common::{codes, EngineError, ErrorCode};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("rule text is empty")]
//! struct EmptyRule;
//!
//! impl ErrorCode for EmptyRule {
//!     fn code(&self) -> &'static str {
//!         codes::rule::PARSE_ERROR
//!     }
//! }
//!
//! let err = EngineError::from_coded(&EmptyRule);
//! assert_eq!(err.code(), "RULE_1001");
//! ```

pub mod codes;
pub mod types;

pub use types::*;
