use super::ast::{Expr, Literal, Operand};
use super::Predicate;
use crate::models::Identity;
use crate::schema::DefaultPolicy;
use std::collections::BTreeSet;
use std::fmt;

/// A list rule specialised to one identity, for the storage layer to turn
/// into a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    /// Every record is listable
    AllowAll,
    /// No record is listable; storage need not be queried
    DenyAll,
    /// Records matching the residual expression are listable
    Filter(Expr),
}

impl ListFilter {
    /// Build the filter for `identity` from a list rule, or from the
    /// collection policy when the slot is unset
    pub fn for_identity(
        predicate: Option<&Predicate>,
        policy: DefaultPolicy,
        identity: &Identity,
    ) -> Self {
        let Some(predicate) = predicate else {
            return match policy {
                DefaultPolicy::AllowAll => ListFilter::AllowAll,
                DefaultPolicy::DenyAll => ListFilter::DenyAll,
            };
        };
        match fold(bind_identity(predicate.expr(), identity)) {
            Expr::Const(true) => ListFilter::AllowAll,
            Expr::Const(false) => ListFilter::DenyAll,
            residual => ListFilter::Filter(residual),
        }
    }

    pub fn is_deny_all(&self) -> bool {
        matches!(self, ListFilter::DenyAll)
    }
}

impl fmt::Display for ListFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListFilter::AllowAll => f.write_str("<all records>"),
            ListFilter::DenyAll => f.write_str("<no records>"),
            ListFilter::Filter(expr) => write!(f, "{expr}"),
        }
    }
}

/// Replace every `auth.*` reference with the identity's value
pub fn bind_identity(expr: &Expr, identity: &Identity) -> Expr {
    let bind = |operand: &Operand| match operand {
        Operand::Auth(name) => Operand::Literal(Literal::Str(
            identity.attribute(name).unwrap_or_default().to_string(),
        )),
        other => other.clone(),
    };
    match expr {
        Expr::Compare { lhs, op, rhs } => Expr::Compare {
            lhs: bind(lhs),
            op: *op,
            rhs: bind(rhs),
        },
        Expr::And(l, r) => Expr::and(bind_identity(l, identity), bind_identity(r, identity)),
        Expr::Or(l, r) => Expr::or(bind_identity(l, identity), bind_identity(r, identity)),
        Expr::Not(inner) => Expr::not(bind_identity(inner, identity)),
        Expr::Const(value) => Expr::Const(*value),
    }
}

/// Evaluate literal-only comparisons and simplify connectives around them
pub fn fold(expr: Expr) -> Expr {
    match expr {
        Expr::Compare {
            lhs: Operand::Literal(ref left),
            op,
            rhs: Operand::Literal(ref right),
        } => Expr::Const(op.apply(
            &BTreeSet::from([left.as_text()]),
            &BTreeSet::from([right.as_text()]),
        )),
        Expr::And(l, r) => match (fold(*l), fold(*r)) {
            (Expr::Const(false), _) | (_, Expr::Const(false)) => Expr::Const(false),
            (Expr::Const(true), other) | (other, Expr::Const(true)) => other,
            (l, r) => Expr::and(l, r),
        },
        Expr::Or(l, r) => match (fold(*l), fold(*r)) {
            (Expr::Const(true), _) | (_, Expr::Const(true)) => Expr::Const(true),
            (Expr::Const(false), other) | (other, Expr::Const(false)) => other,
            (l, r) => Expr::or(l, r),
        },
        Expr::Not(inner) => match fold(*inner) {
            Expr::Const(value) => Expr::Const(!value),
            other => Expr::not(other),
        },
        other => other,
    }
}
