use crate::graph::ResolvedPath;
use std::collections::BTreeSet;
use std::fmt;

/// Boolean access predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Compare {
        lhs: Operand,
        op: CompareOp,
        rhs: Operand,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Produced by constant folding, never by the parser
    Const(bool),
}

/// One side of a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `auth.<name>` or `@request.auth.<name>`
    Auth(String),
    /// A field of the record, possibly through relation hops
    Field(FieldPath),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub segments: Vec<String>,
    /// Filled in when the predicate is compiled against a schema
    pub resolved: Option<ResolvedPath>,
}

impl FieldPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self {
            segments,
            resolved: None,
        }
    }

    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Str(String),
    /// Kept in source form; numbers compare by their text
    Number(String),
    Bool(bool),
    Null,
}

impl Literal {
    /// Text the literal compares as. `null` is the empty string.
    pub fn as_text(&self) -> String {
        match self {
            Literal::Str(s) | Literal::Number(s) => s.clone(),
            Literal::Bool(b) => b.to_string(),
            Literal::Null => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`: the operand value sets intersect
    Eq,
    /// `!=`: the operand value sets are disjoint
    NotEq,
    /// `?=`: any left value equals any right value
    AnyEq,
    /// `?!=`: any left value differs from any right value
    AnyNotEq,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::AnyEq => "?=",
            CompareOp::AnyNotEq => "?!=",
        }
    }

    /// Compare two value sets
    pub fn apply(self, left: &BTreeSet<String>, right: &BTreeSet<String>) -> bool {
        match self {
            CompareOp::Eq | CompareOp::AnyEq => !left.is_disjoint(right),
            CompareOp::NotEq => left.is_disjoint(right),
            CompareOp::AnyNotEq => left.iter().any(|l| right.iter().any(|r| l != r)),
        }
    }
}

impl Expr {
    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Expr::Or(Box::new(lhs), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    /// Every field path referenced by the expression
    pub fn field_paths(&self) -> Vec<&FieldPath> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            Expr::Compare { lhs, rhs, .. } => {
                for operand in [lhs, rhs] {
                    if let Operand::Field(path) = operand {
                        out.push(path);
                    }
                }
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_paths(out);
                r.collect_paths(out);
            }
            Expr::Not(inner) => inner.collect_paths(out),
            Expr::Const(_) => {}
        }
    }

    pub(crate) fn field_paths_mut(&mut self) -> Vec<&mut FieldPath> {
        let mut paths = Vec::new();
        self.collect_paths_mut(&mut paths);
        paths
    }

    fn collect_paths_mut<'a>(&'a mut self, out: &mut Vec<&'a mut FieldPath>) {
        match self {
            Expr::Compare { lhs, rhs, .. } => {
                for operand in [lhs, rhs] {
                    if let Operand::Field(path) = operand {
                        out.push(path);
                    }
                }
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_paths_mut(out);
                r.collect_paths_mut(out);
            }
            Expr::Not(inner) => inner.collect_paths_mut(out),
            Expr::Const(_) => {}
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(..) => 1,
            Expr::And(..) => 2,
            Expr::Compare { .. } | Expr::Not(_) | Expr::Const(_) => 3,
        }
    }

    fn fmt_child(&self, child: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() < self.precedence() {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Compare { lhs, op, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Expr::And(l, r) => {
                self.fmt_child(l, f)?;
                f.write_str(" && ")?;
                self.fmt_child(r, f)
            }
            Expr::Or(l, r) => {
                self.fmt_child(l, f)?;
                f.write_str(" || ")?;
                self.fmt_child(r, f)
            }
            Expr::Not(inner) => write!(f, "!({inner})"),
            Expr::Const(value) => write!(f, "{value}"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Auth(name) => write!(f, "@request.auth.{name}"),
            Operand::Field(path) => f.write_str(&path.dotted()),
            Operand::Literal(literal) => write!(f, "{literal}"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")
            }
            Literal::Number(n) => f.write_str(n),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => f.write_str("null"),
        }
    }
}
