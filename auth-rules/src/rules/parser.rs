//! Rule text parser.
//!
//! ```text
//! expr       := and ( "||" and )*
//! and        := unary ( "&&" unary )*
//! unary      := "!" unary | "(" expr ")" | comparison
//! comparison := operand op operand
//! op         := "?!=" | "?=" | "!=" | "="
//! operand    := auth | string | number | true | false | null | path
//! auth       := ( "@request.auth." | "auth." ) ident
//! path       := ident ( "." ident )*
//! ```

use super::ast::{CompareOp, Expr, FieldPath, Literal, Operand};
use crate::error::{AuthzError, Result};
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{alpha1, alphanumeric1, anychar, char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, not, opt, recognize, value},
    multi::{fold_many0, many0_count, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

/// Parse rule text into an unresolved expression
///
/// # Errors
///
/// Returns [`AuthzError::Parse`] with the byte offset of the first
/// unparseable input.
pub fn parse_rule(text: &str) -> Result<Expr> {
    if text.trim().is_empty() {
        return Err(AuthzError::Parse {
            rule: text.to_string(),
            offset: 0,
            message: "rule is empty".to_string(),
        });
    }

    match all_consuming(ws(or_expr))(text) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            let offset = text.len() - e.input.len();
            let message = match e.input.chars().next() {
                None => "unexpected end of rule".to_string(),
                Some(_) => {
                    let near: String = e.input.chars().take(16).collect();
                    format!("unexpected input near `{near}`")
                }
            };
            Err(AuthzError::Parse {
                rule: text.to_string(),
                offset,
                message,
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(AuthzError::Parse {
            rule: text.to_string(),
            offset: text.len(),
            message: "unexpected end of rule".to_string(),
        }),
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    fold_many0(
        preceded(ws(tag("||")), and_expr),
        move || first.clone(),
        Expr::or,
    )(input)
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    fold_many0(
        preceded(ws(tag("&&")), unary),
        move || first.clone(),
        Expr::and,
    )(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('!')), unary), Expr::not),
        delimited(ws(char('(')), or_expr, ws(char(')'))),
        comparison,
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    map(
        tuple((ws(operand), ws(compare_op), ws(operand))),
        |(lhs, op, rhs)| Expr::Compare { lhs, op, rhs },
    )(input)
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::AnyNotEq, tag("?!=")),
        value(CompareOp::AnyEq, tag("?=")),
        value(CompareOp::NotEq, tag("!=")),
        value(CompareOp::Eq, tag("=")),
    ))(input)
}

fn operand(input: &str) -> IResult<&str, Operand> {
    alt((
        map(auth_ref, Operand::Auth),
        map(string_literal, |s| Operand::Literal(Literal::Str(s))),
        map(number, |n: &str| Operand::Literal(Literal::Number(n.to_string()))),
        map(keyword_literal, Operand::Literal),
        map(field_path, Operand::Field),
    ))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn auth_ref(input: &str) -> IResult<&str, String> {
    map(
        preceded(alt((tag("@request.auth."), tag("auth."))), identifier),
        ToString::to_string,
    )(input)
}

fn field_path(input: &str) -> IResult<&str, FieldPath> {
    map(separated_list1(char('.'), identifier), |segments: Vec<&str>| {
        FieldPath::new(segments.into_iter().map(ToString::to_string).collect())
    })(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)
}

fn keyword_literal(input: &str) -> IResult<&str, Literal> {
    terminated(
        alt((
            value(Literal::Bool(true), tag("true")),
            value(Literal::Bool(false), tag("false")),
            value(Literal::Null, tag("null")),
        )),
        not(satisfy(|c: char| c.is_alphanumeric() || c == '_' || c == '.')),
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    alt((
        delimited(char('"'), string_body('"'), char('"')),
        delimited(char('\''), string_body('\''), char('\'')),
    ))(input)
}

fn string_body<'a>(quote: char) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    let stop = if quote == '"' { "\"\\" } else { "'\\" };
    fold_many0(
        alt((
            map(is_not(stop), ToString::to_string),
            map(preceded(char('\\'), anychar), |c| match c {
                'n' => "\n".to_string(),
                't' => "\t".to_string(),
                other => other.to_string(),
            }),
        )),
        String::new,
        |mut acc, part| {
            acc.push_str(&part);
            acc
        },
    )
}
