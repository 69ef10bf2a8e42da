//! Filter expressions for `GET /v3/messages`.
//!
//! ```text
//! expr   := simple (conj expr)?
//! simple := field op value
//! field  := "from_email" | "to_email" | "subject" | "status" | "msg_id"
//! op     := "=" | "!="
//! value  := '"' chars '"'          (a backslash takes the next char literally)
//! conj   := "AND" | "OR"
//! ```
//!
//! A conjunction always takes the whole remaining expression as its right
//! operand, so `a AND b OR c` reads as `a AND (b OR c)`.

use axum::http::StatusCode;
use thiserror::Error;

/// Message attribute a leaf compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Sender,
    Receiver,
    Subject,
    Status,
    MessageId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    Leaf {
        field: Field,
        op: Operator,
        value: String,
    },
    Expr {
        conj: Conjunction,
        left: Box<QueryNode>,
        right: Box<QueryNode>,
    },
}

impl QueryNode {
    pub fn leaf(field: Field, op: Operator, value: impl Into<String>) -> Self {
        QueryNode::Leaf {
            field,
            op,
            value: value.into(),
        }
    }

    pub fn and(left: QueryNode, right: QueryNode) -> Self {
        QueryNode::Expr {
            conj: Conjunction::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: QueryNode, right: QueryNode) -> Self {
        QueryNode::Expr {
            conj: Conjunction::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Malformed filter expression. Always a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid query near \"{near}\"")]
pub struct QuerySyntaxError {
    near: String,
}

impl QuerySyntaxError {
    fn at(rest: &str) -> Self {
        QuerySyntaxError {
            near: excerpt(rest, 20),
        }
    }

    pub fn code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

const FIELDS: [(&str, Field); 5] = [
    ("from_email", Field::Sender),
    ("to_email", Field::Receiver),
    ("subject", Field::Subject),
    ("status", Field::Status),
    ("msg_id", Field::MessageId),
];

/// First `n` characters of `input`, with " ..." appended when cut short.
fn excerpt(input: &str, n: usize) -> String {
    match input.char_indices().nth(n) {
        Some((idx, _)) => format!("{} ...", &input[..idx]),
        None => input.to_string(),
    }
}

fn skip_ws(input: &str) -> &str {
    input.trim_start()
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse a filter expression into a tree.
pub fn parse_query(input: &str) -> Result<QueryNode, QuerySyntaxError> {
    let (node, _) = parse_expr(input)?;
    Ok(node)
}

fn parse_expr(input: &str) -> Result<(QueryNode, &str), QuerySyntaxError> {
    let (left, rest) = parse_simple(input)?;
    let rest = skip_ws(rest);
    if rest.is_empty() {
        return Ok((left, rest));
    }
    let (conj, rest) = parse_conj(rest)?;
    let (right, rest) = parse_expr(rest)?;
    let node = QueryNode::Expr {
        conj,
        left: Box::new(left),
        right: Box::new(right),
    };
    Ok((node, rest))
}

fn parse_conj(input: &str) -> Result<(Conjunction, &str), QuerySyntaxError> {
    if let Some(rest) = input.strip_prefix("AND") {
        Ok((Conjunction::And, rest))
    } else if let Some(rest) = input.strip_prefix("OR") {
        Ok((Conjunction::Or, rest))
    } else {
        Err(QuerySyntaxError::at(input))
    }
}

fn parse_simple(input: &str) -> Result<(QueryNode, &str), QuerySyntaxError> {
    let (field, rest) = parse_field(skip_ws(input))?;
    let (op, rest) = parse_operator(skip_ws(rest))?;
    let (value, rest) = parse_value(skip_ws(rest))?;
    Ok((QueryNode::Leaf { field, op, value }, rest))
}

fn parse_field(input: &str) -> Result<(Field, &str), QuerySyntaxError> {
    for (name, field) in FIELDS {
        if let Some(rest) = input.strip_prefix(name) {
            if !rest.starts_with(is_word_char) {
                return Ok((field, rest));
            }
        }
    }
    Err(QuerySyntaxError::at(input))
}

fn parse_operator(input: &str) -> Result<(Operator, &str), QuerySyntaxError> {
    if let Some(rest) = input.strip_prefix("!=") {
        Ok((Operator::NotEqual, rest))
    } else if let Some(rest) = input.strip_prefix('=') {
        Ok((Operator::Equal, rest))
    } else {
        Err(QuerySyntaxError::at(input))
    }
}

// `\X` yields `X` for every X, so `\n` is the letter n.
fn parse_value(input: &str) -> Result<(String, &str), QuerySyntaxError> {
    let Some(body) = input.strip_prefix('"') else {
        return Err(QuerySyntaxError::at(input));
    };
    let mut value = String::new();
    let mut chars = body.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &body[idx + 1..])),
            '\\' => match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => break,
            },
            _ => value.push(c),
        }
    }
    Err(QuerySyntaxError::at(input))
}
