//! Row conditions: a small expression language for filtering rows.
//!
//! Conditions such as `row.status == "running" && row.cpu > 50` are parsed
//! into an [`Expr`] tree and interpreted against JSON rows. Nothing is ever
//! compiled or executed from the source text.

mod eval;
mod parser;

pub use eval::truthy;
pub use parser::{CompareOp, Expr};

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Condition parse errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unexpected token `{found}` at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },
    #[error("unexpected end of condition")]
    UnexpectedEnd,
    #[error("condition nests deeper than {0} levels")]
    TooDeep(usize),
}

/// A parsed row condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(src: &str) -> Result<Self, ConditionError> {
        Ok(Self {
            source: src.trim().to_string(),
            expr: parser::parse(src)?,
        })
    }

    /// Whether `row` satisfies the condition.
    pub fn matches(&self, row: &Value) -> bool {
        truthy(&eval::eval(&self.expr, row))
    }

    /// Keep the rows whose JSON form satisfies the condition.
    ///
    /// Rows that fail to serialize are dropped.
    pub fn filter<T: Serialize>(&self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter()
            .filter(|row| {
                serde_json::to_value(row)
                    .map(|v| self.matches(&v))
                    .unwrap_or(false)
            })
            .collect()
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
