//! Small typed stand-ins for the loose primitives `SqlConverter` threads
//! around as bare strings and ints (`on_conflict: str`, `axis: int`).

use crate::value::Value;
use std::fmt;

/// Comparison operators a leaf condition may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    In,
    Is,
    IsNot,
}

impl Op {
    fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Like => "LIKE",
            Op::In => "IN",
            Op::Is => "IS",
            Op::IsNot => "IS NOT",
        }
    }

    /// `condition_anchor` from the original: a parenthesised, comma-joined
    /// `?` list sized to the value when this is `IN` over a list, else a
    /// single bare `?`.
    pub fn anchor(self, value: &Value) -> String {
        match (self, value) {
            (Op::In, Value::JsonList(items)) => {
                format!("({})", vec!["?"; items.len()].join(", "))
            }
            _ => "?".to_string(),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// `INSERT OR <...>` conflict handling, spec.md §4.3 rule 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    #[default]
    None_,
    Ignore,
    Replace,
    Rollback,
    Abort,
    Fail,
}

impl OnConflict {
    pub fn sql(self) -> &'static str {
        match self {
            OnConflict::None_ => "",
            OnConflict::Ignore => "OR IGNORE",
            OnConflict::Replace => "OR REPLACE",
            OnConflict::Rollback => "OR ROLLBACK",
            OnConflict::Abort => "OR ABORT",
            OnConflict::Fail => "OR FAIL",
        }
    }
}

/// `ASC`/`DESC`, replacing the original's raw `axis: 0 | 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Desc,
    Asc,
}

impl Axis {
    pub fn as_sql(self) -> &'static str {
        match self {
            Axis::Desc => "DESC",
            Axis::Asc => "ASC",
        }
    }
}

/// `ORDER BY <fields> <axis>`.
#[derive(Debug, Clone)]
pub struct Order {
    pub fields: Vec<String>,
    pub axis: Axis,
}

impl Order {
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>, axis: Axis) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            axis,
        }
    }
}
