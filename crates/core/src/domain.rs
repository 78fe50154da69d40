//! Typed domain filters and record shapes for backend reads.
//!
//! A domain is an ordered list of `(field, operator, value)` clauses plus
//! prefix logical markers, rendered to the backend's wire form as a JSON
//! array of `"|"`/`"&"`/`"!"` strings and `[field, op, value]` triples.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A raw backend record: field name to JSON value.
pub type Record = serde_json::Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    ILike,
    In,
}

impl CompareOp {
    pub fn wire(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::ILike => "ilike",
            Self::In => "in",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Text(String),
    IntList(Vec<i64>),
}

impl FilterValue {
    pub fn wire(&self) -> Value {
        match self {
            Self::Bool(value) => json!(value),
            Self::Int(value) => json!(value),
            Self::Text(value) => json!(value),
            Self::IntList(values) => json!(values),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<i64>> for FilterValue {
    fn from(values: Vec<i64>) -> Self {
        Self::IntList(values)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Clause {
    pub field: String,
    pub op: CompareOp,
    pub value: FilterValue,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DomainExpr {
    Or,
    And,
    Not,
    Clause(Clause),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Domain {
    exprs: Vec<DomainExpr>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clause, builder style.
    pub fn filter(mut self, field: impl Into<String>, op: CompareOp, value: impl Into<FilterValue>) -> Self {
        self.push_clause(field, op, value);
        self
    }

    pub fn push_clause(
        &mut self,
        field: impl Into<String>,
        op: CompareOp,
        value: impl Into<FilterValue>,
    ) {
        self.exprs.push(DomainExpr::Clause(Clause {
            field: field.into(),
            op,
            value: value.into(),
        }));
    }

    pub fn push(&mut self, expr: DomainExpr) {
        self.exprs.push(expr);
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn exprs(&self) -> &[DomainExpr] {
        &self.exprs
    }

    pub fn clauses(&self) -> impl Iterator<Item = &Clause> {
        self.exprs.iter().filter_map(|expr| match expr {
            DomainExpr::Clause(clause) => Some(clause),
            _ => None,
        })
    }

    pub fn to_wire(&self) -> Value {
        let items: Vec<Value> = self
            .exprs
            .iter()
            .map(|expr| match expr {
                DomainExpr::Or => json!("|"),
                DomainExpr::And => json!("&"),
                DomainExpr::Not => json!("!"),
                DomainExpr::Clause(clause) => {
                    json!([clause.field, clause.op.wire(), clause.value.wire()])
                }
            })
            .collect();
        Value::Array(items)
    }

    /// Compact single-line rendering for audit records.
    pub fn render(&self) -> String {
        self.to_wire().to_string()
    }
}

/// A related-record reference: the backend returns many2one fields as a
/// `[id, display_name]` pair, or `false` when unset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdName {
    pub id: i64,
    pub name: String,
}

impl IdName {
    pub fn from_value(value: &Value) -> Option<Self> {
        let pair = value.as_array()?;
        if pair.len() < 2 {
            return None;
        }
        Some(Self {
            id: pair[0].as_i64()?,
            name: pair[1].as_str()?.to_string(),
        })
    }
}
