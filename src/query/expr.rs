//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Mailscope.
//
// Mailscope is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version  3 of the License, or (at  your option)
// any later version.
//
// Mailscope is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailscope. If not, see <http://www.gnu.org/licenses/>.

//! The expression language queries are composed in.
//!
//! Nothing in here knows how to execute anything. A `Query` is a deferred
//! description which is handed to a `Storage` implementation or rendered to
//! SQL by the caller.

use std::cmp::Ordering;
use std::fmt;
use std::ops;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

pub use super::schema::{Column, Kind, Model};

/// A literal value, either in a predicate or in a result row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(*self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            Value::Bool(b) => Some(b as i64 as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match *self {
            Value::Text(ref s) => Some(s),
            _ => None,
        }
    }

    /// SQL-style comparison. `None` if either side is null or the two values
    /// are of incomparable kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (&Value::Null, _) | (_, &Value::Null) => None,
            (&Value::Text(ref a), &Value::Text(ref b)) => Some(a.cmp(b)),
            (&Value::Timestamp(ref a), &Value::Timestamp(ref b)) => {
                Some(a.cmp(b))
            }
            (&Value::Int(a), &Value::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Timestamp(ref t) => write!(f, "{}", t.to_rfc3339()),
            Value::Text(ref s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// A boolean predicate over one row.
///
/// `Like` patterns use SQL syntax: `%` and `_` are wildcards and a backslash
/// escapes the following character.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    True,
    False,
    Compare(Column, CmpOp, Value),
    IsNull(Column),
    Like {
        column: Column,
        pattern: String,
        case_insensitive: bool,
    },
    Regex(Column, String),
    In(Column, Vec<Value>),
    InSubquery(Column, Box<Query>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn and(exprs: Vec<Expr>) -> Self {
        Expr::And(exprs)
    }

    pub fn or(exprs: Vec<Expr>) -> Self {
        Expr::Or(exprs)
    }
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl Column {
    pub fn eq(self, v: impl Into<Value>) -> Expr {
        Expr::Compare(self, CmpOp::Eq, v.into())
    }

    pub fn ne(self, v: impl Into<Value>) -> Expr {
        Expr::Compare(self, CmpOp::Ne, v.into())
    }

    pub fn lt(self, v: impl Into<Value>) -> Expr {
        Expr::Compare(self, CmpOp::Lt, v.into())
    }

    pub fn le(self, v: impl Into<Value>) -> Expr {
        Expr::Compare(self, CmpOp::Le, v.into())
    }

    pub fn gt(self, v: impl Into<Value>) -> Expr {
        Expr::Compare(self, CmpOp::Gt, v.into())
    }

    pub fn ge(self, v: impl Into<Value>) -> Expr {
        Expr::Compare(self, CmpOp::Ge, v.into())
    }

    pub fn between(self, lo: impl Into<Value>, hi: impl Into<Value>) -> Expr {
        Expr::And(vec![self.ge(lo), self.le(hi)])
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(self)
    }

    pub fn is_not_null(self) -> Expr {
        !Expr::IsNull(self)
    }

    pub fn like(self, pattern: impl Into<String>) -> Expr {
        Expr::Like {
            column: self,
            pattern: pattern.into(),
            case_insensitive: false,
        }
    }

    pub fn ilike(self, pattern: impl Into<String>) -> Expr {
        Expr::Like {
            column: self,
            pattern: pattern.into(),
            case_insensitive: true,
        }
    }

    pub fn regex(self, pattern: impl Into<String>) -> Expr {
        Expr::Regex(self, pattern.into())
    }

    pub fn in_<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expr::In(self, values.into_iter().map(Into::into).collect())
    }

    pub fn in_query(self, query: Query) -> Expr {
        Expr::InSubquery(self, Box::new(query))
    }
}

/// A value-producing expression in a select list, grouping or ordering.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Column(Column),
    Literal(Value),
    CountAll,
    Count(Box<Scalar>),
    Sum(Box<Scalar>),
    Round(Box<Scalar>),
    /// `CASE WHEN .. THEN .. ELSE .. END`
    Case(Vec<(Expr, Scalar)>, Box<Scalar>),
    /// The calendar date of a timestamp column in the given time zone.
    LocalDate(Column, String),
    /// Refers back to a labelled item of the select list.
    Label(&'static str),
}

impl Scalar {
    pub fn count(inner: Scalar) -> Self {
        Scalar::Count(Box::new(inner))
    }

    pub fn sum(inner: Scalar) -> Self {
        Scalar::Sum(Box::new(inner))
    }

    pub fn round(inner: Scalar) -> Self {
        Scalar::Round(Box::new(inner))
    }

    /// `CASE WHEN cond THEN 1 ELSE 0 END`, the usual way of counting matches
    /// inside a `sum`.
    pub fn flag(cond: Expr) -> Self {
        Scalar::Case(
            vec![(cond, Scalar::Literal(Value::Int(1)))],
            Box::new(Scalar::Literal(Value::Int(0))),
        )
    }

    pub fn is_aggregate(&self) -> bool {
        match *self {
            Scalar::CountAll | Scalar::Count(..) | Scalar::Sum(..) => true,
            Scalar::Round(ref inner) => inner.is_aggregate(),
            _ => false,
        }
    }
}

impl From<Column> for Scalar {
    fn from(c: Column) -> Self {
        Scalar::Column(c)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub scalar: Scalar,
    pub label: Option<&'static str>,
}

impl Selection {
    /// The name this item has in result rows.
    pub fn output_name(&self) -> String {
        match (self.label, &self.scalar) {
            (Some(label), _) => label.to_owned(),
            (None, &Scalar::Column(c)) => c.name.to_owned(),
            (None, _) => "?column?".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub scalar: Scalar,
    pub descending: bool,
}

/// A cache hint attached to a query; see `query::cache`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheHint {
    pub region: String,
    pub key: String,
    pub expire_secs: u64,
}

/// A composed, not yet executed, read query.
///
/// All narrowing methods consume the query and return the narrowed one.
/// Filters are AND-ed in the order they were added.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub source: Model,
    pub select: Vec<Selection>,
    pub filters: Vec<Expr>,
    pub group_by: Vec<Scalar>,
    pub order_by: Vec<OrderBy>,
    pub distinct: bool,
    pub cache: Option<CacheHint>,
}

impl Query {
    pub fn new(source: Model) -> Self {
        Query {
            source,
            select: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            distinct: false,
            cache: None,
        }
    }

    pub fn select(mut self, scalar: impl Into<Scalar>) -> Self {
        self.select.push(Selection {
            scalar: scalar.into(),
            label: None,
        });
        self
    }

    pub fn select_as(
        mut self,
        scalar: impl Into<Scalar>,
        label: &'static str,
    ) -> Self {
        self.select.push(Selection {
            scalar: scalar.into(),
            label: Some(label),
        });
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn group_by(mut self, scalar: impl Into<Scalar>) -> Self {
        self.group_by.push(scalar.into());
        self
    }

    pub fn order_by(mut self, scalar: impl Into<Scalar>) -> Self {
        self.order_by.push(OrderBy {
            scalar: scalar.into(),
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, scalar: impl Into<Scalar>) -> Self {
        self.order_by.push(OrderBy {
            scalar: scalar.into(),
            descending: true,
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Look up a column of this query's source model. See `Model::col`.
    pub fn col(&self, name: &str) -> Column {
        self.source.col(name)
    }

    /// The select item carrying the given label, if any.
    pub fn labelled(&self, label: &str) -> Option<&Selection> {
        self.select.iter().find(|s| s.label == Some(label))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn value_comparison() {
        assert_eq!(
            Some(Ordering::Less),
            Value::Int(1).compare(&Value::Float(1.5))
        );
        assert_eq!(
            Some(Ordering::Greater),
            Value::from("b").compare(&Value::from("a"))
        );
        assert_eq!(None, Value::Null.compare(&Value::Null));
        assert_eq!(None, Value::from("1").compare(&Value::Int(1)));
    }

    #[test]
    fn builder_accumulates_filters_in_order() {
        let q = Query::new(Model::Message);
        let size = q.col("size");
        let q = q.filter(size.gt(10)).filter(size.le(20)).distinct();
        assert_eq!(
            vec![
                Expr::Compare(size, CmpOp::Gt, Value::Int(10)),
                Expr::Compare(size, CmpOp::Le, Value::Int(20)),
            ],
            q.filters
        );
        assert!(q.distinct);
    }

    #[test]
    fn aggregates_are_recognised() {
        let size = Model::Message.col("size");
        assert!(Scalar::sum(size.into()).is_aggregate());
        assert!(Scalar::round(Scalar::CountAll).is_aggregate());
        assert!(!Scalar::round(size.into()).is_aggregate());
        assert!(!Scalar::flag(size.gt(0)).is_aggregate());
    }
}
