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

//! Single field comparisons submitted by users.

use std::fmt;
use std::str::FromStr;

use chrono::prelude::*;
use log::debug;

use super::expr::*;
use super::schema::FieldRegistry;
use crate::support::error::Error;

/// The fixed set of comparison operators, numbered as the report filter
/// forms submit them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
    Regex,
    NotRegex,
    IsNull,
    NotNull,
    /// `field > 0`
    IsTrue,
    /// `field <= 0`
    IsFalse,
}

static CODES: &[(&str, FilterOp)] = &[
    ("1", FilterOp::Equal),
    ("2", FilterOp::NotEqual),
    ("3", FilterOp::GreaterThan),
    ("4", FilterOp::LessThan),
    ("5", FilterOp::Contains),
    ("6", FilterOp::NotContains),
    ("7", FilterOp::Regex),
    ("8", FilterOp::NotRegex),
    ("9", FilterOp::IsNull),
    ("10", FilterOp::NotNull),
    ("11", FilterOp::IsTrue),
    ("12", FilterOp::IsFalse),
];

impl FilterOp {
    pub fn from_code(code: &str) -> Option<Self> {
        CODES
            .iter()
            .find(|&&(c, _)| c == code.trim())
            .map(|&(_, op)| op)
    }

    pub fn code(self) -> &'static str {
        CODES
            .iter()
            .find(|&&(_, op)| op == self)
            .map(|&(c, _)| c)
            .unwrap_or("")
    }

    /// The suffix distinguishing this operator in filter grouping keys.
    pub fn key_suffix(self) -> &'static str {
        match self {
            FilterOp::Equal => "equal",
            FilterOp::NotEqual => "notequal",
            FilterOp::GreaterThan => "greaterthan",
            FilterOp::LessThan => "lessthan",
            FilterOp::Contains => "contains",
            FilterOp::NotContains => "ncontains",
            FilterOp::Regex => "regex",
            FilterOp::NotRegex => "nregex",
            FilterOp::IsNull => "isnull",
            FilterOp::NotNull => "nisnull",
            FilterOp::IsTrue => "istrue",
            FilterOp::IsFalse => "isfalse",
        }
    }

    fn takes_value(self) -> bool {
        !matches!(
            self,
            FilterOp::IsNull
                | FilterOp::NotNull
                | FilterOp::IsTrue
                | FilterOp::IsFalse
        )
    }

    fn is_textual(self) -> bool {
        matches!(
            self,
            FilterOp::Contains
                | FilterOp::NotContains
                | FilterOp::Regex
                | FilterOp::NotRegex
        )
    }
}

/// One (field, operator, value) triple.
///
/// The field is resolved against a `FieldRegistry` on construction. An
/// operator code outside the known set is accepted and kept, but such a
/// filter never produces a predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSpec {
    pub field: String,
    pub column: Column,
    pub code: String,
    pub op: Option<FilterOp>,
    pub value: Value,
}

impl FilterSpec {
    pub fn new(
        registry: &FieldRegistry,
        field: &str,
        code: &str,
        value: &str,
    ) -> Result<Self, Error> {
        let column = registry.resolve(field)?;
        let op = FilterOp::from_code(code);
        let value = match op {
            Some(op) if !op.takes_value() => Value::Null,
            Some(op) if op.is_textual() => Value::Text(value.to_owned()),
            Some(_) => coerce(column, value).ok_or_else(|| {
                Error::BadFilterValue(field.to_owned(), value.to_owned())
            })?,
            None => Value::Text(value.to_owned()),
        };

        Ok(FilterSpec {
            field: field.to_owned(),
            column,
            code: code.to_owned(),
            op,
            value,
        })
    }

    /// The key under which repeated filters are merged, e.g.
    /// `subject_contains`.
    pub fn key(&self) -> Option<String> {
        self.op
            .map(|op| format!("{}_{}", self.field, op.key_suffix()))
    }

    pub fn predicate(&self) -> Option<Expr> {
        match self.op {
            Some(op) => Some(build(self.column, op, &self.value)),
            None => {
                debug!(
                    "ignoring filter on '{}' with unknown operator '{}'",
                    self.field, self.code
                );
                None
            }
        }
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.field, self.code, self.value)
    }
}

/// Parse a filter written as `field:code:value`. The value may itself
/// contain colons.
pub fn parse_filter(
    registry: &FieldRegistry,
    text: &str,
) -> Result<FilterSpec, Error> {
    let mut parts = text.splitn(3, ':');
    let field = parts.next().unwrap_or("");
    let code = parts.next().unwrap_or("");
    let value = parts.next().unwrap_or("");
    FilterSpec::new(registry, field, code, value)
}

/// Translate one comparison into a predicate.
pub fn build(column: Column, op: FilterOp, value: &Value) -> Expr {
    match op {
        FilterOp::Equal => column.eq(value.clone()),
        FilterOp::NotEqual => column.ne(value.clone()),
        FilterOp::GreaterThan => column.gt(value.clone()),
        FilterOp::LessThan => column.lt(value.clone()),
        FilterOp::Contains => column.ilike(substring(value)),
        FilterOp::NotContains => !column.ilike(substring(value)),
        FilterOp::Regex => column.regex(value.to_string()),
        FilterOp::NotRegex => !column.regex(value.to_string()),
        FilterOp::IsNull => column.is_null(),
        FilterOp::NotNull => column.is_not_null(),
        FilterOp::IsTrue => column.gt(0),
        FilterOp::IsFalse => column.le(0),
    }
}

/// Wildcards in the user's value stay live.
fn substring(value: &Value) -> String {
    format!("%{}%", value)
}

fn coerce(column: Column, value: &str) -> Option<Value> {
    match column.kind {
        Kind::Text => Some(Value::Text(value.to_owned())),
        Kind::Integer => i64::from_str(value.trim()).ok().map(Value::Int),
        Kind::Float => f64::from_str(value.trim()).ok().map(Value::Float),
        Kind::Bool => match value.trim() {
            "1" | "true" | "t" => Some(Value::Bool(true)),
            "0" | "false" | "f" => Some(Value::Bool(false)),
            _ => None,
        },
        Kind::Timestamp => {
            let value = value.trim();
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(value, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|t| Utc.from_utc_datetime(&t))
                })
                .map(Value::Timestamp)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::eval::{like_to_regex, Evaluator, Row};
    use crate::query::sql::render_expr;
    use crate::query::store::MemoryStore;

    fn registry() -> FieldRegistry {
        FieldRegistry::all(Model::Message)
    }

    fn spec(field: &str, code: &str, value: &str) -> FilterSpec {
        FilterSpec::new(&registry(), field, code, value).unwrap()
    }

    #[test]
    fn operator_codes() {
        for &(code, op) in CODES {
            assert_eq!(Some(op), FilterOp::from_code(code));
            assert_eq!(code, op.code());
        }
        assert_eq!(None, FilterOp::from_code("13"));
        assert_eq!(None, FilterOp::from_code(""));
    }

    #[test]
    fn builds_each_operator() {
        let cases = &[
            ("subject", "1", "hi", "subject = $1"),
            ("subject", "2", "hi", "subject != $1"),
            ("size", "3", "100", "size > $1"),
            ("size", "4", "100", "size < $1"),
            ("subject", "5", "Hi", "subject ILIKE $1"),
            ("subject", "6", "Hi", "NOT (subject ILIKE $1)"),
            ("subject", "7", "^h", "subject ~ $1"),
            ("subject", "8", "^h", "NOT (subject ~ $1)"),
            ("subject", "9", "ignored", "subject IS NULL"),
            ("subject", "10", "ignored", "NOT (subject IS NULL)"),
            ("spam", "11", "ignored", "spam > $1"),
            ("spam", "12", "ignored", "spam <= $1"),
        ];

        for &(field, code, value, expected) in cases {
            let pred = spec(field, code, value).predicate().unwrap();
            assert_eq!(expected, render_expr(&pred).text, "code {}", code);
        }
    }

    #[test]
    fn contains_wraps_value() {
        let pred = spec("subject", "5", "50%off").predicate().unwrap();
        assert_eq!(vec![Value::from("%50%off%")], render_expr(&pred).params);

        let rx = like_to_regex("%50%off%", true).unwrap();
        assert!(rx.is_match("Now 50 percent OFF"));
        assert!(!rx.is_match("50 pence"));

        let store = MemoryStore::new();
        let ev = Evaluator::new(&store, &[]);
        let mut row = Row::new();
        row.insert("subject".to_owned(), Value::from("50 percent off"));
        assert_eq!(Some(true), ev.eval(&pred, &row).unwrap());
        let pred = spec("subject", "6", "50%off").predicate().unwrap();
        assert_eq!(Some(false), ev.eval(&pred, &row).unwrap());

        let pred = spec("spam", "11", "whatever").predicate().unwrap();
        assert_eq!(vec![Value::Int(0)], render_expr(&pred).params);
    }

    #[test]
    fn values_are_coerced_to_column_kind() {
        assert_eq!(Value::Int(100), spec("size", "3", " 100 ").value);
        assert_eq!(Value::Float(5.5), spec("sascore", "4", "5.5").value);
        assert_eq!(
            Value::Timestamp("2020-06-01T00:00:00Z".parse().unwrap()),
            spec("timestamp", "3", "2020-06-01").value
        );
        assert_eq!(Value::from("100"), spec("size", "5", "100").value);
        assert_matches!(
            Err(Error::BadFilterValue(..)),
            FilterSpec::new(&registry(), "size", "3", "lots")
        );
    }

    #[test]
    fn unknown_field_fails_on_construction() {
        assert_matches!(
            Err(Error::UnknownField(..)),
            FilterSpec::new(&registry(), "subjcet", "1", "x")
        );
    }

    #[test]
    fn unknown_operator_produces_nothing() {
        let s = spec("subject", "99", "x");
        assert_eq!(None, s.op);
        assert_eq!(None, s.key());
        assert_eq!(None, s.predicate());
    }

    #[test]
    fn keys_combine_field_and_operator() {
        assert_eq!(
            Some("subject_contains".to_owned()),
            spec("subject", "5", "x").key()
        );
        assert_eq!(
            Some("size_greaterthan".to_owned()),
            spec("size", "3", "1").key()
        );
    }

    #[test]
    fn parse_colon_syntax() {
        let s = parse_filter(&registry(), "subject:1:re: hello").unwrap();
        assert_eq!("subject", s.field);
        assert_eq!(Some(FilterOp::Equal), s.op);
        assert_eq!(Value::from("re: hello"), s.value);
        assert_eq!("subject:1:re: hello", s.to_string());
    }
}
