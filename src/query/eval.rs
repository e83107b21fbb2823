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

//! In-memory evaluation of expressions against rows.
//!
//! Predicates evaluate to a false/true/unknown tri-state, following SQL:
//! anything involving a null is unknown, `NOT` of unknown is unknown, and a
//! row only passes a filter if the filter is definitely true.

use std::collections::BTreeMap;

use chrono_tz::Tz;
use regex::{Regex, RegexBuilder};

use super::expr::*;
use super::store::Storage;
use crate::support::error::Error;

pub type Row = BTreeMap<String, Value>;

pub struct Evaluator<'a> {
    storage: &'a dyn Storage,
    select: &'a [Selection],
}

impl<'a> Evaluator<'a> {
    pub fn new(storage: &'a dyn Storage, select: &'a [Selection]) -> Self {
        Evaluator { storage, select }
    }

    /// Whether `row` passes every one of `filters`.
    pub fn matches(&self, filters: &[Expr], row: &Row) -> Result<bool, Error> {
        for filter in filters {
            if Some(true) != self.eval(filter, row)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn eval(&self, expr: &Expr, row: &Row) -> Result<Option<bool>, Error> {
        Ok(match *expr {
            Expr::True => Some(true),
            Expr::False => Some(false),
            Expr::Compare(col, op, ref v) => {
                field(row, col).compare(v).map(|o| op.holds(o))
            }
            Expr::IsNull(col) => Some(field(row, col).is_null()),
            Expr::Like {
                column,
                ref pattern,
                case_insensitive,
            } => match *field(row, column) {
                Value::Null => None,
                ref v => Some(
                    like_to_regex(pattern, case_insensitive)?
                        .is_match(&v.to_string()),
                ),
            },
            Expr::Regex(col, ref pattern) => match *field(row, col) {
                Value::Null => None,
                ref v => Some(Regex::new(pattern)?.is_match(&v.to_string())),
            },
            Expr::In(col, ref values) => member(field(row, col), values),
            Expr::InSubquery(col, ref sub) => {
                let rows = self.storage.fetch(sub)?;
                let first = sub
                    .select
                    .first()
                    .map(Selection::output_name)
                    .unwrap_or_default();
                let values = rows
                    .into_iter()
                    .map(|mut r| r.remove(&first).unwrap_or(Value::Null))
                    .collect::<Vec<_>>();
                member(field(row, col), &values)
            }
            Expr::Not(ref inner) => self.eval(inner, row)?.map(|b| !b),
            Expr::And(ref exprs) => {
                let mut result = Some(true);
                for e in exprs {
                    match self.eval(e, row)? {
                        Some(false) => return Ok(Some(false)),
                        Some(true) => (),
                        None => result = None,
                    }
                }
                result
            }
            Expr::Or(ref exprs) => {
                let mut result = Some(false);
                for e in exprs {
                    match self.eval(e, row)? {
                        Some(true) => return Ok(Some(true)),
                        Some(false) => (),
                        None => result = None,
                    }
                }
                result
            }
        })
    }

    /// Evaluate a non-aggregate scalar against a single row.
    pub fn scalar(&self, s: &Scalar, row: &Row) -> Result<Value, Error> {
        Ok(match *s {
            Scalar::Column(col) => field(row, col).clone(),
            Scalar::Literal(ref v) => v.clone(),
            Scalar::CountAll | Scalar::Count(..) | Scalar::Sum(..) => {
                self.aggregate(s, &[row])?
            }
            Scalar::Round(ref inner) => round(self.scalar(inner, row)?),
            Scalar::Case(ref arms, ref otherwise) => {
                for &(ref cond, ref then) in arms {
                    if Some(true) == self.eval(cond, row)? {
                        return self.scalar(then, row);
                    }
                }
                self.scalar(otherwise, row)?
            }
            Scalar::LocalDate(col, ref tz) => match *field(row, col) {
                Value::Timestamp(ref t) => {
                    let zone = tz
                        .parse::<Tz>()
                        .map_err(|_| Error::UnknownTimezone(tz.clone()))?;
                    Value::Text(
                        t.with_timezone(&zone)
                            .format("%Y-%m-%d")
                            .to_string(),
                    )
                }
                _ => Value::Null,
            },
            Scalar::Label(label) => match self.labelled(label) {
                Some(sel) => self.scalar(&sel.scalar, row)?,
                None => Value::Null,
            },
        })
    }

    /// Evaluate a scalar over a group of rows.
    ///
    /// Non-aggregate scalars take their value from the first row of the
    /// group, which is what grouping columns need.
    pub fn aggregate(&self, s: &Scalar, rows: &[&Row]) -> Result<Value, Error> {
        Ok(match *s {
            Scalar::CountAll => Value::Int(rows.len() as i64),
            Scalar::Count(ref inner) => {
                let mut n = 0i64;
                for row in rows {
                    if !self.scalar(inner, row)?.is_null() {
                        n += 1;
                    }
                }
                Value::Int(n)
            }
            Scalar::Sum(ref inner) => {
                let mut int_sum = 0i64;
                let mut float_sum = 0.0f64;
                let mut any = false;
                let mut all_int = true;
                for row in rows {
                    match self.scalar(inner, row)? {
                        Value::Null => (),
                        Value::Int(i) => {
                            any = true;
                            int_sum += i;
                            float_sum += i as f64;
                        }
                        v => {
                            if let Some(f) = v.as_f64() {
                                any = true;
                                all_int = false;
                                float_sum += f;
                            }
                        }
                    }
                }

                if !any {
                    Value::Null
                } else if all_int {
                    Value::Int(int_sum)
                } else {
                    Value::Float(float_sum)
                }
            }
            Scalar::Round(ref inner) if inner.is_aggregate() => {
                round(self.aggregate(inner, rows)?)
            }
            Scalar::Label(label) => match self.labelled(label) {
                Some(sel) => self.aggregate(&sel.scalar, rows)?,
                None => Value::Null,
            },
            _ => match rows.first() {
                Some(row) => self.scalar(s, row)?,
                None => Value::Null,
            },
        })
    }

    fn labelled(&self, label: &str) -> Option<&'a Selection> {
        self.select
            .iter()
            .find(|sel| sel.label == Some(label))
            // A label which only names itself would recurse forever
            .filter(|sel| sel.scalar != Scalar::Label(sel.label.unwrap_or("")))
    }
}

fn field(row: &Row, col: Column) -> &Value {
    static NULL: Value = Value::Null;
    row.get(col.name).unwrap_or(&NULL)
}

fn member(value: &Value, set: &[Value]) -> Option<bool> {
    if value.is_null() {
        return None;
    }

    let mut saw_null = false;
    for candidate in set {
        match value.compare(candidate) {
            Some(o) if CmpOp::Eq.holds(o) => return Some(true),
            _ => saw_null |= candidate.is_null(),
        }
    }

    if saw_null {
        None
    } else {
        Some(false)
    }
}

fn round(v: Value) -> Value {
    match v {
        Value::Int(i) => Value::Int(i),
        v => v.as_f64().map(|f| Value::Float(f.round())).unwrap_or(Value::Null),
    }
}

/// Translate an SQL `LIKE` pattern into an anchored regular expression.
pub fn like_to_regex(
    pattern: &str,
    case_insensitive: bool,
) -> Result<Regex, Error> {
    let mut rx = String::with_capacity(pattern.len() + 8);
    rx.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => rx.push_str(".*"),
            '_' => rx.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    rx.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            c => rx.push_str(&regex::escape(&c.to_string())),
        }
    }
    rx.push('$');

    Ok(RegexBuilder::new(&rx)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::store::MemoryStore;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|&(k, ref v)| (k.to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn like_patterns() {
        let rx = like_to_regex("a%@x.com", false).unwrap();
        assert!(rx.is_match("a+anything@x.com"));
        assert!(rx.is_match("a@x.com"));
        assert!(!rx.is_match("b+anything@x.com"));
        assert!(!rx.is_match("a@y.com"));
        assert!(!rx.is_match("A+b@x.com"));

        let rx = like_to_regex("%FOO%", true).unwrap();
        assert!(rx.is_match("some foo here"));

        let rx = like_to_regex(r"100\%_", false).unwrap();
        assert!(rx.is_match("100%x"));
        assert!(!rx.is_match("1000x"));
    }

    #[test]
    fn three_valued_logic() {
        let store = MemoryStore::new();
        let ev = Evaluator::new(&store, &[]);
        let subject = Model::Message.col("subject");
        let null_row = row(&[]);
        let foo_row = row(&[("subject", Value::from("foo"))]);

        let contains = subject.ilike("%foo%");
        assert_eq!(None, ev.eval(&contains, &null_row).unwrap());
        assert_eq!(None, ev.eval(&!contains.clone(), &null_row).unwrap());
        assert_eq!(Some(true), ev.eval(&contains, &foo_row).unwrap());

        let or = Expr::or(vec![contains.clone(), Expr::True]);
        assert_eq!(Some(true), ev.eval(&or, &null_row).unwrap());
        let and = Expr::and(vec![contains, Expr::False]);
        assert_eq!(Some(false), ev.eval(&and, &null_row).unwrap());

        assert!(!ev.matches(&[subject.is_not_null()], &null_row).unwrap());
        assert!(ev.matches(&[subject.is_null()], &null_row).unwrap());
    }

    #[test]
    fn aggregates_over_groups() {
        let store = MemoryStore::new();
        let size = Model::Message.col("size");
        let select = vec![Selection {
            scalar: Scalar::sum(size.into()),
            label: Some("size"),
        }];
        let ev = Evaluator::new(&store, &select);
        let a = row(&[("size", Value::Int(3))]);
        let b = row(&[("size", Value::Int(4))]);
        let c = row(&[]);

        assert_eq!(
            Value::Int(7),
            ev.aggregate(&Scalar::Label("size"), &[&a, &b, &c]).unwrap()
        );
        assert_eq!(
            Value::Int(2),
            ev.aggregate(&Scalar::count(size.into()), &[&a, &b, &c])
                .unwrap()
        );
        assert_eq!(
            Value::Null,
            ev.aggregate(&Scalar::sum(size.into()), &[]).unwrap()
        );
    }

    #[test]
    fn local_date_follows_time_zone() {
        let store = MemoryStore::new();
        let ev = Evaluator::new(&store, &[]);
        let ts = Model::Message.col("timestamp");
        let r = row(&[(
            "timestamp",
            Value::Timestamp("2020-06-30T23:30:00Z".parse().unwrap()),
        )]);

        assert_eq!(
            Value::from("2020-07-01"),
            ev.scalar(&Scalar::LocalDate(ts, "Africa/Johannesburg".into()), &r)
                .unwrap()
        );
        assert_eq!(
            Value::from("2020-06-30"),
            ev.scalar(&Scalar::LocalDate(ts, "UTC".into()), &r).unwrap()
        );
        assert_matches!(
            Err(Error::UnknownTimezone(..)),
            ev.scalar(&Scalar::LocalDate(ts, "Mars/Olympus".into()), &r)
        );
    }
}
