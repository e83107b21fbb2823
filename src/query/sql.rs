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

//! Rendering of queries to PostgreSQL-flavoured SQL.
//!
//! Every literal becomes a positional `$n` parameter; nothing from a filter
//! value is ever interpolated into the text.

use std::fmt::Write;

use super::expr::*;

#[derive(Clone, Debug, PartialEq)]
pub struct Sql {
    pub text: String,
    pub params: Vec<Value>,
}

pub fn render(query: &Query) -> Sql {
    let mut w = Writer {
        text: String::new(),
        params: Vec::new(),
    };
    w.query(query);
    Sql {
        text: w.text,
        params: w.params,
    }
}

/// Render just a predicate, as it would appear in a `WHERE` clause.
pub fn render_expr(expr: &Expr) -> Sql {
    let mut w = Writer {
        text: String::new(),
        params: Vec::new(),
    };
    w.expr(expr);
    Sql {
        text: w.text,
        params: w.params,
    }
}

struct Writer {
    text: String,
    params: Vec<Value>,
}

impl Writer {
    fn param(&mut self, value: &Value) {
        self.params.push(value.clone());
        let _ = write!(self.text, "${}", self.params.len());
    }

    fn query(&mut self, q: &Query) {
        self.text.push_str("SELECT ");
        if q.distinct {
            self.text.push_str("DISTINCT ");
        }

        if q.select.is_empty() {
            self.text.push('*');
        }
        for (ix, sel) in q.select.iter().enumerate() {
            if ix > 0 {
                self.text.push_str(", ");
            }
            self.scalar(&sel.scalar);
            if let Some(label) = sel.label {
                let _ = write!(self.text, " AS {}", label);
            }
        }

        let _ = write!(self.text, " FROM {}", q.source.table());

        if !q.filters.is_empty() {
            self.text.push_str(" WHERE ");
            for (ix, filter) in q.filters.iter().enumerate() {
                if ix > 0 {
                    self.text.push_str(" AND ");
                }
                self.nested(filter);
            }
        }

        if !q.group_by.is_empty() {
            self.text.push_str(" GROUP BY ");
            for (ix, g) in q.group_by.iter().enumerate() {
                if ix > 0 {
                    self.text.push_str(", ");
                }
                self.scalar(g);
            }
        }

        if !q.order_by.is_empty() {
            self.text.push_str(" ORDER BY ");
            for (ix, o) in q.order_by.iter().enumerate() {
                if ix > 0 {
                    self.text.push_str(", ");
                }
                self.scalar(&o.scalar);
                if o.descending {
                    self.text.push_str(" DESC");
                }
            }
        }
    }

    /// Write `e`, parenthesised if it is a compound expression.
    fn nested(&mut self, e: &Expr) {
        match *e {
            Expr::And(ref v) | Expr::Or(ref v) if v.len() > 1 => {
                self.text.push('(');
                self.expr(e);
                self.text.push(')');
            }
            _ => self.expr(e),
        }
    }

    fn junction(&mut self, exprs: &[Expr], op: &str, empty: &str) {
        if exprs.is_empty() {
            self.text.push_str(empty);
            return;
        }

        for (ix, e) in exprs.iter().enumerate() {
            if ix > 0 {
                self.text.push_str(op);
            }
            self.nested(e);
        }
    }

    fn expr(&mut self, e: &Expr) {
        match *e {
            Expr::True => self.text.push_str("true"),
            Expr::False => self.text.push_str("false"),
            Expr::Compare(col, op, ref v) => {
                let _ = write!(self.text, "{} {} ", col, op.sql());
                self.param(v);
            }
            Expr::IsNull(col) => {
                let _ = write!(self.text, "{} IS NULL", col);
            }
            Expr::Like {
                column,
                ref pattern,
                case_insensitive,
            } => {
                let _ = write!(
                    self.text,
                    "{} {} ",
                    column,
                    if case_insensitive { "ILIKE" } else { "LIKE" }
                );
                self.param(&Value::Text(pattern.clone()));
            }
            Expr::Regex(col, ref pattern) => {
                let _ = write!(self.text, "{} ~ ", col);
                self.param(&Value::Text(pattern.clone()));
            }
            Expr::In(col, ref values) => {
                if values.is_empty() {
                    // IN () is a syntax error
                    let _ = write!(self.text, "{} != {}", col, col);
                    return;
                }

                let _ = write!(self.text, "{} IN (", col);
                for (ix, v) in values.iter().enumerate() {
                    if ix > 0 {
                        self.text.push_str(", ");
                    }
                    self.param(v);
                }
                self.text.push(')');
            }
            Expr::InSubquery(col, ref sub) => {
                let _ = write!(self.text, "{} IN (", col);
                self.query(sub);
                self.text.push(')');
            }
            Expr::Not(ref inner) => {
                self.text.push_str("NOT (");
                self.expr(inner);
                self.text.push(')');
            }
            Expr::And(ref v) => self.junction(v, " AND ", "true"),
            Expr::Or(ref v) => self.junction(v, " OR ", "false"),
        }
    }

    fn scalar(&mut self, s: &Scalar) {
        match *s {
            Scalar::Column(col) => {
                let _ = write!(self.text, "{}", col);
            }
            Scalar::Literal(ref v) => self.param(v),
            Scalar::CountAll => self.text.push_str("count(*)"),
            Scalar::Count(ref inner) => self.call("count", inner),
            Scalar::Sum(ref inner) => self.call("sum", inner),
            Scalar::Round(ref inner) => self.call("round", inner),
            Scalar::Case(ref arms, ref otherwise) => {
                self.text.push_str("CASE");
                for &(ref cond, ref then) in arms {
                    self.text.push_str(" WHEN ");
                    self.expr(cond);
                    self.text.push_str(" THEN ");
                    self.scalar(then);
                }
                self.text.push_str(" ELSE ");
                self.scalar(otherwise);
                self.text.push_str(" END");
            }
            Scalar::LocalDate(col, ref tz) => {
                self.text.push_str("date(timezone(");
                self.param(&Value::Text(tz.clone()));
                let _ = write!(self.text, ", {}))", col);
            }
            Scalar::Label(label) => self.text.push_str(label),
        }
    }

    fn call(&mut self, function: &str, arg: &Scalar) {
        self.text.push_str(function);
        self.text.push('(');
        self.scalar(arg);
        self.text.push(')');
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn render_grouped_report() {
        let q = Query::new(Model::Message);
        let from = q.col("from_address");
        let size = q.col("size");
        let q = q
            .select_as(from, "address")
            .select_as(Scalar::count(from.into()), "count")
            .select_as(Scalar::sum(size.into()), "size")
            .filter(from.ne(""))
            .filter(Expr::or(vec![
                from.in_(vec!["a@x.com", "b@x.com"]),
                from.like("c%@x.com"),
            ]))
            .group_by(from)
            .order_by_desc(Scalar::Label("count"));

        let sql = render(&q);
        assert_eq!(
            "SELECT from_address AS address, count(from_address) AS count, \
             sum(size) AS size FROM messages \
             WHERE from_address != $1 \
             AND (from_address IN ($2, $3) OR from_address LIKE $4) \
             GROUP BY from_address ORDER BY count DESC",
            sql.text
        );
        assert_eq!(
            vec![
                Value::from(""),
                Value::from("a@x.com"),
                Value::from("b@x.com"),
                Value::from("c%@x.com"),
            ],
            sql.params
        );
    }

    #[test]
    fn render_nested_junctions() {
        let subject = Model::Message.col("subject");
        let size = Model::Message.col("size");
        let e = Expr::and(vec![
            Expr::and(vec![subject.ilike("%foo%"), size.gt(3)]),
            Expr::or(vec![subject.is_null(), !subject.regex("^x")]),
        ]);
        let sql = render_expr(&e);
        assert_eq!(
            "(subject ILIKE $1 AND size > $2) \
             AND (subject IS NULL OR NOT (subject ~ $3))",
            sql.text
        );
    }

    #[test]
    fn render_subquery_shares_parameters() {
        let domains = Query::new(Model::Domain);
        let name = domains.col("name");
        let status = domains.col("status");
        let domains = domains.select(name).filter(status.eq(true));

        let q = Query::new(Model::Message);
        let to_domain = q.col("to_domain");
        let size = q.col("size");
        let q = q
            .filter(size.gt(0))
            .filter(to_domain.in_query(domains));
        let sql = render(&q);
        assert_eq!(
            "SELECT * FROM messages WHERE size > $1 AND to_domain IN \
             (SELECT name FROM maildomains WHERE status = $2)",
            sql.text
        );
        assert_eq!(vec![Value::Int(0), Value::Bool(true)], sql.params);
    }

    #[test]
    fn render_empty_membership_and_junctions() {
        let to = Model::Message.col("to_address");
        let values: Vec<Value> = Vec::new();
        assert_eq!(
            "to_address != to_address",
            render_expr(&to.in_(values)).text
        );
        assert_eq!("true", render_expr(&Expr::and(vec![])).text);
        assert_eq!("false", render_expr(&Expr::or(vec![])).text);
    }

    #[test]
    fn render_case_and_local_date() {
        let q = Query::new(Model::Message);
        let ts = q.col("timestamp");
        let virus = q.col("virusinfected");
        let q = q
            .select_as(
                Scalar::LocalDate(ts, "Africa/Johannesburg".into()),
                "ldate",
            )
            .select_as(Scalar::sum(Scalar::flag(virus.gt(0))), "virus_total")
            .group_by(Scalar::Label("ldate"))
            .order_by_desc(Scalar::Label("ldate"));
        let sql = render(&q);
        assert_eq!(
            "SELECT date(timezone($1, timestamp)) AS ldate, \
             sum(CASE WHEN virusinfected > $2 THEN $3 ELSE $4 END) \
             AS virus_total FROM messages GROUP BY ldate ORDER BY ldate DESC",
            sql.text
        );
    }
}
