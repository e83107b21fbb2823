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

//! Combining ad-hoc filters into one predicate.
//!
//! Filters are keyed on field and operator. All filters sharing a key are
//! OR-ed together into a single flat group; the distinct keys are AND-ed.
//! So `subject contains a`, `subject contains b`, `size > 3` means
//! `(subject contains a OR subject contains b) AND size > 3`.

use std::collections::HashMap;

use super::expr::{Expr, Query};
use super::predicate::FilterSpec;

/// What the filters under one key have folded into.
#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    Single(Expr),
    /// Two or more predicates for the same key, to be OR-ed.
    Group(Vec<Expr>),
}

impl Clause {
    fn absorb(&mut self, expr: Expr) {
        let previous = std::mem::replace(self, Clause::Group(Vec::new()));
        *self = match previous {
            Clause::Single(old) => Clause::Group(vec![expr, old]),
            Clause::Group(mut v) => {
                v.push(expr);
                Clause::Group(v)
            }
        };
    }
}

/// First pass: fold the filters into an insertion-ordered multimap of
/// clauses. Filters which produce no predicate are dropped here.
pub fn clauses(filters: &[FilterSpec]) -> Vec<(String, Clause)> {
    let mut index = HashMap::<String, usize>::new();
    let mut out = Vec::<(String, Clause)>::new();

    for filter in filters {
        let (key, expr) = match (filter.key(), filter.predicate()) {
            (Some(key), Some(expr)) => (key, expr),
            _ => continue,
        };

        match index.get(&key) {
            Some(&ix) => out[ix].1.absorb(expr),
            None => {
                index.insert(key.clone(), out.len());
                out.push((key, Clause::Single(expr)));
            }
        }
    }

    out
}

/// Second pass: combine the clauses into one predicate.
///
/// Singles are AND-ed together first, and that conjunction is AND-ed with
/// one OR per group. Returns `None` if there is nothing to filter on.
pub fn combine(clauses: Vec<(String, Clause)>) -> Option<Expr> {
    let mut singles = Vec::new();
    let mut groups = Vec::new();
    for (_, clause) in clauses {
        match clause {
            Clause::Single(e) => singles.push(e),
            Clause::Group(v) => groups.push(Expr::Or(v)),
        }
    }

    match (singles.is_empty(), groups.is_empty()) {
        (true, true) => None,
        (false, true) => Some(Expr::And(singles)),
        (true, false) => Some(Expr::And(groups)),
        (false, false) => {
            let mut all = Vec::with_capacity(groups.len() + 1);
            all.push(Expr::And(singles));
            all.extend(groups);
            Some(Expr::And(all))
        }
    }
}

pub fn aggregate(filters: &[FilterSpec]) -> Option<Expr> {
    combine(clauses(filters))
}

/// Narrow `query` by `filters`, or return it untouched if they amount to
/// nothing.
pub fn apply(query: Query, filters: &[FilterSpec]) -> Query {
    match aggregate(filters) {
        Some(expr) => query.filter(expr),
        None => query,
    }
}
