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

//! The row schemas queries can be built against.
//!
//! Every table the report store exposes is a `Model`, and every column of a
//! model is registered here with its kind. Ad-hoc filters never name columns
//! directly; they go through a `FieldRegistry`, which only hands out columns
//! that were registered for its model.

use std::collections::HashMap;
use std::fmt;

use crate::support::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Model {
    Message,
    Archive,
    MailQueueItem,
    MessageTotals,
    SrcMessageTotals,
    DstMessageTotals,
    Domain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Text,
    Integer,
    Float,
    Bool,
    Timestamp,
}

/// A reference to a registered column.
///
/// Columns do not carry their model; the query they appear in determines
/// which table they are read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Column {
    pub name: &'static str,
    pub kind: Kind,
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

use self::Kind::*;

static MESSAGE_COLUMNS: &[(&str, Kind)] = &[
    ("id", Text),
    ("messageid", Text),
    ("actions", Text),
    ("clientip", Text),
    ("from_address", Text),
    ("from_domain", Text),
    ("to_address", Text),
    ("to_domain", Text),
    ("subject", Text),
    ("date", Text),
    ("time", Text),
    ("timestamp", Timestamp),
    ("hostname", Text),
    ("headers", Text),
    ("size", Integer),
    ("sascore", Float),
    ("spam", Integer),
    ("highspam", Integer),
    ("virusinfected", Integer),
    ("nameinfected", Integer),
    ("otherinfected", Integer),
    ("isquarantined", Integer),
    ("scaned", Integer),
    ("whitelisted", Integer),
    ("blacklisted", Integer),
    ("spamreport", Text),
    ("mcpscore", Float),
    ("isarchived", Integer),
];

static MAIL_QUEUE_COLUMNS: &[(&str, Kind)] = &[
    ("id", Integer),
    ("messageid", Text),
    ("timestamp", Timestamp),
    ("from_address", Text),
    ("from_domain", Text),
    ("to_address", Text),
    ("to_domain", Text),
    ("subject", Text),
    ("hostname", Text),
    ("size", Integer),
    ("attempts", Integer),
    ("direction", Integer),
];

static MESSAGE_TOTALS_COLUMNS: &[(&str, Kind)] =
    &[("id", Text), ("runtotal", Integer)];

static DIRECTIONAL_TOTALS_COLUMNS: &[(&str, Kind)] =
    &[("id", Text), ("total", Integer), ("volume", Integer)];

static DOMAIN_COLUMNS: &[(&str, Kind)] =
    &[("id", Integer), ("name", Text), ("status", Bool)];

impl Model {
    pub fn table(self) -> &'static str {
        match self {
            Model::Message => "messages",
            Model::Archive => "archive",
            Model::MailQueueItem => "mailq",
            Model::MessageTotals => "messagetotals",
            Model::SrcMessageTotals => "srcmsgtotals",
            Model::DstMessageTotals => "dstmsgtotals",
            Model::Domain => "maildomains",
        }
    }

    fn columns(self) -> &'static [(&'static str, Kind)] {
        match self {
            Model::Message | Model::Archive => MESSAGE_COLUMNS,
            Model::MailQueueItem => MAIL_QUEUE_COLUMNS,
            Model::MessageTotals => MESSAGE_TOTALS_COLUMNS,
            Model::SrcMessageTotals | Model::DstMessageTotals => {
                DIRECTIONAL_TOTALS_COLUMNS
            }
            Model::Domain => DOMAIN_COLUMNS,
        }
    }

    /// Look up a registered column by name.
    pub fn column(self, name: &str) -> Option<Column> {
        self.columns()
            .iter()
            .find(|&&(n, _)| n == name)
            .map(|&(name, kind)| Column { name, kind })
    }

    /// Look up a column which the caller statically knows to exist.
    ///
    /// Used for the fixed columns the query assemblers reference; a miss is a
    /// bug in this crate, not bad input.
    pub fn col(self, name: &str) -> Column {
        self.column(name).unwrap_or_else(|| {
            panic!("BUG: {} has no column {}", self.table(), name)
        })
    }

    /// Whether this model carries the address and domain columns that
    /// ownership scoping filters on.
    pub fn is_addressed(self) -> bool {
        matches!(
            self,
            Model::Message | Model::Archive | Model::MailQueueItem
        )
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Maps user-facing field names onto the columns of one model.
///
/// Every name is checked against the model's schema when the registry is
/// built, so a typo in the set of filterable fields fails immediately rather
/// than when a filter first names it.
#[derive(Clone, Debug)]
pub struct FieldRegistry {
    model: Model,
    fields: HashMap<&'static str, Column>,
}

impl FieldRegistry {
    pub fn new(model: Model, names: &[&'static str]) -> Result<Self, Error> {
        let mut fields = HashMap::with_capacity(names.len());
        for &name in names {
            let column = model.column(name).ok_or_else(|| {
                Error::UnknownField(model.table(), name.to_owned())
            })?;
            fields.insert(name, column);
        }

        Ok(FieldRegistry { model, fields })
    }

    /// A registry exposing every column of `model`.
    pub fn all(model: Model) -> Self {
        FieldRegistry {
            model,
            fields: model
                .columns()
                .iter()
                .map(|&(name, kind)| (name, Column { name, kind }))
                .collect(),
        }
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn resolve(&self, name: &str) -> Result<Column, Error> {
        self.fields.get(name).copied().ok_or_else(|| {
            Error::UnknownField(self.model.table(), name.to_owned())
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn message_and_archive_share_schema() {
        assert_eq!(
            Model::Message.column("to_address"),
            Model::Archive.column("to_address")
        );
        assert_eq!(Kind::Integer, Model::Message.col("size").kind);
        assert!(Model::MessageTotals.column("to_address").is_none());
    }

    #[test]
    fn registration_rejects_typos() {
        assert_matches!(
            Err(Error::UnknownField("messages", _)),
            FieldRegistry::new(Model::Message, &["subject", "subjcet"])
        );

        let registry =
            FieldRegistry::new(Model::Message, &["subject", "size"]).unwrap();
        assert_eq!("subject", registry.resolve("subject").unwrap().name);
        assert_matches!(
            Err(Error::UnknownField(..)),
            registry.resolve("from_address")
        );
    }

    #[test]
    fn all_registers_every_column() {
        let registry = FieldRegistry::all(Model::MailQueueItem);
        assert_eq!(Model::MailQueueItem, registry.model());
        assert_eq!(Kind::Integer, registry.resolve("attempts").unwrap().kind);
    }
}
