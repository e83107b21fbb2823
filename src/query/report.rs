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

//! Top-N report queries.

use std::fmt;

use super::aggregate;
use super::expr::*;
use super::identity::UserIdentity;
use super::predicate::FilterSpec;
use super::resolve::Directory;
use super::schema::FieldRegistry;
use super::scope::{Direction, OwnershipFilter};
use super::summary;
use crate::support::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportKind {
    TopSendersByQuantity,
    TopSendersByVolume,
    TopSenderDomainsByQuantity,
    TopSenderDomainsByVolume,
    TopRecipientsByQuantity,
    TopRecipientsByVolume,
    TopRecipientDomainsByQuantity,
    TopRecipientDomainsByVolume,
    SpamScoreDistribution,
    TopMailRelays,
}

use self::ReportKind::*;

static ALL: &[ReportKind] = &[
    TopSendersByQuantity,
    TopSendersByVolume,
    TopSenderDomainsByQuantity,
    TopSenderDomainsByVolume,
    TopRecipientsByQuantity,
    TopRecipientsByVolume,
    TopRecipientDomainsByQuantity,
    TopRecipientDomainsByVolume,
    SpamScoreDistribution,
    TopMailRelays,
];

impl ReportKind {
    pub fn all() -> impl Iterator<Item = ReportKind> {
        ALL.iter().copied()
    }

    pub fn from_id(id: &str) -> Result<Self, Error> {
        id.trim()
            .parse::<u32>()
            .ok()
            .and_then(|n| Self::all().find(|kind| kind.id() == n))
            .ok_or_else(|| Error::UnknownReport(id.to_owned()))
    }

    /// The number the report is requested by.
    pub fn id(self) -> u32 {
        match self {
            TopSendersByQuantity => 1,
            TopSendersByVolume => 2,
            TopSenderDomainsByQuantity => 3,
            TopSenderDomainsByVolume => 4,
            TopRecipientsByQuantity => 5,
            TopRecipientsByVolume => 6,
            TopRecipientDomainsByQuantity => 7,
            TopRecipientDomainsByVolume => 8,
            SpamScoreDistribution => 9,
            TopMailRelays => 10,
        }
    }

    /// The `Message` column the report groups on.
    pub fn field(self) -> &'static str {
        match self {
            TopSendersByQuantity | TopSendersByVolume => "from_address",
            TopSenderDomainsByQuantity | TopSenderDomainsByVolume => {
                "from_domain"
            }
            TopRecipientsByQuantity | TopRecipientsByVolume => "to_address",
            TopRecipientDomainsByQuantity | TopRecipientDomainsByVolume => {
                "to_domain"
            }
            SpamScoreDistribution => "sascore",
            TopMailRelays => "clientip",
        }
    }

    /// The label results are ordered on, descending.
    pub fn sort(self) -> &'static str {
        match self {
            TopSendersByVolume
            | TopSenderDomainsByVolume
            | TopRecipientsByVolume
            | TopRecipientDomainsByVolume => "size",
            SpamScoreDistribution => "score",
            _ => "count",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            TopSendersByQuantity => "Top senders by quantity",
            TopSendersByVolume => "Top senders by volume",
            TopSenderDomainsByQuantity => "Top sender domains by quantity",
            TopSenderDomainsByVolume => "Top sender domains by volume",
            TopRecipientsByQuantity => "Top recipients by quantity",
            TopRecipientsByVolume => "Top recipients by volume",
            TopRecipientDomainsByQuantity => {
                "Top recipient domains by quantity"
            }
            TopRecipientDomainsByVolume => "Top recipient domains by volume",
            SpamScoreDistribution => "Spam score distribution",
            TopMailRelays => "Top mail relays",
        }
    }

    /// Whether the report is about the recipient side of messages.
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            TopRecipientsByQuantity
                | TopRecipientsByVolume
                | TopRecipientDomainsByQuantity
                | TopRecipientDomainsByVolume
        )
    }

    /// The maintained per-domain totals table which can stand in for
    /// grouping messages, if any.
    fn totals_model(self) -> Option<Model> {
        match self {
            TopSenderDomainsByQuantity | TopSenderDomainsByVolume => {
                Some(Model::SrcMessageTotals)
            }
            TopRecipientDomainsByQuantity | TopRecipientDomainsByVolume => {
                Some(Model::DstMessageTotals)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Compose the query for one report.
///
/// `filters` must have been resolved against the `Message` fields.
pub fn build_report(
    directory: &dyn Directory,
    identity: &UserIdentity,
    kind: ReportKind,
    filters: &[FilterSpec],
) -> Query {
    if SpamScoreDistribution == kind {
        return aggregate::apply(
            summary::sa_scores(directory, identity),
            filters,
        );
    }

    // An identity flagged superadmin and peleb is still restricted to its
    // own addresses, so it cannot use the unscoped totals tables.
    let unrestricted = identity.is_superadmin() && !identity.is_peleb();
    let totals = kind
        .totals_model()
        .filter(|_| unrestricted && filters.is_empty());

    let query = match totals {
        Some(model) => pre_aggregated(model, kind),
        None => per_message(directory, identity, kind),
    };

    let query = if kind.is_inbound() && unrestricted {
        let domain_col = match totals {
            Some(model) => model.col("id"),
            None => Model::Message.col("to_domain"),
        };
        query.filter(domain_col.in_query(active_domain_names()))
    } else {
        query
    };

    aggregate::apply(query, filters)
}

fn pre_aggregated(model: Model, kind: ReportKind) -> Query {
    let q = Query::new(model);
    let id = q.col("id");
    let total = q.col("total");
    let volume = q.col("volume");
    q.select_as(id, "address")
        .select_as(total, "count")
        .select_as(volume, "size")
        .order_by_desc(Scalar::Label(kind.sort()))
}

fn per_message(
    directory: &dyn Directory,
    identity: &UserIdentity,
    kind: ReportKind,
) -> Query {
    let q = Query::new(Model::Message);
    let field = q.col(kind.field());
    let size = q.col("size");
    let excluded = if TopMailRelays == kind { "127.0.0.1" } else { "" };

    let q = q
        .select_as(field, "address")
        .select_as(Scalar::count(field.into()), "count")
        .select_as(Scalar::sum(size.into()), "size")
        .filter(field.ne(excluded))
        .group_by(field)
        .order_by_desc(Scalar::Label(kind.sort()));

    if kind.is_inbound() && identity.is_superadmin() && !identity.is_peleb() {
        // Restricted to active domains by the caller instead
        return q;
    }

    let mut scoper = OwnershipFilter::new(directory, identity, Model::Message);
    if kind.is_inbound() {
        scoper.set_direction(Direction::Inbound);
    }
    scoper.apply(q)
}

/// The `Message` fields report filters may name.
static FILTER_FIELDS: &[&str] = &[
    "id",
    "messageid",
    "size",
    "from_address",
    "from_domain",
    "to_address",
    "to_domain",
    "subject",
    "clientip",
    "hostname",
    "timestamp",
    "date",
    "time",
    "headers",
    "sascore",
    "spam",
    "highspam",
    "whitelisted",
    "blacklisted",
    "virusinfected",
    "nameinfected",
    "otherinfected",
    "isquarantined",
];

/// The registry report filters are resolved against.
pub fn filter_fields() -> Result<FieldRegistry, Error> {
    FieldRegistry::new(Model::Message, FILTER_FIELDS)
}

/// `SELECT name FROM maildomains WHERE status = true`
pub fn active_domain_names() -> Query {
    let q = Query::new(Model::Domain);
    let name = q.col("name");
    let status = q.col("status");
    q.select(name).filter(status.eq(true))
}
