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

//! Query execution.
//!
//! The real report store is a relational database owned by someone else;
//! this crate only needs to hand it a `Query`. `MemoryStore` is a complete
//! in-memory implementation used by the command line tool against fixture
//! files, and by the tests to check what composed queries actually return.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::prelude::*;
use serde::Deserialize;

use super::eval::{Evaluator, Row};
use super::expr::*;
use super::identity::{IdentityRecord, UserIdentity};
use super::resolve::{AliasRecord, Directory, DomainRecord};
use crate::support::error::Error;

/// Something which can execute queries.
pub trait Storage {
    fn fetch(&self, query: &Query) -> Result<Vec<Row>, Error>;
}

#[derive(Clone, Debug)]
struct StoredDomain {
    organization: u64,
    record: DomainRecord,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<Model, Vec<Row>>,
    /// Organisation id -> ids of its admins
    organizations: HashMap<u64, Vec<u64>>,
    domains: Vec<StoredDomain>,
    users: Vec<UserIdentity>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: Model, row: Row) {
        self.tables.entry(model).or_insert_with(Vec::new).push(row);
    }

    pub fn add_organization(&mut self, id: u64, admins: Vec<u64>) {
        self.organizations.insert(id, admins);
    }

    pub fn add_domain(
        &mut self,
        id: u64,
        organization: u64,
        record: DomainRecord,
    ) {
        let mut row = Row::new();
        row.insert("id".to_owned(), Value::Int(id as i64));
        row.insert("name".to_owned(), Value::Text(record.name.clone()));
        row.insert("status".to_owned(), Value::Bool(record.status));
        self.insert(Model::Domain, row);
        self.domains.push(StoredDomain {
            organization,
            record,
        });
    }

    pub fn add_user(&mut self, user: UserIdentity) {
        self.users.push(user);
    }

    pub fn user(&self, username: &str) -> Result<UserIdentity, Error> {
        self.users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| Error::UnknownUser(username.to_owned()))
    }

    /// Load a fixture file. Users without a time zone get
    /// `default_timezone`.
    pub fn load(path: &Path, default_timezone: &str) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        let fixture: Fixture = toml::from_str(&text)?;
        Ok(Self::from_fixture_in(fixture, default_timezone))
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        Self::from_fixture_in(fixture, "UTC")
    }

    fn from_fixture_in(fixture: Fixture, default_timezone: &str) -> Self {
        let mut store = Self::new();
        for user in fixture.users {
            store.add_user(user.into_identity(default_timezone));
        }
        for org in fixture.organizations {
            store.add_organization(org.id, org.admins);
        }
        for domain in fixture.domains {
            store.add_domain(
                domain.id,
                domain.organization,
                DomainRecord {
                    name: domain.name,
                    status: domain.status,
                    aliases: domain.aliases,
                },
            );
        }
        for message in fixture.messages {
            store.insert(Model::Message, message.into_row());
        }
        for message in fixture.archive {
            store.insert(Model::Archive, message.into_row());
        }
        for item in fixture.mail_queue {
            store.insert(Model::MailQueueItem, item.into_row());
        }
        for totals in fixture.message_totals {
            store.insert(Model::MessageTotals, totals.into_row());
        }
        for totals in fixture.src_totals {
            store.insert(Model::SrcMessageTotals, totals.into_row());
        }
        for totals in fixture.dst_totals {
            store.insert(Model::DstMessageTotals, totals.into_row());
        }
        store
    }
}

impl Storage for MemoryStore {
    fn fetch(&self, query: &Query) -> Result<Vec<Row>, Error> {
        let ev = Evaluator::new(self, &query.select);

        let mut matched = Vec::new();
        for row in self.tables.get(&query.source).into_iter().flatten() {
            if ev.matches(&query.filters, row)? {
                matched.push(row);
            }
        }

        let mut out = if !query.group_by.is_empty() {
            let mut groups: Vec<(Vec<Value>, Vec<&Row>)> = Vec::new();
            for row in matched {
                let key = query
                    .group_by
                    .iter()
                    .map(|g| ev.scalar(g, row))
                    .collect::<Result<Vec<_>, Error>>()?;
                match groups.iter_mut().find(|g| g.0 == key) {
                    Some(group) => group.1.push(row),
                    None => groups.push((key, vec![row])),
                }
            }

            groups
                .iter()
                .map(|&(_, ref rows)| project_group(&ev, &query.select, rows))
                .collect::<Result<Vec<_>, Error>>()?
        } else if query.select.iter().any(|s| s.scalar.is_aggregate()) {
            vec![project_group(&ev, &query.select, &matched)?]
        } else if query.select.is_empty() {
            matched.into_iter().cloned().collect()
        } else {
            matched
                .into_iter()
                .map(|row| project_group(&ev, &query.select, &[row]))
                .collect::<Result<Vec<_>, Error>>()?
        };

        if query.distinct {
            let mut seen: Vec<Row> = Vec::with_capacity(out.len());
            for row in out {
                if !seen.contains(&row) {
                    seen.push(row);
                }
            }
            out = seen;
        }

        if !query.order_by.is_empty() {
            out.sort_by(|a, b| {
                for o in &query.order_by {
                    let ord = compare_nulls_first(
                        output_value(a, &o.scalar),
                        output_value(b, &o.scalar),
                    );
                    let ord = if o.descending { ord.reverse() } else { ord };
                    if Ordering::Equal != ord {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        Ok(out)
    }
}

impl Directory for MemoryStore {
    fn administered_domains(&self, user_id: u64) -> Vec<DomainRecord> {
        self.domains
            .iter()
            .filter(|d| {
                self.organizations
                    .get(&d.organization)
                    .map_or(false, |admins| admins.contains(&user_id))
            })
            .map(|d| d.record.clone())
            .collect()
    }
}

fn project_group(
    ev: &Evaluator,
    select: &[Selection],
    rows: &[&Row],
) -> Result<Row, Error> {
    let mut out = Row::new();
    for sel in select {
        out.insert(sel.output_name(), ev.aggregate(&sel.scalar, rows)?);
    }
    Ok(out)
}

fn output_value<'a>(row: &'a Row, scalar: &Scalar) -> Option<&'a Value> {
    match *scalar {
        Scalar::Label(label) => row.get(label),
        Scalar::Column(col) => row.get(col.name),
        _ => None,
    }
}

fn compare_nulls_first(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

/// The contents of a fixture file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub users: Vec<IdentityRecord>,
    pub organizations: Vec<OrganizationRecord>,
    pub domains: Vec<DomainFixture>,
    pub messages: Vec<MessageRecord>,
    pub archive: Vec<MessageRecord>,
    pub mail_queue: Vec<QueueRecord>,
    pub message_totals: Vec<TotalsRecord>,
    pub src_totals: Vec<DirectionalTotalsRecord>,
    pub dst_totals: Vec<DirectionalTotalsRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OrganizationRecord {
    pub id: u64,
    #[serde(default)]
    pub admins: Vec<u64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DomainFixture {
    pub id: u64,
    pub name: String,
    pub organization: u64,
    #[serde(default = "yes")]
    pub status: bool,
    #[serde(default)]
    pub aliases: Vec<AliasRecord>,
}

fn yes() -> bool {
    true
}

fn one() -> i64 {
    1
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageRecord {
    pub id: String,
    pub messageid: String,
    pub clientip: String,
    pub from_address: String,
    pub from_domain: String,
    pub to_address: String,
    pub to_domain: String,
    pub subject: Option<String>,
    pub hostname: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub size: i64,
    pub sascore: f64,
    pub spam: i64,
    pub highspam: i64,
    pub virusinfected: i64,
    pub nameinfected: i64,
    pub otherinfected: i64,
    pub isquarantined: i64,
    #[serde(default = "one")]
    pub scaned: i64,
    pub whitelisted: i64,
    pub blacklisted: i64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueueRecord {
    pub id: i64,
    pub messageid: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub from_address: String,
    pub from_domain: String,
    pub to_address: String,
    pub to_domain: String,
    pub subject: Option<String>,
    pub hostname: String,
    pub size: i64,
    pub attempts: i64,
    #[serde(default = "one")]
    pub direction: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TotalsRecord {
    pub id: String,
    pub runtotal: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DirectionalTotalsRecord {
    pub id: String,
    pub total: i64,
    pub volume: i64,
}

/// Fill in an empty domain column from the address.
fn domain_of(domain: String, address: &str) -> String {
    if !domain.is_empty() {
        return domain;
    }

    address
        .rsplit_once('@')
        .map(|(_, d)| d.to_lowercase())
        .unwrap_or_default()
}

struct RowBuilder(Row);

impl RowBuilder {
    fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_owned(), value.into());
        self
    }

    fn set_opt<V: Into<Value>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(name, v),
            None => self.set(name, Value::Null),
        }
    }
}

impl MessageRecord {
    pub fn into_row(self) -> Row {
        let from_domain = domain_of(self.from_domain, &self.from_address);
        let to_domain = domain_of(self.to_domain, &self.to_address);
        RowBuilder(Row::new())
            .set("id", self.id)
            .set("messageid", self.messageid)
            .set("clientip", self.clientip)
            .set("from_address", self.from_address)
            .set("from_domain", from_domain)
            .set("to_address", self.to_address)
            .set("to_domain", to_domain)
            .set_opt("subject", self.subject)
            .set("hostname", self.hostname)
            .set_opt("timestamp", self.timestamp)
            .set("size", self.size)
            .set("sascore", Value::Float(self.sascore))
            .set("spam", self.spam)
            .set("highspam", self.highspam)
            .set("virusinfected", self.virusinfected)
            .set("nameinfected", self.nameinfected)
            .set("otherinfected", self.otherinfected)
            .set("isquarantined", self.isquarantined)
            .set("scaned", self.scaned)
            .set("whitelisted", self.whitelisted)
            .set("blacklisted", self.blacklisted)
            .0
    }
}

impl QueueRecord {
    pub fn into_row(self) -> Row {
        let from_domain = domain_of(self.from_domain, &self.from_address);
        let to_domain = domain_of(self.to_domain, &self.to_address);
        RowBuilder(Row::new())
            .set("id", self.id)
            .set("messageid", self.messageid)
            .set_opt("timestamp", self.timestamp)
            .set("from_address", self.from_address)
            .set("from_domain", from_domain)
            .set("to_address", self.to_address)
            .set("to_domain", to_domain)
            .set_opt("subject", self.subject)
            .set("hostname", self.hostname)
            .set("size", self.size)
            .set("attempts", self.attempts)
            .set("direction", self.direction)
            .0
    }
}

impl TotalsRecord {
    pub fn into_row(self) -> Row {
        RowBuilder(Row::new())
            .set("id", self.id)
            .set("runtotal", self.runtotal)
            .0
    }
}

impl DirectionalTotalsRecord {
    pub fn into_row(self) -> Row {
        RowBuilder(Row::new())
            .set("id", self.id)
            .set("total", self.total)
            .set("volume", self.volume)
            .0
    }
}
