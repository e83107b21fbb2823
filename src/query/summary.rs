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

//! Dashboard counters and histograms.
//!
//! Each of these composes one query, scoped the same way as the reports
//! but without a direction.

use chrono::prelude::*;

use super::cache::ResultCache;
use super::eval::Row;
use super::expr::*;
use super::identity::UserIdentity;
use super::resolve::{administered_domains, Directory};
use super::scope::OwnershipFilter;
use crate::support::day_window::today_bounds;
use crate::support::error::Error;
use crate::support::system_config::SHORT_REGION;

fn scoped(
    directory: &dyn Directory,
    identity: &UserIdentity,
    query: Query,
) -> Query {
    OwnershipFilter::new(directory, identity, query.source).apply(query)
}

/// The total number of messages visible to `identity`, as a single row with
/// a `total` column.
///
/// Administrators read the maintained per-domain running totals; ordinary
/// users have to count their messages.
pub fn message_count(
    directory: &dyn Directory,
    identity: &UserIdentity,
) -> Query {
    if identity.is_peleb() {
        let q = Query::new(Model::Message);
        let id = q.col("id");
        return scoped(
            directory,
            identity,
            q.select_as(Scalar::count(id.into()), "total"),
        );
    }

    let q = Query::new(Model::MessageTotals);
    let id = q.col("id");
    let runtotal = q.col("runtotal");
    let q = q.select_as(Scalar::sum(runtotal.into()), "total");
    if identity.is_domain_admin() {
        q.filter(id.in_(administered_domains(directory, identity)))
    } else {
        q
    }
}

/// Extract the `total` of a single-row count result. A missing row or a
/// null sum counts as zero.
pub fn total_from_row(rows: &[Row]) -> i64 {
    rows.first()
        .and_then(|row| row.get("total"))
        .and_then(Value::as_f64)
        .map_or(0, |f| f as i64)
}

/// Today's counters by verdict, for the day `now` falls on in the identity's
/// time zone.
pub fn daily_totals(
    directory: &dyn Directory,
    identity: &UserIdentity,
    hostname: Option<&str>,
    now: DateTime<Utc>,
    cache: &dyn ResultCache,
) -> Result<Query, Error> {
    let (start, end) = today_bounds(&identity.timezone, now)?;

    let q = Query::new(Model::Message);
    let id = q.col("id");
    let virus = q.col("virusinfected");
    let name = q.col("nameinfected");
    let other = q.col("otherinfected");
    let spam = q.col("spam");
    let highspam = q.col("highspam");
    let timestamp = q.col("timestamp");
    let host = q.col("hostname");

    let uninfected = || vec![virus.eq(0), other.eq(0), name.eq(0)];
    let with = |mut base: Vec<Expr>, more: Vec<Expr>| {
        base.extend(more);
        Scalar::sum(Scalar::flag(Expr::And(base)))
    };

    let mut q = q
        .select_as(Scalar::count(id.into()), "total")
        .select_as(
            with(uninfected(), vec![spam.eq(0), highspam.eq(0)]),
            "clean",
        )
        .select_as(Scalar::sum(Scalar::flag(virus.gt(0))), "virii")
        .select_as(
            with(
                vec![highspam.eq(0), spam.eq(0), virus.eq(0)],
                vec![Expr::Or(vec![name.gt(0), other.gt(0)])],
            ),
            "infected",
        )
        .select_as(
            with(
                uninfected(),
                vec![Expr::Or(vec![spam.gt(0), highspam.gt(0)])],
            ),
            "spam",
        )
        .select_as(
            with(uninfected(), vec![spam.gt(0), highspam.eq(0)]),
            "lowspam",
        )
        .select_as(with(uninfected(), vec![highspam.gt(0)]), "highspam")
        .filter(timestamp.between(start, end));

    if let Some(hostname) = hostname {
        q = q.filter(host.eq(hostname));
    }

    let key = format!(
        "dailytotals-{}-{}",
        identity.username,
        hostname.unwrap_or("all")
    );
    Ok(scoped(directory, identity, q).cached(cache, SHORT_REGION, &key))
}

/// Per-day message, virus, spam and volume totals, newest day first.
///
/// Days are calendar days in the identity's time zone.
pub fn message_totals(
    directory: &dyn Directory,
    identity: &UserIdentity,
) -> Query {
    let q = Query::new(Model::Message);
    let timestamp = q.col("timestamp");
    let virus = q.col("virusinfected");
    let spam = q.col("spam");
    let size = q.col("size");

    let q = q
        .select_as(
            Scalar::LocalDate(timestamp, identity.timezone.clone()),
            "ldate",
        )
        .select_as(Scalar::CountAll, "mail_total")
        .select_as(Scalar::sum(Scalar::flag(virus.gt(0))), "virus_total")
        .select_as(
            Scalar::sum(Scalar::flag(Expr::And(vec![virus.eq(0), spam.gt(0)]))),
            "spam_total",
        )
        .select_as(Scalar::sum(size.into()), "total_size")
        .group_by(Scalar::Label("ldate"))
        .order_by_desc(Scalar::Label("ldate"));

    scoped(directory, identity, q)
}

/// Histogram of rounded spam scores over scanned, non-whitelisted messages.
pub fn sa_scores(directory: &dyn Directory, identity: &UserIdentity) -> Query {
    let q = Query::new(Model::Message);
    let sascore = q.col("sascore");
    let scaned = q.col("scaned");
    let whitelisted = q.col("whitelisted");

    let q = q
        .select_as(Scalar::round(sascore.into()), "score")
        .select_as(Scalar::CountAll, "count")
        .filter(scaned.eq(1))
        .filter(whitelisted.ne(1))
        .group_by(Scalar::Label("score"))
        .order_by(Scalar::Label("score"));

    scoped(directory, identity, q)
}

/// Number of queued messages in one queue. `direction` is 1 for the
/// inbound queue and 2 for the outbound queue.
pub fn mail_queue(
    directory: &dyn Directory,
    identity: &UserIdentity,
    direction: i64,
    hostname: Option<&str>,
    cache: &dyn ResultCache,
) -> Query {
    let q = Query::new(Model::MailQueueItem);
    let id = q.col("id");
    let host = q.col("hostname");
    let dir = q.col("direction");

    let mut q = q.select_as(Scalar::count(id.into()), "total");
    if let Some(hostname) = hostname {
        q = q.filter(host.eq(hostname));
    }
    let q = q.filter(dir.eq(direction));

    let key = format!(
        "mq-{}-{}-{}",
        identity.username,
        hostname.unwrap_or("all"),
        direction
    );
    scoped(directory, identity, q).cached(cache, SHORT_REGION, &key)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::cache::{NoCache, RegionCache};
    use crate::query::identity::Roles;
    use crate::query::sql::render;
    use crate::query::store::{MemoryStore, Storage};
    use crate::support::system_config::CacheConfig;

    const FIXTURE: &str = r#"
[[organizations]]
id = 1
admins = [10]

[[domains]]
id = 1
name = "a.com"
organization = 1
aliases = [{ name = "a.net" }]

[[message_totals]]
id = "a.com"
runtotal = 40

[[message_totals]]
id = "a.net"
runtotal = 2

[[message_totals]]
id = "b.com"
runtotal = 100

[[messages]]
id = "clean"
from_address = "x@b.com"
to_address = "u@a.com"
hostname = "mx1"
timestamp = "2020-06-01T08:00:00Z"
size = 10

[[messages]]
id = "virus"
from_address = "x@b.com"
to_address = "u@a.com"
hostname = "mx1"
timestamp = "2020-06-01T09:00:00Z"
virusinfected = 1
size = 20

[[messages]]
id = "lowspam"
from_address = "x@b.com"
to_address = "u@a.com"
hostname = "mx2"
timestamp = "2020-06-01T10:00:00Z"
spam = 1
sascore = 6.2
size = 30

[[messages]]
id = "highspam"
from_address = "x@b.com"
to_address = "v@a.com"
hostname = "mx2"
timestamp = "2020-06-01T11:00:00Z"
spam = 1
highspam = 1
sascore = 15.7
size = 40

[[messages]]
id = "badname"
from_address = "u@a.com"
to_address = "x@b.com"
hostname = "mx1"
timestamp = "2020-06-01T11:30:00Z"
nameinfected = 1
size = 50

[[messages]]
id = "yesterday"
from_address = "x@b.com"
to_address = "u@a.com"
hostname = "mx1"
timestamp = "2020-05-31T23:00:00Z"
whitelisted = 1
size = 60

[[mail_queue]]
id = 1
from_address = "x@b.com"
to_address = "u@a.com"
hostname = "mx1"

[[mail_queue]]
id = 2
from_address = "x@b.com"
to_address = "v@a.com"
hostname = "mx2"

[[mail_queue]]
id = 3
from_address = "u@a.com"
to_address = "x@b.com"
hostname = "mx1"
direction = 2
"#;

    fn store() -> MemoryStore {
        crate::init_test_log();
        MemoryStore::from_fixture(toml::from_str(FIXTURE).unwrap())
    }

    fn identity(id: u64, roles: Roles) -> UserIdentity {
        UserIdentity {
            id,
            username: format!("user{}", id),
            email: "u@a.com".to_owned(),
            timezone: "UTC".to_owned(),
            roles,
            addresses: vec![],
        }
    }

    fn now() -> DateTime<Utc> {
        "2020-06-01T12:00:00Z".parse().unwrap()
    }

    fn get(row: &Row, name: &str) -> i64 {
        row.get(name).and_then(Value::as_f64).unwrap_or(-1.0) as i64
    }

    #[test]
    fn message_counts_by_role() {
        let store = store();

        let q = message_count(&store, &identity(1, Roles::SUPERADMIN));
        assert_eq!(Model::MessageTotals, q.source);
        assert_eq!(142, total_from_row(&store.fetch(&q).unwrap()));

        let q = message_count(&store, &identity(10, Roles::DOMAIN_ADMIN));
        assert_eq!(42, total_from_row(&store.fetch(&q).unwrap()));

        // No domains: the sentinel matches nothing and the sum is null
        let q = message_count(&store, &identity(11, Roles::DOMAIN_ADMIN));
        let rows = store.fetch(&q).unwrap();
        assert_eq!(Some(&Value::Null), rows[0].get("total"));
        assert_eq!(0, total_from_row(&rows));

        let q = message_count(&store, &identity(5, Roles::PELEB));
        assert_eq!(Model::Message, q.source);
        assert_eq!(5, total_from_row(&store.fetch(&q).unwrap()));

        assert_eq!(0, total_from_row(&[]));
    }

    #[test]
    fn daily_totals_by_verdict() {
        let store = store();
        let admin = identity(1, Roles::SUPERADMIN);
        let q = daily_totals(&store, &admin, None, now(), &NoCache).unwrap();
        assert_eq!(None, q.cache);

        let rows = store.fetch(&q).unwrap();
        assert_eq!(1, rows.len());
        let row = &rows[0];
        assert_eq!(5, get(row, "total"));
        assert_eq!(1, get(row, "clean"));
        assert_eq!(1, get(row, "virii"));
        assert_eq!(1, get(row, "infected"));
        assert_eq!(2, get(row, "spam"));
        assert_eq!(1, get(row, "lowspam"));
        assert_eq!(1, get(row, "highspam"));
    }

    #[test]
    fn daily_totals_by_host_and_zone() {
        let store = store();
        let cache = RegionCache::new(CacheConfig::default());
        let admin = identity(1, Roles::SUPERADMIN);

        let q =
            daily_totals(&store, &admin, Some("mx1"), now(), &cache).unwrap();
        assert_eq!("dailytotals-user1-mx1", q.cache.as_ref().unwrap().key);
        let rows = store.fetch(&q).unwrap();
        assert_eq!(3, get(&rows[0], "total"));

        // 23:00 UTC on the 31st is already the 1st in Johannesburg
        let mut local = admin.clone();
        local.timezone = "Africa/Johannesburg".to_owned();
        let q = daily_totals(&store, &local, None, now(), &cache).unwrap();
        assert_eq!("dailytotals-user1-all", q.cache.as_ref().unwrap().key);
        assert_eq!(6, get(&store.fetch(&q).unwrap()[0], "total"));

        local.timezone = "Nowhere/Special".to_owned();
        assert_matches!(
            Err(Error::UnknownTimezone(..)),
            daily_totals(&store, &local, None, now(), &cache)
        );
    }

    #[test]
    fn daily_totals_are_scoped() {
        let store = store();
        let mut user = identity(5, Roles::PELEB);
        user.email = "v@a.com".to_owned();
        let q = daily_totals(&store, &user, None, now(), &NoCache).unwrap();
        let row = &store.fetch(&q).unwrap()[0];
        assert_eq!(1, get(row, "total"));
        assert_eq!(1, get(row, "highspam"));
    }

    #[test]
    fn per_day_totals() {
        let store = store();
        let mut admin = identity(1, Roles::SUPERADMIN);
        let rows = store.fetch(&message_totals(&store, &admin)).unwrap();
        assert_eq!(2, rows.len());
        assert_eq!(Some(&Value::from("2020-06-01")), rows[0].get("ldate"));
        assert_eq!(5, get(&rows[0], "mail_total"));
        assert_eq!(1, get(&rows[0], "virus_total"));
        assert_eq!(2, get(&rows[0], "spam_total"));
        assert_eq!(150, get(&rows[0], "total_size"));
        assert_eq!(Some(&Value::from("2020-05-31")), rows[1].get("ldate"));

        admin.timezone = "Africa/Johannesburg".to_owned();
        let q = message_totals(&store, &admin);
        assert!(render(&q)
            .params
            .contains(&Value::from("Africa/Johannesburg")));
        let rows = store.fetch(&q).unwrap();
        assert_eq!(1, rows.len());
        assert_eq!(6, get(&rows[0], "mail_total"));
    }

    #[test]
    fn score_histogram_skips_whitelisted() {
        let store = store();
        let rows = store
            .fetch(&sa_scores(&store, &identity(1, Roles::SUPERADMIN)))
            .unwrap();
        let scores = rows
            .iter()
            .map(|r| (r["score"].to_string(), get(r, "count")))
            .collect::<Vec<_>>();
        assert_eq!(
            vec![
                ("0".to_owned(), 3),
                ("6".to_owned(), 1),
                ("16".to_owned(), 1)
            ],
            scores
        );
    }

    #[test]
    fn mail_queue_counts() {
        let store = store();
        let cache = RegionCache::new(CacheConfig::default());
        let admin = identity(1, Roles::SUPERADMIN);

        let q = mail_queue(&store, &admin, 1, None, &cache);
        assert_eq!("mq-user1-all-1", q.cache.as_ref().unwrap().key);
        assert_eq!(2, total_from_row(&store.fetch(&q).unwrap()));

        let q = mail_queue(&store, &admin, 1, Some("mx1"), &cache);
        assert_eq!("mq-user1-mx1-1", q.cache.as_ref().unwrap().key);
        assert_eq!(1, total_from_row(&store.fetch(&q).unwrap()));

        let q = mail_queue(&store, &admin, 2, None, &cache);
        assert_eq!(1, total_from_row(&store.fetch(&q).unwrap()));

        let mut user = identity(5, Roles::PELEB);
        user.email = "v@a.com".to_owned();
        let q = mail_queue(&store, &user, 1, None, &NoCache);
        assert_eq!(None, q.cache);
        assert_eq!(1, total_from_row(&store.fetch(&q).unwrap()));

        let nobody = identity(11, Roles::DOMAIN_ADMIN);
        let q = mail_queue(&store, &nobody, 1, None, &cache);
        assert_eq!(0, total_from_row(&store.fetch(&q).unwrap()));
    }
}
