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

//! Running the composition subcommands against a fixture.

use chrono::prelude::*;
use log::{info, warn};

use super::main::{Command, CommonOptions, EscapeSubcommand};
use crate::query::cache::RegionCache;
use crate::query::eval::Row;
use crate::query::expr::{Query, Value};
use crate::query::predicate::{parse_filter, FilterSpec};
use crate::query::report::{build_report, filter_fields, ReportKind};
use crate::query::sphinx::{
    clean_index_query, filter_index, restore_index_query, IndexCall,
    IndexParams,
};
use crate::query::sql::render;
use crate::query::store::{MemoryStore, Storage};
use crate::query::summary;
use crate::support::error::Error;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

pub(super) fn run(
    cmd: Command,
    common: CommonOptions,
    system_config: SystemConfig,
) -> Result<(), Sysexit> {
    let store =
        MemoryStore::load(&common.fixture, &system_config.default_timezone)
            .map_err(|e| {
                eprintln!(
                    "Failed to load fixture '{}': {}",
                    common.fixture.display(),
                    e
                );
                match e {
                    Error::Io(..) => EX_NOINPUT,
                    _ => EX_DATAERR,
                }
            })?;
    let identity = store.user(&common.user).map_err(fail)?;
    let cache = RegionCache::new(system_config.cache.clone());

    let query = match cmd {
        Command::Report(cmd) => {
            let kind = ReportKind::from_id(&cmd.report).map_err(fail)?;
            let registry = filter_fields().map_err(fail)?;
            let filters = cmd
                .filters
                .iter()
                .map(|f| parse_filter(&registry, f))
                .collect::<Result<Vec<FilterSpec>, Error>>()
                .map_err(fail)?;
            info!("Report {}: {}", kind.id(), kind);
            build_report(&store, &identity, kind, &filters)
        }
        Command::Count(_) => summary::message_count(&store, &identity),
        Command::DailyTotals(cmd) => {
            let now = match cmd.now {
                None => Utc::now(),
                Some(ref now) => DateTime::parse_from_rfc3339(now)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| {
                        eprintln!("Bad time '{}': {}", now, e);
                        EX_USAGE
                    })?,
            };
            summary::daily_totals(
                &store,
                &identity,
                cmd.hostname.as_deref(),
                now,
                &cache,
            )
            .map_err(fail)?
        }
        Command::MessageTotals(_) => summary::message_totals(&store, &identity),
        Command::Scores(_) => summary::sa_scores(&store, &identity),
        Command::MailQueue(cmd) => {
            if 1 != cmd.direction && 2 != cmd.direction {
                eprintln!("Queue direction must be 1 or 2");
                return Err(EX_USAGE);
            }
            summary::mail_queue(
                &store,
                &identity,
                cmd.direction,
                cmd.hostname.as_deref(),
                &cache,
            )
        }
        Command::IndexFilter(_) => {
            return index_filter(&store, &identity, &system_config)
        }
        // Needs no fixture, so never gets this far
        Command::Escape(..) => unreachable!(),
    };

    print_query(&query);
    if common.execute {
        let rows = store.fetch(&query).map_err(fail)?;
        info!("{} row(s)", rows.len());
        print_rows(&rows);
    }

    Ok(())
}

fn index_filter(
    store: &MemoryStore,
    identity: &crate::query::identity::UserIdentity,
    system_config: &SystemConfig,
) -> Result<(), Sysexit> {
    let params = IndexParams::from_url(&system_config.index.url);
    println!(
        "-- index at {}:{} as {}",
        params.host, params.port, params.user
    );

    let mut calls = Vec::<IndexCall>::new();
    filter_index(store, store, identity, &mut calls).map_err(fail)?;
    if calls.is_empty() {
        println!("-- unrestricted");
    }
    for call in calls {
        match call {
            IndexCall::Select(select) => println!("SetSelect({})", select),
            IndexCall::Filter(attribute, values) => {
                println!("SetFilter({}, {:?})", attribute, values)
            }
        }
    }

    Ok(())
}

pub(super) fn escape(cmd: EscapeSubcommand) {
    if cmd.restore {
        println!("{}", restore_index_query(&cmd.query));
    } else {
        println!("{}", clean_index_query(&cmd.query));
    }
}

fn fail(e: Error) -> Sysexit {
    eprintln!("{}", e);
    if let Error::CacheUnavailable(..) = e {
        warn!("Cache failure escaped: {}", e);
    }
    Sysexit::for_error(&e)
}

fn print_query(query: &Query) {
    let sql = render(query);
    println!("{};", sql.text);
    for (ix, param) in sql.params.iter().enumerate() {
        println!("-- ${} = {}", ix + 1, literal(param));
    }
    if let Some(ref hint) = query.cache {
        println!(
            "-- cache: {} in {} for {}s",
            hint.key, hint.region, hint.expire_secs
        );
    }
}

fn print_rows(rows: &[Row]) {
    for row in rows {
        let cells = row
            .iter()
            .map(|(k, v)| format!("{}={}", k, literal(v)))
            .collect::<Vec<_>>();
        println!("{}", cells.join("\t"));
    }
}

fn literal(value: &Value) -> String {
    match *value {
        Value::Text(ref s) => format!("'{}'", s.replace('\'', "''")),
        Value::Timestamp(ref t) => format!("'{}'", t.to_rfc3339()),
        ref v => v.to_string(),
    }
}
