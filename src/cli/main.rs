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

use std::mem;
use std::path::{Path, PathBuf};

use log::info;
use structopt::StructOpt;

use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
pub(super) enum Command {
    /// Compose one of the top-N reports.
    Report(ReportSubcommand),
    /// Compose the total message count.
    Count(CommonOptions),
    /// Compose today's message totals by verdict.
    DailyTotals(DailyTotalsSubcommand),
    /// Compose the per-day message totals.
    MessageTotals(CommonOptions),
    /// Compose the spam score histogram.
    Scores(CommonOptions),
    /// Compose the mail queue count.
    MailQueue(MailQueueSubcommand),
    /// Show the full-text index filters for a user.
    IndexFilter(CommonOptions),
    /// Escape (or restore) a full-text search string.
    Escape(EscapeSubcommand),
}

impl Command {
    fn common_options(&mut self) -> Option<CommonOptions> {
        match *self {
            Command::Report(ref mut c) => Some(mem::take(&mut c.common)),
            Command::DailyTotals(ref mut c) => Some(mem::take(&mut c.common)),
            Command::MailQueue(ref mut c) => Some(mem::take(&mut c.common)),
            Command::Count(ref mut c)
            | Command::MessageTotals(ref mut c)
            | Command::Scores(ref mut c)
            | Command::IndexFilter(ref mut c) => Some(mem::take(c)),
            Command::Escape(..) => None,
        }
    }
}

#[derive(StructOpt, Default)]
pub(super) struct CommonOptions {
    /// The directory containing `mailscope.toml` etc
    /// [default: /etc/mailscope or /usr/local/etc/mailscope]
    #[structopt(long, parse(from_os_str))]
    pub(super) root: Option<PathBuf>,

    /// TOML file holding the users, domains and messages to work against.
    #[structopt(long, short, parse(from_os_str))]
    pub(super) fixture: PathBuf,

    /// The user to compose the query for.
    #[structopt(long, short)]
    pub(super) user: String,

    /// Run the query against the fixture instead of just printing it.
    #[structopt(long, short)]
    pub(super) execute: bool,
}

/// Compose a top-N report.
///
/// Reports are numbered as follows:
///
/// 1, 2: senders by quantity, volume;
/// 3, 4: sender domains by quantity, volume;
/// 5, 6: recipients by quantity, volume;
/// 7, 8: recipient domains by quantity, volume;
/// 9: spam score distribution;
/// 10: mail relays.
#[derive(StructOpt)]
pub(super) struct ReportSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// Narrow the report with `field:operator:value`. Can be passed multiple
    /// times; filters on the same field and operator are OR-ed.
    #[structopt(long = "filter", number_of_values(1))]
    pub(super) filters: Vec<String>,

    /// The report number.
    pub(super) report: String,
}

#[derive(StructOpt)]
pub(super) struct DailyTotalsSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// Only count mail handled by this host.
    #[structopt(long)]
    pub(super) hostname: Option<String>,

    /// RFC 3339 time to use as "now" [default: the current time]
    #[structopt(long)]
    pub(super) now: Option<String>,
}

#[derive(StructOpt)]
pub(super) struct MailQueueSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// Only count mail queued on this host.
    #[structopt(long)]
    pub(super) hostname: Option<String>,

    /// 1 for the inbound queue, 2 for the outbound queue.
    #[structopt(long, default_value = "1")]
    pub(super) direction: i64,
}

#[derive(StructOpt)]
pub(super) struct EscapeSubcommand {
    /// Undo escaping instead of applying it.
    #[structopt(long)]
    pub(super) restore: bool,

    /// The search string.
    pub(super) query: String,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let mut cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let common = match cmd.common_options() {
        Some(common) => common,
        None => {
            if let Command::Escape(cmd) = cmd {
                super::run::escape(cmd);
            }
            return;
        }
    };

    let root = common.root.clone().or_else(find_root);
    let system_config = match root {
        Some(ref root) => load_config(root),
        None => SystemConfig::default(),
    };

    init_logging(root.as_deref());
    info!(
        "{} {} composing for '{}'",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        common.user
    );

    if let Err(exit) = super::run::run(cmd, common, system_config) {
        exit.exit();
    }
}

fn find_root() -> Option<PathBuf> {
    if Path::new("/etc/mailscope/mailscope.toml").is_file() {
        Some("/etc/mailscope".to_owned().into())
    } else if Path::new("/usr/local/etc/mailscope/mailscope.toml").is_file() {
        Some("/usr/local/etc/mailscope".to_owned().into())
    } else {
        None
    }
}

fn load_config(root: &Path) -> SystemConfig {
    let system_config_path = root.join("mailscope.toml");
    if !system_config_path.is_file() {
        eprintln!(
            "'{}' does not exist; use --root=/path/to/mailscope if your\n\
             installation is elsewhere.",
            system_config_path.display()
        );
        EX_CONFIG.exit()
    }

    match SystemConfig::load(&system_config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Error in config file at '{}': {}",
                system_config_path.display(),
                e
            );
            EX_CONFIG.exit()
        }
    }
}

fn init_logging(root: Option<&Path>) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        crate::init_simple_log();
        return;
    }

    let log_config_file = root.map(|r| r.join("logging.toml"));
    match log_config_file {
        Some(ref log_config_file) if log_config_file.is_file() => {
            if let Err(e) = log4rs::init_file(
                log_config_file,
                log4rs::file::Deserializers::new(),
            ) {
                eprintln!(
                    "Failed to initialise logging from '{}': {}",
                    log_config_file.display(),
                    e
                );
                EX_CONFIG.exit();
            }
        }
        _ => {
            let formatter = syslog::Formatter3164 {
                facility: syslog::Facility::LOG_MAIL,
                hostname: None,
                process: env!("CARGO_PKG_NAME").to_owned(),
                pid: nix::unistd::getpid().as_raw(),
            };
            // No syslog is not a reason to refuse to work
            if let Ok(logger) = syslog::unix(formatter) {
                let _ = log::set_boxed_logger(Box::new(
                    syslog::BasicLogger::new(logger),
                ))
                .map(|_| log::set_max_level(log::LevelFilter::Info));
            }
        }
    }
}
