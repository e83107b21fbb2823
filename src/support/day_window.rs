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

//! Calendar day boundaries in a user's time zone.

use chrono::prelude::*;
use chrono::Duration;
use chrono_tz::Tz;

use crate::support::error::Error;

/// Parse an IANA time zone name.
pub fn parse_tz(name: &str) -> Result<Tz, Error> {
    name.parse::<Tz>()
        .map_err(|_| Error::UnknownTimezone(name.to_owned()))
}

/// The first and last second of the day `now` falls on in `tz`, as UTC.
pub fn today_bounds(
    tz: &str,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), Error> {
    let zone = parse_tz(tz)?;
    let today = now.with_timezone(&zone).date_naive();
    let start = today.and_hms_opt(0, 0, 0).and_then(|t| local(zone, t));
    let end = today.and_hms_opt(23, 59, 59).and_then(|t| local(zone, t));
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(Error::UnknownTimezone(tz.to_owned())),
    }
}

/// Resolve a local wall clock time. Ambiguous times take the earlier
/// instant; times inside a DST gap are moved forward an hour.
fn local(zone: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            zone.from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
        })
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod test {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn bounds_follow_the_zone() {
        assert_eq!(
            (utc("2020-05-31T22:00:00Z"), utc("2020-06-01T21:59:59Z")),
            today_bounds("Africa/Johannesburg", utc("2020-06-01T10:00:00Z"))
                .unwrap()
        );
        // Already tomorrow in Johannesburg
        assert_eq!(
            (utc("2020-06-01T22:00:00Z"), utc("2020-06-02T21:59:59Z")),
            today_bounds("Africa/Johannesburg", utc("2020-06-01T23:30:00Z"))
                .unwrap()
        );
        assert_eq!(
            (utc("2020-06-01T00:00:00Z"), utc("2020-06-01T23:59:59Z")),
            today_bounds("UTC", utc("2020-06-01T23:30:00Z")).unwrap()
        );
    }

    #[test]
    fn dst_gap_at_midnight() {
        // Clocks in Santiago jumped from 00:00 to 01:00 on 2019-09-08
        let (start, _) =
            today_bounds("America/Santiago", utc("2019-09-08T15:00:00Z"))
                .unwrap();
        assert_eq!(utc("2019-09-08T04:00:00Z"), start);
    }

    #[test]
    fn unknown_zone() {
        assert_matches!(
            Err(Error::UnknownTimezone(..)),
            today_bounds("Mars/Olympus_Mons", Utc::now())
        );
    }
}
