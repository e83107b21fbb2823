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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown field '{1}' on {0}")]
    UnknownField(&'static str, String),
    #[error("Value '{1}' is not usable for field '{0}'")]
    BadFilterValue(String, String),
    #[error("Unknown report '{0}'")]
    UnknownReport(String),
    #[error("Unknown time zone '{0}'")]
    UnknownTimezone(String),
    #[error("Unknown direction '{0}'")]
    UnknownDirection(String),
    #[error("Unknown user '{0}'")]
    UnknownUser(String),
    #[error("Result cache unavailable: {0}")]
    CacheUnavailable(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
}
