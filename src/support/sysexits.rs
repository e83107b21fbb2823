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

//! Constants from `sysexits.h`, and the mapping of our errors onto them.

use super::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_NOUSER: Sysexit = Sysexit(67);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }

    pub fn for_error(error: &Error) -> Self {
        match *error {
            Error::UnknownUser(..) => EX_NOUSER,
            Error::UnknownField(..)
            | Error::BadFilterValue(..)
            | Error::UnknownReport(..)
            | Error::UnknownDirection(..) => EX_USAGE,
            Error::UnknownTimezone(..)
            | Error::Regex(..)
            | Error::TomlDe(..) => EX_DATAERR,
            Error::Io(..) => EX_IOERR,
            // Callers are expected to degrade rather than propagate this
            Error::CacheUnavailable(..) => EX_SOFTWARE,
        }
    }
}
