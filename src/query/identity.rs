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

use bitflags::bitflags;
use serde::Deserialize;

bitflags! {
    /// The role tiers an identity qualifies for.
    ///
    /// Normally exactly one is set. `DOMAIN_ADMIN | PELEB` is tolerated, in
    /// which case both restrictions apply.
    pub struct Roles: u8 {
        const SUPERADMIN = 1 << 0;
        const DOMAIN_ADMIN = 1 << 1;
        /// An ordinary user, who only sees mail to or from their own
        /// addresses.
        const PELEB = 1 << 2;
    }
}

/// The requesting user, as far as query composition is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: u64,
    pub username: String,
    /// The primary address. Always treated as owned.
    pub email: String,
    /// IANA time zone name.
    pub timezone: String,
    pub roles: Roles,
    /// Additional owned addresses. An address containing `+*` or `-*` is a
    /// tagged address matching every sub-address of the mailbox.
    pub addresses: Vec<String>,
}

impl UserIdentity {
    pub fn is_superadmin(&self) -> bool {
        self.roles.contains(Roles::SUPERADMIN)
    }

    pub fn is_domain_admin(&self) -> bool {
        self.roles.contains(Roles::DOMAIN_ADMIN)
    }

    pub fn is_peleb(&self) -> bool {
        self.roles.contains(Roles::PELEB)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    DomainAdmin,
    Peleb,
}

/// An identity as written in a fixture file.
#[derive(Clone, Debug, Deserialize)]
pub struct IdentityRecord {
    pub id: u64,
    pub username: String,
    pub email: String,
    /// If absent, the configured default applies.
    #[serde(default)]
    pub timezone: Option<String>,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl IdentityRecord {
    pub fn into_identity(self, default_timezone: &str) -> UserIdentity {
        let roles = self.roles.iter().fold(Roles::empty(), |acc, role| {
            acc | match *role {
                Role::Superadmin => Roles::SUPERADMIN,
                Role::DomainAdmin => Roles::DOMAIN_ADMIN,
                Role::Peleb => Roles::PELEB,
            }
        });

        UserIdentity {
            id: self.id,
            username: self.username,
            email: self.email,
            timezone: self
                .timezone
                .unwrap_or_else(|| default_timezone.to_owned()),
            roles,
            addresses: self.addresses,
        }
    }
}

impl From<IdentityRecord> for UserIdentity {
    fn from(r: IdentityRecord) -> Self {
        r.into_identity("UTC")
    }
}
