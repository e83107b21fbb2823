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

//! Works out which addresses and domains an identity may see.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use super::identity::UserIdentity;

/// Stands in for an empty domain set. It matches no real domain, so an
/// `IN` over it is well-formed and excludes everything.
pub const NO_DOMAIN: &str = "xx";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AliasRecord {
    pub name: String,
    #[serde(default = "active")]
    pub status: bool,
}

fn active() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainRecord {
    pub name: String,
    pub status: bool,
    pub aliases: Vec<AliasRecord>,
}

/// The organisation-membership side of the store.
pub trait Directory {
    /// Every domain owned by an organisation which `user_id` administers,
    /// regardless of status.
    fn administered_domains(&self, user_id: u64) -> Vec<DomainRecord>;
}

/// The authorisation space of one identity.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Scope {
    pub primary: String,
    /// Plain owned addresses, including the primary address.
    pub addresses: Vec<String>,
    /// `LIKE` patterns derived from tagged addresses.
    pub tagged: Vec<String>,
    /// Only populated for domain administrators. Never empty for them.
    pub domains: Vec<String>,
}

pub fn resolve(directory: &dyn Directory, identity: &UserIdentity) -> Scope {
    let (addresses, tagged) = owned_addresses(identity);
    let domains = if identity.is_domain_admin() {
        administered_domains(directory, identity)
    } else {
        Vec::new()
    };

    Scope {
        primary: identity.email.clone(),
        addresses,
        tagged,
        domains,
    }
}

/// Split the owned addresses into plain addresses (with the primary address
/// appended) and tagged-address patterns.
pub fn owned_addresses(identity: &UserIdentity) -> (Vec<String>, Vec<String>) {
    let mut addresses = Vec::with_capacity(identity.addresses.len() + 1);
    let mut tagged = Vec::new();
    for address in &identity.addresses {
        if is_tagged(address) {
            tagged.push(tag_pattern(address));
        } else {
            addresses.push(address.clone());
        }
    }
    addresses.push(identity.email.clone());

    (addresses, tagged)
}

/// Names of the active domains `identity` administers and of their active
/// aliases, or just `NO_DOMAIN` if there are none.
pub fn administered_domains(
    directory: &dyn Directory,
    identity: &UserIdentity,
) -> Vec<String> {
    let mut domains = Vec::new();
    for domain in directory.administered_domains(identity.id) {
        if !domain.status {
            continue;
        }

        domains.push(domain.name);
        domains.extend(
            domain
                .aliases
                .into_iter()
                .filter(|alias| alias.status)
                .map(|alias| alias.name),
        );
    }

    if domains.is_empty() {
        domains.push(NO_DOMAIN.to_owned());
    }

    domains
}

pub fn is_tagged(address: &str) -> bool {
    address.contains("+*") || address.contains("-*")
}

lazy_static! {
    static ref RX_TAG_MARKER: Regex = Regex::new(r"[+-]\*").unwrap();
}

/// Convert a tagged address into a `LIKE` pattern.
///
/// The first tag marker becomes `%`, so `user+*@domain` becomes
/// `user%@domain` and `user+*x@domain` becomes `user%x@domain`. Literal
/// `%`, `_` and `\` elsewhere in the address are escaped so they only match
/// themselves.
pub fn tag_pattern(address: &str) -> String {
    match RX_TAG_MARKER.find(address) {
        Some(marker) => format!(
            "{}%{}",
            escape_like(&address[..marker.start()]),
            escape_like(&address[marker.end()..]),
        ),
        None => escape_like(address),
    }
}

pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
