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

//! Restricting queries to the rows an identity owns.

use std::fmt;
use std::str::FromStr;

use log::debug;

use super::expr::*;
use super::identity::UserIdentity;
use super::resolve::{resolve, Directory};
use crate::support::error::Error;

/// Which side of a message the ownership test looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Either the sender or the recipient side.
    Both,
    /// Only the recipient side.
    Inbound,
    /// Only the sender side.
    Outbound,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Both
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "both" | "" => Ok(Direction::Both),
            "in" | "inbound" => Ok(Direction::Inbound),
            "out" | "outbound" => Ok(Direction::Outbound),
            _ => Err(Error::UnknownDirection(s.to_owned())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Direction::Both => "both",
            Direction::Inbound => "in",
            Direction::Outbound => "out",
        })
    }
}

impl Direction {
    fn address_columns(self, model: Model) -> Vec<Column> {
        match self {
            Direction::Both => {
                vec![model.col("to_address"), model.col("from_address")]
            }
            Direction::Inbound => vec![model.col("to_address")],
            Direction::Outbound => vec![model.col("from_address")],
        }
    }

    fn domain_columns(self, model: Model) -> Vec<Column> {
        match self {
            Direction::Both => {
                vec![model.col("to_domain"), model.col("from_domain")]
            }
            Direction::Inbound => vec![model.col("to_domain")],
            Direction::Outbound => vec![model.col("from_domain")],
        }
    }
}

/// The result of scoping: the narrowed query and the direction it was
/// narrowed for.
#[derive(Clone, Debug, PartialEq)]
pub struct ScopeDecision {
    pub query: Query,
    pub direction: Direction,
}

/// Narrows queries over an addressed model to what one identity may see.
///
/// Construct it, optionally set a direction, then apply it to as many
/// queries as needed.
pub struct OwnershipFilter<'a> {
    directory: &'a dyn Directory,
    identity: &'a UserIdentity,
    model: Model,
    direction: Direction,
}

impl<'a> OwnershipFilter<'a> {
    pub fn new(
        directory: &'a dyn Directory,
        identity: &'a UserIdentity,
        model: Model,
    ) -> Self {
        debug_assert!(model.is_addressed(), "BUG: {} has no addresses", model);
        OwnershipFilter {
            directory,
            identity,
            model,
            direction: Direction::Both,
        }
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn apply(&self, query: Query) -> Query {
        self.decide(query).query
    }

    pub fn decide(&self, mut query: Query) -> ScopeDecision {
        let scope = resolve(self.directory, self.identity);

        if self.identity.is_domain_admin() {
            debug!(
                "scoping {} to {} domain(s) of {}, direction {}",
                self.model,
                scope.domains.len(),
                self.identity.username,
                self.direction
            );
            query = query.filter(domain_predicate(
                self.model,
                &scope.domains,
                self.direction,
            ));
        }

        if self.identity.is_peleb() {
            query = query.filter(address_predicate(
                self.model,
                &scope.addresses,
                &scope.tagged,
                self.direction,
            ));
        }

        ScopeDecision {
            query,
            direction: self.direction,
        }
    }
}

/// Domain membership on the recipient side, the sender side, or either.
pub fn domain_predicate(
    model: Model,
    domains: &[String],
    direction: Direction,
) -> Expr {
    any_of(
        direction
            .domain_columns(model)
            .into_iter()
            .map(|col| col.in_(domains.iter().cloned()))
            .collect(),
    )
}

/// Address ownership on the recipient side, the sender side, or either.
///
/// The tagged patterns come first, then plain membership. Without tagged
/// patterns this is just the membership test.
pub fn address_predicate(
    model: Model,
    addresses: &[String],
    tagged: &[String],
    direction: Direction,
) -> Expr {
    let columns = direction.address_columns(model);
    let mut arms = Vec::with_capacity(columns.len() * 2);

    if !tagged.is_empty() {
        for &col in &columns {
            arms.push(any_of(
                tagged
                    .iter()
                    .map(|pattern| col.like(pattern.clone()))
                    .collect(),
            ));
        }
    }

    for &col in &columns {
        arms.push(col.in_(addresses.iter().cloned()));
    }

    any_of(arms)
}

fn any_of(mut exprs: Vec<Expr>) -> Expr {
    if 1 == exprs.len() {
        exprs.pop().unwrap_or(Expr::False)
    } else {
        Expr::Or(exprs)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::eval::Row;
    use crate::query::identity::Roles;
    use crate::query::sql::{render, render_expr};
    use crate::query::store::{MemoryStore, Storage};

    const FIXTURE: &str = r#"
[[organizations]]
id = 1
admins = [10]

[[organizations]]
id = 2
admins = [20]

[[domains]]
id = 1
name = "a.com"
organization = 1

[[domains]]
id = 2
name = "b.com"
organization = 2

[[domains]]
id = 3
name = "c.com"
organization = 2
status = false

[[messages]]
id = "m1"
from_address = "x@elsewhere.net"
to_address = "u+news@a.com"

[[messages]]
id = "m2"
from_address = "u@a.com"
to_address = "y@b.com"

[[messages]]
id = "m3"
from_address = "y@b.com"
to_address = "z@c.com"

[[messages]]
id = "m4"
from_address = "v@a.com"
to_address = "w@elsewhere.net"
"#;

    fn store() -> MemoryStore {
        MemoryStore::from_fixture(toml::from_str(FIXTURE).unwrap())
    }

    fn identity(id: u64, roles: Roles, addresses: &[&str]) -> UserIdentity {
        UserIdentity {
            id,
            username: format!("user{}", id),
            email: format!("user{}@a.com", id),
            timezone: "UTC".to_owned(),
            roles,
            addresses: addresses.iter().map(|&s| s.to_owned()).collect(),
        }
    }

    fn ids(rows: &[Row]) -> Vec<String> {
        rows.iter()
            .filter_map(|r| r.get("id"))
            .map(|v| v.to_string())
            .collect()
    }

    fn fetch_ids(
        store: &MemoryStore,
        user: &UserIdentity,
        dir: Direction,
    ) -> Vec<String> {
        let mut filter = OwnershipFilter::new(store, user, Model::Message);
        filter.set_direction(dir);
        let q = filter.apply(Query::new(Model::Message));
        ids(&store.fetch(&q).unwrap())
    }

    #[test]
    fn direction_parsing() {
        assert_eq!(Direction::Inbound, "in".parse().unwrap());
        assert_eq!(Direction::Outbound, "outbound".parse().unwrap());
        assert_eq!(Direction::Both, "both".parse().unwrap());
        assert_matches!(
            Err(Error::UnknownDirection(..)),
            "sideways".parse::<Direction>()
        );
    }

    #[test]
    fn superadmin_is_unrestricted() {
        let store = store();
        let admin = identity(1, Roles::SUPERADMIN, &[]);
        assert_eq!(
            vec!["m1", "m2", "m3", "m4"],
            fetch_ids(&store, &admin, Direction::Both)
        );

        let decision = OwnershipFilter::new(&store, &admin, Model::Message)
            .decide(Query::new(Model::Message));
        assert!(decision.query.filters.is_empty());
        assert_eq!(Direction::Both, decision.direction);
    }

    #[test]
    fn domain_admin_without_domains_sees_nothing() {
        let store = store();
        let nobody = identity(99, Roles::DOMAIN_ADMIN, &[]);
        for &dir in
            &[Direction::Both, Direction::Inbound, Direction::Outbound]
        {
            assert!(fetch_ids(&store, &nobody, dir).is_empty());
        }

        let q = OwnershipFilter::new(&store, &nobody, Model::Message)
            .apply(Query::new(Model::Message));
        assert_eq!(
            vec![Value::from("xx"), Value::from("xx")],
            render(&q).params
        );
    }

    #[test]
    fn domain_admin_by_direction() {
        let store = store();
        let admin = identity(10, Roles::DOMAIN_ADMIN, &[]);
        assert_eq!(
            vec!["m1", "m2", "m4"],
            fetch_ids(&store, &admin, Direction::Both)
        );
        assert_eq!(vec!["m1"], fetch_ids(&store, &admin, Direction::Inbound));
        assert_eq!(
            vec!["m2", "m4"],
            fetch_ids(&store, &admin, Direction::Outbound)
        );

        // The inactive c.com is not part of the second admin's scope
        let other = identity(20, Roles::DOMAIN_ADMIN, &[]);
        assert_eq!(
            vec!["m2", "m3"],
            fetch_ids(&store, &other, Direction::Both)
        );
        assert_eq!(vec!["m2"], fetch_ids(&store, &other, Direction::Inbound));
    }

    #[test]
    fn predicates_only_name_columns_of_their_direction() {
        let model = Model::Message;
        let domains = vec!["a.com".to_owned()];
        let addresses = vec!["u@a.com".to_owned()];
        let tagged = vec!["u%@a.com".to_owned()];

        let inbound =
            render_expr(&domain_predicate(model, &domains, Direction::Inbound))
                .text;
        assert_eq!("to_domain IN ($1)", inbound);
        let outbound =
            render_expr(&domain_predicate(model, &domains, Direction::Outbound))
                .text;
        assert_eq!("from_domain IN ($1)", outbound);
        let both =
            render_expr(&domain_predicate(model, &domains, Direction::Both))
                .text;
        assert_eq!("to_domain IN ($1) OR from_domain IN ($2)", both);

        let inbound = render_expr(&address_predicate(
            model,
            &addresses,
            &tagged,
            Direction::Inbound,
        ))
        .text;
        assert_eq!("to_address LIKE $1 OR to_address IN ($2)", inbound);
        assert!(!inbound.contains("from_"));

        let outbound = render_expr(&address_predicate(
            model,
            &addresses,
            &[],
            Direction::Outbound,
        ))
        .text;
        assert_eq!("from_address IN ($1)", outbound);

        let both = render_expr(&address_predicate(
            model,
            &addresses,
            &tagged,
            Direction::Both,
        ))
        .text;
        assert_eq!(
            "to_address LIKE $1 OR from_address LIKE $2 \
             OR to_address IN ($3) OR from_address IN ($4)",
            both
        );
    }

    #[test]
    fn tagged_addresses_expand() {
        let store = store();
        let mut user = identity(5, Roles::PELEB, &["u+*@a.com"]);
        user.email = "owner@a.com".to_owned();
        assert_eq!(vec!["m1", "m2"], fetch_ids(&store, &user, Direction::Both));
        assert_eq!(vec!["m1"], fetch_ids(&store, &user, Direction::Inbound));
        assert_eq!(vec!["m2"], fetch_ids(&store, &user, Direction::Outbound));

        let plain = identity(5, Roles::PELEB, &["v@a.com"]);
        assert_eq!(vec!["m4"], fetch_ids(&store, &plain, Direction::Both));
    }

    #[test]
    fn domain_admin_and_peleb_are_anded() {
        let store = store();
        let both =
            identity(10, Roles::DOMAIN_ADMIN | Roles::PELEB, &["v@a.com"]);
        let q = OwnershipFilter::new(&store, &both, Model::Message)
            .apply(Query::new(Model::Message));
        assert_eq!(2, q.filters.len());
        assert_eq!(vec!["m4"], ids(&store.fetch(&q).unwrap()));
    }

    #[test]
    fn mail_queue_is_addressed_too() {
        let store = store();
        let user = identity(5, Roles::PELEB, &[]);
        let q = OwnershipFilter::new(&store, &user, Model::MailQueueItem)
            .apply(Query::new(Model::MailQueueItem));
        assert_eq!(
            "SELECT * FROM mailq WHERE \
             (to_address IN ($1) OR from_address IN ($2))",
            render(&q).text
        );
    }
}
