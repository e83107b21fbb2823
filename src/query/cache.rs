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

//! Best-effort result caching.
//!
//! Composition never talks to the cache itself. It only asks the cache for a
//! hint to attach to the query, which whoever executes the query may honour.
//! If the cache cannot provide one, the query simply runs uncached.

use log::debug;

use super::expr::{CacheHint, Query};
use crate::support::error::Error;
use crate::support::system_config::CacheConfig;

pub trait ResultCache {
    /// Produce a hint for storing the result under `key` in `region`.
    fn hint(&self, region: &str, key: &str) -> Result<CacheHint, Error>;
}

/// A cache made of the regions listed in the system configuration.
#[derive(Clone, Debug)]
pub struct RegionCache {
    config: CacheConfig,
}

impl RegionCache {
    pub fn new(config: CacheConfig) -> Self {
        RegionCache { config }
    }
}

impl ResultCache for RegionCache {
    fn hint(&self, region: &str, key: &str) -> Result<CacheHint, Error> {
        if !self.config.enabled {
            return Err(Error::CacheUnavailable("caching disabled".to_owned()));
        }

        let region_config =
            self.config.regions.get(region).ok_or_else(|| {
                Error::CacheUnavailable(format!("no cache region '{}'", region))
            })?;

        Ok(CacheHint {
            region: region.to_owned(),
            key: key.to_owned(),
            expire_secs: region_config.expire,
        })
    }
}

/// A cache which is never available.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

impl ResultCache for NoCache {
    fn hint(&self, _: &str, _: &str) -> Result<CacheHint, Error> {
        Err(Error::CacheUnavailable("no cache configured".to_owned()))
    }
}

impl Query {
    /// Mark this query as cacheable under `key` in `region`.
    ///
    /// Failure to get a hint is logged and otherwise ignored.
    pub fn cached(
        mut self,
        cache: &dyn ResultCache,
        region: &str,
        key: &str,
    ) -> Self {
        match cache.hint(region, key) {
            Ok(hint) => self.cache = Some(hint),
            Err(e) => debug!("Not caching {}: {}", key, e),
        }
        self
    }
}
