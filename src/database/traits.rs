//! Trait definitions for the database module
//!
//! The point-lookup database is a black box keyed by IP address. These traits
//! are the seam between the lifecycle manager and the concrete reader.

use crate::error::Result;
use std::net::IpAddr;
use std::path::Path;

use super::types::{Location, Variant};

/// An open, query-capable database
pub trait GeoDatabase: Send + Sync {
    fn name(&self) -> &str;

    /// Look up an address for the given variant.
    ///
    /// `Ok(None)` means the address is not in the database.
    fn lookup(&self, ip: IpAddr, variant: Variant) -> Result<Option<Location>>;
}

/// Opens a database file into a [`GeoDatabase`]
pub trait DatabaseLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn GeoDatabase>>;
}
