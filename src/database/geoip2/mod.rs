//! GeoIP2 database implementation
//!
//! This module implements support for MaxMind GeoIP2 / GeoLite2 databases,
//! in both the Country and City editions.

use crate::database::{DatabaseLoader, GeoDatabase, Location, Variant};
use crate::error::{GeoIpError, LookupError, Result};
use maxminddb::geoip2;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

const NAME_LANGUAGE: &str = "en";

/// GeoIP2 database backed by an in-memory copy of the mmdb file
pub struct GeoIP2Database {
    name: String,
    reader: maxminddb::Reader<Vec<u8>>,
}

impl GeoIP2Database {
    /// Open the database file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Loading GeoIP2 database from: {:?}", path);

        let reader = maxminddb::Reader::open_readfile(path)
            .map_err(|e| GeoIpError::DatabaseOpen(format!("{:?}: {}", path, e)))?;

        log::info!(
            "Successfully loaded GeoIP2 database {} (build epoch {})",
            reader.metadata.database_type,
            reader.metadata.build_epoch
        );

        Ok(Self {
            name: reader.metadata.database_type.clone(),
            reader,
        })
    }

    fn lookup_country(&self, ip: IpAddr) -> std::result::Result<Location, maxminddb::MaxMindDBError> {
        let record = self.reader.lookup::<geoip2::Country>(ip)?;
        let country = record.country.as_ref();

        Ok(Location {
            country: country.and_then(|c| c.names.as_ref()).and_then(english_name),
            country_code: country.and_then(|c| c.iso_code).map(str::to_string),
            city: None,
        })
    }

    fn lookup_city(&self, ip: IpAddr) -> std::result::Result<Location, maxminddb::MaxMindDBError> {
        let record = self.reader.lookup::<geoip2::City>(ip)?;
        let country = record.country.as_ref();

        Ok(Location {
            country: country.and_then(|c| c.names.as_ref()).and_then(english_name),
            country_code: country.and_then(|c| c.iso_code).map(str::to_string),
            city: record
                .city
                .as_ref()
                .and_then(|c| c.names.as_ref())
                .and_then(english_name),
        })
    }
}

fn english_name(names: &BTreeMap<&str, &str>) -> Option<String> {
    names.get(NAME_LANGUAGE).map(|s| s.to_string())
}

impl GeoDatabase for GeoIP2Database {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, ip: IpAddr, variant: Variant) -> Result<Option<Location>> {
        let result = match variant {
            Variant::Country => self.lookup_country(ip),
            Variant::City => self.lookup_city(ip),
        };

        match result {
            Ok(location) => Ok(Some(location)),
            Err(maxminddb::MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(LookupError::Backend(e.to_string()).into()),
        }
    }
}

/// Loader producing [`GeoIP2Database`] readers
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoIP2Loader;

impl DatabaseLoader for GeoIP2Loader {
    fn open(&self, path: &Path) -> Result<Box<dyn GeoDatabase>> {
        Ok(Box::new(GeoIP2Database::open(path)?))
    }
}
