//! Lookup service - answers "locate this address" against the current reader

use crate::database::address::{is_private, parse_address};
use crate::database::manager::{DatabaseManager, ReaderHandle};
use crate::database::LookupResult;
use crate::error::{GeoIpError, LookupError};
use std::net::IpAddr;
use std::sync::Arc;

/// Resolves peer addresses through the manager's current reader handle
#[derive(Clone)]
pub struct LookupService {
    manager: Arc<DatabaseManager>,
}

impl LookupService {
    pub fn new(manager: Arc<DatabaseManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<DatabaseManager> {
        &self.manager
    }

    /// Locate `address`. Never fails; problems become `Unknown*` results.
    pub fn locate(&self, address: &str) -> LookupResult {
        // one snapshot per call so a concurrent refresh cannot swap it mid-lookup
        let Some(reader) = self.manager.current_reader() else {
            return LookupResult::UnknownError(LookupError::ReaderUnavailable);
        };

        let result = match parse_address(address) {
            Ok(ip) => Self::resolve(&reader, ip),
            Err(e) => LookupResult::UnknownError(e),
        };

        match &result {
            LookupResult::Resolved(_) => {}
            LookupResult::UnknownPrivate => log::log!(
                result.log_level(),
                "{} is a private address and not in the database",
                address
            ),
            LookupResult::UnknownError(e) => log::log!(result.log_level(), "{}", e),
        }
        result
    }

    fn resolve(reader: &ReaderHandle, ip: IpAddr) -> LookupResult {
        match reader.lookup(ip) {
            Ok(Some(location)) => LookupResult::Resolved(location),
            Ok(None) if is_private(ip) => LookupResult::UnknownPrivate,
            Ok(None) => LookupResult::UnknownError(LookupError::AddressNotFound(ip)),
            Err(GeoIpError::Lookup(e)) => LookupResult::UnknownError(e),
            Err(other) => LookupResult::UnknownError(LookupError::Backend(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseLoader, DownloadPolicy, GeoDatabase, Location, Variant};
    use crate::download::Downloader;
    use crate::error::Result;
    use std::collections::HashMap;
    use std::path::Path;

    /// Fixed address table standing in for an mmdb file
    struct TableDatabase(HashMap<IpAddr, (&'static str, &'static str)>);

    impl GeoDatabase for TableDatabase {
        fn name(&self) -> &str {
            "table"
        }

        fn lookup(&self, ip: IpAddr, variant: Variant) -> Result<Option<Location>> {
            if ip == "203.0.113.99".parse::<IpAddr>().unwrap() {
                return Err(LookupError::Backend("corrupt search tree".to_string()).into());
            }
            Ok(self.0.get(&ip).map(|(country, city)| Location {
                country: Some(country.to_string()),
                country_code: None,
                city: (variant == Variant::City).then(|| city.to_string()),
            }))
        }
    }

    struct TableLoader;

    impl DatabaseLoader for TableLoader {
        fn open(&self, _path: &Path) -> Result<Box<dyn GeoDatabase>> {
            let mut table = HashMap::new();
            table.insert("81.2.69.142".parse().unwrap(), ("United Kingdom", "London"));
            Ok(Box::new(TableDatabase(table)))
        }
    }

    async fn build_service(variant: Variant) -> (LookupService, tempfile::TempDir) {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(variant.canonical_path(temp.path()), b"db").unwrap();
        let policy = DownloadPolicy {
            variant,
            ..DownloadPolicy::default()
        };
        let manager = DatabaseManager::new(temp.path(), policy, Downloader::new().unwrap())
            .with_loader(Arc::new(TableLoader));
        manager.ensure_ready().await.unwrap();
        (LookupService::new(Arc::new(manager)), temp)
    }

    #[test]
    fn test_reader_absent() {
        let manager = DatabaseManager::new("/nonexistent", DownloadPolicy::default(), Downloader::new().unwrap());
        let service = LookupService::new(Arc::new(manager));
        assert_eq!(
            service.locate("8.8.8.8"),
            LookupResult::UnknownError(LookupError::ReaderUnavailable)
        );
    }

    #[tokio::test]
    async fn test_resolved_country_and_city() {
        let (service, _temp) = build_service(Variant::Country).await;
        let location = service.locate("81.2.69.142").location().cloned().unwrap();
        assert_eq!(location.country.as_deref(), Some("United Kingdom"));
        assert_eq!(location.city, None);

        let (service, _temp) = build_service(Variant::City).await;
        let location = service.locate("81.2.69.142:19132").location().cloned().unwrap();
        assert_eq!(location.city.as_deref(), Some("London"));
    }

    #[tokio::test]
    async fn test_private_address_not_found() {
        let (service, _temp) = build_service(Variant::Country).await;
        let result = service.locate("127.0.0.1");
        assert_eq!(result, LookupResult::UnknownPrivate);
        assert_eq!(result.log_level(), log::Level::Info);
        assert_eq!(service.locate("192.168.1.20"), LookupResult::UnknownPrivate);
    }

    #[tokio::test]
    async fn test_public_address_not_found() {
        let (service, _temp) = build_service(Variant::Country).await;
        let ip: IpAddr = "8.8.8.8".parse().unwrap();
        let result = service.locate("8.8.8.8");
        assert_eq!(result, LookupResult::UnknownError(LookupError::AddressNotFound(ip)));
        assert_eq!(result.log_level(), log::Level::Error);
    }

    #[tokio::test]
    async fn test_invalid_address_and_backend_errors() {
        let (service, _temp) = build_service(Variant::Country).await;
        assert!(matches!(
            service.locate("not-an-ip"),
            LookupResult::UnknownError(LookupError::InvalidAddress(_))
        ));
        assert!(matches!(
            service.locate("203.0.113.99"),
            LookupResult::UnknownError(LookupError::Backend(_))
        ));
    }
}
