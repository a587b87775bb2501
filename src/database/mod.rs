//! Database module for geoip-warden
//!
//! This module owns the lifecycle of the local GeoIP database: deciding when
//! it is stale, installing new generations and answering lookups against the
//! reader that is currently published.
//!
//! # Module Organization
//!
//! - `types`: Data model (Variant, DatabaseArtifact, DownloadPolicy, LookupResult)
//! - `traits`: Reader seam (GeoDatabase, DatabaseLoader)
//! - `freshness`: Pure refresh decision
//! - `manager`: Lifecycle manager owning the artifact and reader handle
//! - `lookup`: Lookup service applying private-address policy
//! - `geoip2`: MaxMind reader implementation

// Core modules
pub mod address;
pub mod freshness;
pub mod lookup;
pub mod manager;
pub mod traits;
pub mod types;

// Database implementation modules
pub mod geoip2;

// Re-export core types and traits for convenience
pub use geoip2::{GeoIP2Database, GeoIP2Loader};
pub use lookup::LookupService;
pub use manager::{DatabaseManager, ReaderHandle, ReadyOutcome};
pub use traits::{DatabaseLoader, GeoDatabase};
pub use types::{
    DatabaseArtifact, DownloadPolicy, LICENSE_KEY_PLACEHOLDER, LifecycleState, Location, LookupResult, Variant,
};
