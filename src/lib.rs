//! edgedns Library
//!
//! A response-shaping DNS pipeline: three middleware stages over a
//! handler chain. GeoSort reorders answers by client distance,
//! HealthFilter drops endpoints that fail their probes, and NameResolver
//! answers from name-service contracts on a chain RPC endpoint.
//!
//! The components are exposed for use in integration tests and as a
//! library; `main.rs` is the composition root.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::inbound::{DnsServer, Refuser};
pub use adapters::outbound::{
    HttpProbe, HttpProbeParams, IcmpProbe, IcmpProbeParams, MaxMindGeoReader, NeoRpcClient,
    NnsContract,
};
pub use application::{EndpointHealth, GeoRanker, GeoSort, HealthFilter, NameResolver};
pub use config::{load_config, Config};
pub use domain::ports::{DnsHandler, GeoReader, HealthProbe, RecordRegistry, ResponseWriter};
pub use infrastructure::ProbeCache;
