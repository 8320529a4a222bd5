//! MaxMind GeoIP Reader
//!
//! Implements [`GeoReader`] over a directory of MMDB files. Files are
//! classified as city-level or country-level by their metadata database
//! type; one reader per kind is kept, and when several files share a kind
//! the last one in file-name order wins.

use crate::domain::entities::{CityLocation, IpInfo};
use crate::domain::ports::GeoReader;
use maxminddb::Reader;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DbKind {
    City,
    Country,
}

/// Database-type strings that identify a city-level MMDB.
const CITY_DB_TYPES: &[&str] = &[
    "DBIP-City-Lite",
    "DBIP-Location (compat=City)",
    "GeoLite2-City",
    "GeoIP2-City",
    "GeoIP2-City-Africa",
    "GeoIP2-City-Asia-Pacific",
    "GeoIP2-City-Europe",
    "GeoIP2-City-North-America",
    "GeoIP2-City-South-America",
    "GeoIP2-Precision-City",
];

/// Database-type strings that identify a country-level MMDB.
const COUNTRY_DB_TYPES: &[&str] = &[
    "GeoLite2-Country",
    "GeoIP2-Country",
    "DBIP-Country-Lite",
    "DBIP-Country",
];

#[derive(Debug, Deserialize)]
struct CityModel {
    country: Option<CountryModel>,
    location: Option<LocationModel>,
}

#[derive(Debug, Deserialize)]
struct CountryRecordModel {
    country: Option<CountryModel>,
}

#[derive(Debug, Deserialize)]
struct CountryModel {
    geoname_id: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LocationModel {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// GeoIP reader over the MaxMind databases found in a directory.
pub struct MaxMindGeoReader {
    readers: RwLock<HashMap<DbKind, Reader<Vec<u8>>>>,
}

impl MaxMindGeoReader {
    /// Scan `dir` for `*.mmdb` files and load every recognised database.
    /// Unknown database types are skipped with a warning; an unreadable
    /// directory is fatal, an empty one is not.
    pub fn open_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| anyhow::anyhow!("couldn't read geoip db dir {}: {e}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().map(|ext| ext == "mmdb").unwrap_or(false)
            })
            .collect();
        files.sort();

        let registry = Self {
            readers: RwLock::new(HashMap::new()),
        };

        let mut count = 0;
        for path in files {
            let reader = match Reader::open_readfile(&path) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("failed to open geoip database {}: {e}", path.display());
                    continue;
                }
            };

            let Some(kind) = classify(&reader.metadata.database_type) else {
                tracing::warn!(
                    "skipping geoip database {} of unknown type '{}'",
                    path.display(),
                    reader.metadata.database_type
                );
                continue;
            };

            registry.add_reader(kind, reader);
            count += 1;
            tracing::info!("loaded geoip database {} ({:?})", path.display(), kind);
        }

        tracing::info!("configured {count} geoip databases; the last of each kind wins");
        Ok(registry)
    }

    fn add_reader(&self, kind: DbKind, reader: Reader<Vec<u8>>) {
        self.readers.write().insert(kind, reader);
    }
}

fn classify(database_type: &str) -> Option<DbKind> {
    if CITY_DB_TYPES.contains(&database_type) {
        Some(DbKind::City)
    } else if COUNTRY_DB_TYPES.contains(&database_type) {
        Some(DbKind::Country)
    } else {
        None
    }
}

impl GeoReader for MaxMindGeoReader {
    fn ip_info(&self, ip: IpAddr) -> IpInfo {
        let readers = self.readers.read();
        let mut info = IpInfo::default();

        if let Some(city_db) = readers.get(&DbKind::City) {
            match city_db.lookup::<CityModel>(ip) {
                Ok(city) => {
                    let location = city.location.unwrap_or_default();
                    info.city = Some(CityLocation {
                        country_id: city.country.and_then(|c| c.geoname_id).unwrap_or(0),
                        latitude: location.latitude.unwrap_or(0.0),
                        longitude: location.longitude.unwrap_or(0.0),
                    });
                }
                Err(e) => tracing::debug!("city db lookup for {ip} failed: {e}"),
            }
        }

        if let Some(country_db) = readers.get(&DbKind::Country) {
            match country_db.lookup::<CountryRecordModel>(ip) {
                Ok(record) => info.country_id = record.country.and_then(|c| c.geoname_id),
                Err(e) => tracing::debug!("country db lookup for {ip} failed: {e}"),
            }
        }

        info
    }
}
