//! Domain Entities - Core business objects
//!
//! Value types shared by the pipeline stages. They carry no I/O and no
//! references to the adapters that produce them.

use std::fmt;

/// Arc distance placed on records whose location cannot be determined.
///
/// Real great-circle angles live in `[0, 180]` degrees, so any larger
/// value sorts after every known distance.
pub const UNKNOWN_DISTANCE: f64 = 360.0;

/// City-level geolocation data for an IP address.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CityLocation {
    /// GeoName ID of the country the city belongs to (0 when absent)
    pub country_id: u32,
    pub latitude: f64,
    pub longitude: f64,
}

impl CityLocation {
    /// Whether the record carries a usable position.
    pub fn has_location(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0
    }
}

/// Geolocation data for an IP address, combined from the city-level and
/// country-level databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpInfo {
    /// City-level record, if a CITY database knew the address
    pub city: Option<CityLocation>,
    /// Country GeoName ID from a COUNTRY database, if one knew the address
    pub country_id: Option<u32>,
}

impl IpInfo {
    /// An info is empty when no database knew the address, or when the
    /// city database answered with a zero-valued location and no country
    /// database backed it up.
    pub fn is_empty(&self) -> bool {
        match (self.city, self.country_id) {
            (None, None) => true,
            (Some(city), None) => !city.has_location(),
            _ => false,
        }
    }
}

/// Outcome of comparing two located addresses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceInfo {
    /// Great-circle angle in degrees, or [`UNKNOWN_DISTANCE`]
    pub distance: f64,
    /// Whether both sides resolved to the same country GeoName ID
    pub country_matched: bool,
}

impl DistanceInfo {
    pub fn unknown() -> Self {
        Self {
            distance: UNKNOWN_DISTANCE,
            country_matched: false,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.distance >= UNKNOWN_DISTANCE
    }
}

/// Record types understood by the registry contract.
///
/// The discriminants are the DNS type codes, which is also how the
/// contract encodes them on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum RegistryRecordType {
    A = 1,
    Cname = 5,
    Soa = 6,
    Txt = 16,
    Aaaa = 28,
}

impl RegistryRecordType {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::A),
            5 => Some(Self::Cname),
            6 => Some(Self::Soa),
            16 => Some(Self::Txt),
            28 => Some(Self::Aaaa),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for RegistryRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::Cname => "CNAME",
            Self::Soa => "SOA",
            Self::Txt => "TXT",
            Self::Aaaa => "AAAA",
        };
        f.write_str(s)
    }
}

/// One record returned by a registry contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRecord {
    pub name: String,
    pub record_type: RegistryRecordType,
    pub data: String,
}

/// A Uint160 script hash identifying a contract on the chain.
///
/// The textual form is the little-endian hex string the chain tooling
/// prints and the RPC endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContractHash([u8; 20]);

impl ContractHash {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parse the little-endian hex form, with or without a `0x` prefix.
    pub fn from_le_hex(s: &str) -> anyhow::Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(s)?;
        let bytes: [u8; 20] = raw
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("contract hash must be 20 bytes, got {}", raw.len()))?;
        let mut le = bytes;
        le.reverse();
        Ok(Self(le))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Little-endian hex form without a prefix.
    pub fn to_le_string(&self) -> String {
        let mut be = self.0;
        be.reverse();
        hex::encode(be)
    }
}

impl fmt::Display for ContractHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_le_string())
    }
}
