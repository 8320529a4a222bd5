//! GeoIP Reader Port
//!
//! Abstracts the IP-geolocation databases. Implementations may combine
//! several physical databases; lookups never fail, they degrade to an
//! empty [`IpInfo`].

use crate::domain::entities::IpInfo;
use std::net::IpAddr;

pub trait GeoReader: Send + Sync {
    /// Everything the databases know about `ip`.
    fn ip_info(&self, ip: IpAddr) -> IpInfo;
}
