mod answers;
mod geo_sort;
mod health_filter;
mod name_resolver;

pub use answers::{endpoint_ip, is_address_query, reply_to};
pub use geo_sort::{GeoRanker, GeoSort};
pub use health_filter::{EndpointHealth, HealthFilter};
pub use name_resolver::{NameResolver, TransferError};
