mod http_probe;
mod icmp_probe;
mod maxmind_geo_reader;
mod neo_rpc;
mod nns_contract;

pub use http_probe::{HttpProbe, HttpProbeParams};
pub use icmp_probe::{IcmpProbe, IcmpProbeParams};
pub use maxmind_geo_reader::MaxMindGeoReader;
pub use neo_rpc::NeoRpcClient;
pub use nns_contract::NnsContract;
