mod dns_chain;
mod geo_reader;
mod health_probe;
mod registry;
mod rpc_invoker;

pub use dns_chain::{DnsHandler, ResponseWriter};
pub use geo_reader::GeoReader;
pub use health_probe::HealthProbe;
pub use registry::RecordRegistry;
pub use rpc_invoker::{CallArg, InvokeOutcome, RpcInvoker, StackItem};
