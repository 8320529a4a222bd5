mod dns_server;

pub use dns_server::{DnsServer, Refuser};
