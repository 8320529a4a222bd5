//! DNS Chain Ports
//!
//! The seam between the transport layer and the pipeline stages. A stage
//! receives the query together with the writer that will carry the
//! response; response-shaping stages wrap the writer and hand the wrapped
//! one to the next handler, so rewriting happens at write time.

use async_trait::async_trait;
use hickory_proto::op::Message;
use std::net::IpAddr;

/// Destination for a DNS response.
///
/// Implementations sit on a transport (UDP socket, TCP stream, test
/// recorder) or wrap another writer to rewrite the message on its way
/// out.
#[async_trait]
pub trait ResponseWriter: Send {
    /// Address of the requesting peer. Transports that are not IP-based
    /// return `None`.
    fn remote_ip(&self) -> Option<IpAddr>;

    /// Write the response message to the client.
    async fn write_msg(&mut self, msg: Message) -> anyhow::Result<()>;
}

/// One link in the handler chain.
///
/// Handlers either answer the query themselves (writing to `writer`) or
/// delegate to the next handler they were constructed with, possibly
/// after wrapping the writer.
#[async_trait]
pub trait DnsHandler: Send + Sync {
    async fn handle(&self, writer: &mut dyn ResponseWriter, req: &Message) -> anyhow::Result<()>;
}
