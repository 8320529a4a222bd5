//! DNS Server Adapter
//!
//! Thin UDP/TCP front end that decodes queries, drives the stage chain
//! with a transport-backed writer and ships the response back. Zone
//! transfers are answered over TCP from the resolver's transfer channel.

use crate::application::{reply_to, NameResolver, TransferError};
use crate::domain::ports::{DnsHandler, ResponseWriter};
use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::RecordType;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

const MAX_UDP_PACKET: usize = 4096;

/// Terminal handler for chains with no resolving stage: refuses the
/// query so the client knows nothing upstream will answer.
pub struct Refuser;

#[async_trait]
impl DnsHandler for Refuser {
    async fn handle(&self, writer: &mut dyn ResponseWriter, req: &Message) -> anyhow::Result<()> {
        let mut reply = reply_to(req);
        reply.set_response_code(ResponseCode::Refused);
        writer.write_msg(reply).await
    }
}

pub struct DnsServer {
    listen_addr: SocketAddr,
    handler: Arc<dyn DnsHandler>,
    /// Present when the chain ends in a resolver able to serve AXFR
    transfer: Option<Arc<NameResolver>>,
}

impl DnsServer {
    pub fn new(
        listen_addr: SocketAddr,
        handler: Arc<dyn DnsHandler>,
        transfer: Option<Arc<NameResolver>>,
    ) -> Self {
        Self {
            listen_addr,
            handler,
            transfer,
        }
    }

    /// Serve UDP and TCP until either listener fails.
    pub async fn run(&self) -> anyhow::Result<()> {
        let udp = Arc::new(UdpSocket::bind(self.listen_addr).await?);
        let tcp = TcpListener::bind(self.listen_addr).await?;
        tracing::info!("dns server listening on {}", self.listen_addr);

        tokio::try_join!(self.run_udp(udp), self.run_tcp(tcp))?;
        Ok(())
    }

    async fn run_udp(&self, socket: Arc<UdpSocket>) -> anyhow::Result<()> {
        let mut buf = [0u8; MAX_UDP_PACKET];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            let data = buf[..len].to_vec();
            let socket = Arc::clone(&socket);
            let handler = Arc::clone(&self.handler);

            tokio::spawn(async move {
                let mut writer = UdpWriter { socket, peer };
                match Message::from_bytes(&data) {
                    Ok(req) => {
                        if let Err(e) = handler.handle(&mut writer, &req).await {
                            tracing::error!("dns request from {peer} failed: {e:?}");
                            let mut reply = reply_to(&req);
                            reply.set_response_code(ResponseCode::ServFail);
                            let _ = writer.write_msg(reply).await;
                        }
                    }
                    Err(e) => tracing::warn!("undecodable packet from {peer}: {e}"),
                }
            });
        }
    }

    async fn run_tcp(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let handler = Arc::clone(&self.handler);
            let transfer = self.transfer.clone();

            tokio::spawn(async move {
                if let Err(e) = serve_tcp_conn(stream, peer, handler, transfer).await {
                    tracing::debug!("tcp connection from {peer} ended: {e}");
                }
            });
        }
    }
}

async fn serve_tcp_conn(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn DnsHandler>,
    transfer: Option<Arc<NameResolver>>,
) -> anyhow::Result<()> {
    loop {
        let len = match stream.read_u16().await {
            Ok(len) => len as usize,
            Err(_) => return Ok(()), // peer closed
        };
        let mut data = vec![0u8; len];
        stream.read_exact(&mut data).await?;

        let req = Message::from_bytes(&data)?;
        let mut writer = TcpWriter {
            stream: &mut stream,
            peer,
        };

        let is_axfr = req
            .queries()
            .first()
            .map(|q| q.query_type() == RecordType::AXFR)
            .unwrap_or(false);

        if is_axfr {
            serve_transfer(transfer.as_deref(), &mut writer, &req).await?;
        } else if let Err(e) = handler.handle(&mut writer, &req).await {
            tracing::error!("dns request from {peer} failed: {e:?}");
            let mut reply = reply_to(&req);
            reply.set_response_code(ResponseCode::ServFail);
            writer.write_msg(reply).await?;
        }
    }
}

/// Answer an AXFR query from the resolver's transfer channel: drain the
/// producer, then emit the whole zone as one authoritative response.
async fn serve_transfer(
    resolver: Option<&NameResolver>,
    writer: &mut TcpWriter<'_>,
    req: &Message,
) -> anyhow::Result<()> {
    let mut reply = reply_to(req);

    let Some(resolver) = resolver else {
        reply.set_response_code(ResponseCode::Refused);
        return writer.write_msg(reply).await;
    };
    let zone = req
        .queries()
        .first()
        .map(|q| q.name().to_utf8())
        .unwrap_or_default();

    match resolver.transfer(&zone).await {
        Ok(mut rx) => {
            let mut records = Vec::new();
            while let Some(batch) = rx.recv().await {
                records.extend(batch);
            }
            if records.is_empty() {
                // the producer aborted without a batch
                reply.set_response_code(ResponseCode::ServFail);
            } else {
                reply.set_authoritative(true);
                reply.insert_answers(records);
            }
        }
        Err(TransferError::NotAuthoritative) => {
            reply.set_response_code(ResponseCode::NotAuth);
        }
        Err(TransferError::Other(e)) => {
            tracing::error!("zone transfer of '{zone}' failed: {e:?}");
            reply.set_response_code(ResponseCode::ServFail);
        }
    }

    writer.write_msg(reply).await
}

struct UdpWriter {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

#[async_trait]
impl ResponseWriter for UdpWriter {
    fn remote_ip(&self) -> Option<IpAddr> {
        Some(self.peer.ip())
    }

    async fn write_msg(&mut self, msg: Message) -> anyhow::Result<()> {
        let bytes = msg.to_bytes()?;
        self.socket.send_to(&bytes, self.peer).await?;
        Ok(())
    }
}

struct TcpWriter<'a> {
    stream: &'a mut TcpStream,
    peer: SocketAddr,
}

#[async_trait]
impl ResponseWriter for TcpWriter<'_> {
    fn remote_ip(&self) -> Option<IpAddr> {
        Some(self.peer.ip())
    }

    async fn write_msg(&mut self, msg: Message) -> anyhow::Result<()> {
        let bytes = msg.to_bytes()?;
        let len = u16::try_from(bytes.len())
            .map_err(|_| anyhow::anyhow!("response too large for tcp framing"))?;
        self.stream.write_u16(len).await?;
        self.stream.write_all(&bytes).await?;
        Ok(())
    }
}
