//! GeoSort Stage
//!
//! Reorders the answer section so that the endpoints closest to the
//! client come first, and truncates it to a configured maximum. The stage
//! wraps the response writer and rewrites the message when the downstream
//! handler writes it.
//!
//! The client position is taken from the EDNS0 Client Subnet option when
//! the query carries one, otherwise from the transport peer address.

use crate::application::answers::{endpoint_ip, is_address_query};
use crate::domain::entities::DistanceInfo;
use crate::domain::ports::{DnsHandler, GeoReader, ResponseWriter};
use crate::domain::services::{distance_between, select_closest};
use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};
use hickory_proto::rr::Record;
use std::net::IpAddr;
use std::sync::Arc;

/// Distance ranking shared by every request of the stage.
pub struct GeoRanker {
    reader: Arc<dyn GeoReader>,
    max_records: usize,
}

impl GeoRanker {
    /// `max_records` must be positive.
    pub fn new(reader: Arc<dyn GeoReader>, max_records: usize) -> anyhow::Result<Self> {
        if max_records == 0 {
            anyhow::bail!("max records must be positive");
        }
        Ok(Self {
            reader,
            max_records,
        })
    }

    /// Rewrite an answer section for the given client.
    fn shape(&self, client: Option<IpAddr>, answers: Vec<Record>) -> Vec<Record> {
        let client_info = client
            .map(|ip| self.reader.ip_info(ip))
            .unwrap_or_default();

        if client_info.is_empty() {
            tracing::warn!("couldn't get location of client {client:?} from db");
            let mut answers = answers;
            answers.truncate(self.max_records);
            return answers;
        }

        let mut ranked = Vec::with_capacity(answers.len());
        for record in answers {
            let Some(endpoint) = endpoint_ip(&record) else {
                tracing::warn!("couldn't get an endpoint: wrong record type: {record}");
                continue;
            };

            let endpoint_info = self.reader.ip_info(endpoint);
            let distance = if endpoint_info.is_empty() {
                tracing::debug!("couldn't get location of endpoint {endpoint} from db");
                DistanceInfo::unknown()
            } else {
                distance_between(&client_info, &endpoint_info)
            };

            ranked.push((record, distance));
        }

        select_closest(ranked, self.max_records)
    }
}

/// The pipeline stage: installs a sorting writer for address queries.
pub struct GeoSort {
    next: Arc<dyn DnsHandler>,
    ranker: Arc<GeoRanker>,
}

impl GeoSort {
    pub fn new(next: Arc<dyn DnsHandler>, ranker: Arc<GeoRanker>) -> Self {
        Self { next, ranker }
    }
}

#[async_trait]
impl DnsHandler for GeoSort {
    async fn handle(&self, writer: &mut dyn ResponseWriter, req: &Message) -> anyhow::Result<()> {
        if !is_address_query(req) {
            tracing::debug!("unsupported query type, nothing to sort");
            return self.next.handle(writer, req).await;
        }

        let client = client_subnet(req).or_else(|| writer.remote_ip());

        let mut sorting = SortingWriter {
            inner: writer,
            ranker: &self.ranker,
            client,
        };
        self.next.handle(&mut sorting, req).await
    }
}

struct SortingWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    ranker: &'a GeoRanker,
    client: Option<IpAddr>,
}

#[async_trait]
impl ResponseWriter for SortingWriter<'_> {
    fn remote_ip(&self) -> Option<IpAddr> {
        self.inner.remote_ip()
    }

    async fn write_msg(&mut self, mut msg: Message) -> anyhow::Result<()> {
        if msg.answers().is_empty() {
            tracing::debug!("answer is empty, nothing to sort");
            return self.inner.write_msg(msg).await;
        }

        let answers = msg.take_answers();
        let answers = self.ranker.shape(self.client, answers);
        msg.insert_answers(answers);
        self.inner.write_msg(msg).await
    }
}

/// Client address from the EDNS0 Client Subnet option, if present and
/// non-empty.
fn client_subnet(req: &Message) -> Option<IpAddr> {
    let edns = req.extensions().as_ref()?;
    let option = edns.options().get(EdnsCode::Subnet)?;
    let EdnsOption::Unknown(_, data) = option else {
        return None;
    };
    parse_client_subnet(data)
}

/// Wire layout of the option: family (2 bytes), source prefix length,
/// scope prefix length, then the (possibly truncated) address.
fn parse_client_subnet(data: &[u8]) -> Option<IpAddr> {
    if data.len() < 4 {
        return None;
    }
    let family = u16::from_be_bytes([data[0], data[1]]);
    let addr = &data[4..];
    if addr.is_empty() {
        return None;
    }

    match family {
        1 if addr.len() <= 4 => {
            let mut octets = [0u8; 4];
            octets[..addr.len()].copy_from_slice(addr);
            Some(IpAddr::from(octets))
        }
        2 if addr.len() <= 16 => {
            let mut octets = [0u8; 16];
            octets[..addr.len()].copy_from_slice(addr);
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}
