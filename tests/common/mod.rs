//! Shared helpers for the pipeline integration tests.
#![allow(dead_code)] // each test binary uses its own subset

use async_trait::async_trait;
use edgedns::application::reply_to;
use edgedns::domain::ports::{DnsHandler, ResponseWriter};
use hickory_proto::op::{Message, Query};
use hickory_proto::rr::rdata::{A, AAAA, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Default transport peer used when a test does not pin one; its
/// location is deliberately absent from every test database.
pub const DEFAULT_REMOTE: &str = "10.240.0.1";

/// Response writer that records the message written to it.
pub struct RecordingWriter {
    remote: Option<IpAddr>,
    pub written: Option<Message>,
}

impl RecordingWriter {
    /// A UDP-flavoured writer with the default peer address.
    pub fn udp() -> Self {
        Self {
            remote: Some(DEFAULT_REMOTE.parse().unwrap()),
            written: None,
        }
    }

    pub fn with_remote(remote: &str) -> Self {
        Self {
            remote: Some(remote.parse().unwrap()),
            written: None,
        }
    }

    /// A writer for a transport with no IP peer.
    pub fn without_remote() -> Self {
        Self {
            remote: None,
            written: None,
        }
    }

    pub fn answers(&self) -> &[Record] {
        self.written.as_ref().expect("no message written").answers()
    }
}

#[async_trait]
impl ResponseWriter for RecordingWriter {
    fn remote_ip(&self) -> Option<IpAddr> {
        self.remote
    }

    async fn write_msg(&mut self, msg: Message) -> anyhow::Result<()> {
        self.written = Some(msg);
        Ok(())
    }
}

/// Terminal handler that answers every query with a fixed answer section.
pub struct StaticAnswers(pub Vec<Record>);

#[async_trait]
impl DnsHandler for StaticAnswers {
    async fn handle(&self, writer: &mut dyn ResponseWriter, req: &Message) -> anyhow::Result<()> {
        let mut reply = reply_to(req);
        reply.insert_answers(self.0.clone());
        writer.write_msg(reply).await
    }
}

pub fn query(name: &str, record_type: RecordType) -> Message {
    let mut msg = Message::new();
    msg.set_id(4321);
    let mut q = Query::new();
    q.set_name(Name::from_str(name).unwrap());
    q.set_query_type(record_type);
    msg.add_query(q);
    msg
}

pub fn aaaa_record(owner: &str, addr: &str) -> Record {
    let name = Name::from_str(owner).unwrap();
    let addr: Ipv6Addr = addr.parse().unwrap();
    Record::from_rdata(name, 0, RData::AAAA(AAAA::from(addr)))
}

pub fn a_record(owner: &str, addr: &str) -> Record {
    let name = Name::from_str(owner).unwrap();
    let addr: Ipv4Addr = addr.parse().unwrap();
    Record::from_rdata(name, 0, RData::A(A::from(addr)))
}

pub fn txt_record(owner: &str, text: &str) -> Record {
    let name = Name::from_str(owner).unwrap();
    Record::from_rdata(name, 0, RData::TXT(TXT::new(vec![text.to_string()])))
}

/// The endpoint addresses of an answer section, in order.
pub fn endpoints(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(edgedns::application::endpoint_ip)
        .map(|ip| ip.to_string())
        .collect()
}
