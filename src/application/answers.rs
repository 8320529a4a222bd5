//! Answer-Section Helpers
//!
//! Small guards shared by the response-shaping stages.

use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::{RData, Record, RecordType};
use std::net::IpAddr;

/// Whether a query is for address records, the only types the shaping
/// stages know how to rewrite.
pub fn is_address_query(req: &Message) -> bool {
    matches!(
        req.queries().first().map(|q| q.query_type()),
        Some(RecordType::A | RecordType::AAAA)
    )
}

/// Start a response to `req`: same id, opcode and question section.
pub fn reply_to(req: &Message) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(req.id())
        .set_message_type(MessageType::Response)
        .set_op_code(req.op_code())
        .set_recursion_desired(req.recursion_desired())
        .add_queries(req.queries().to_vec());
    reply
}

/// Endpoint address carried by an answer record, if it is an address
/// record.
pub fn endpoint_ip(record: &Record) -> Option<IpAddr> {
    match record.data() {
        Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
        Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
        _ => None,
    }
}
