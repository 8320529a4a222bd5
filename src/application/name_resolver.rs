//! NameResolver Stage
//!
//! Answers queries from one or more registry contracts. Contracts are
//! consulted in configured order and the last one that resolves without
//! error wins; only when every contract fails is the query handed to the
//! next handler. The stage also implements full-zone transfer over the
//! first contract's zone.

use crate::application::answers::reply_to;
use crate::domain::entities::RegistryRecordType;
use crate::domain::ports::{DnsHandler, RecordRegistry, ResponseWriter};
use async_trait::async_trait;
use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME, SOA, TXT};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The first contract holds no SOA for the requested zone.
    #[error("not authoritative for zone")]
    NotAuthoritative,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct NameResolver {
    next: Option<Arc<dyn DnsHandler>>,
    contracts: Vec<Arc<dyn RecordRegistry>>,
    dns_zone: String,
}

impl NameResolver {
    /// `dns_zone` is the DNS suffix the stage is mounted under; it is
    /// stripped from query names before they reach the registries.
    pub fn new(
        contracts: Vec<Arc<dyn RecordRegistry>>,
        dns_zone: &str,
        next: Option<Arc<dyn DnsHandler>>,
    ) -> anyhow::Result<Self> {
        if contracts.is_empty() {
            anyhow::bail!("at least one registry contract is required");
        }
        Ok(Self {
            next,
            contracts,
            dns_zone: dns_zone.trim_matches('.').to_string(),
        })
    }

    async fn resolve_records(&self, query: &Query) -> Option<Vec<Record>> {
        let qname = query.name().to_utf8();
        let Some(record_type) = registry_type(query.query_type()) else {
            tracing::warn!(
                "cannot resolve '{qname}': unsupported record type {}",
                query.query_type()
            );
            return None;
        };

        let mut result = None;
        for contract in &self.contracts {
            let prepared = contract.prepare_name(&qname, &self.dns_zone);
            let resolved = match contract.resolve(&prepared, record_type).await {
                Ok(data) => build_answer_records(query, &data),
                Err(e) => Err(e),
            };
            match resolved {
                Ok(records) => result = Some(records),
                Err(e) => tracing::warn!(
                    "cannot resolve '{qname}' (type {record_type}) as '{prepared}' \
                     in contract '{}': {e}",
                    contract.label()
                ),
            }
        }

        result
    }

    /// Start a zone transfer. The answer is produced asynchronously: one
    /// batch of records is written to the returned channel, then the
    /// channel closes. Assembly failures after the authority check are
    /// logged and close the channel without a batch.
    pub async fn transfer(&self, zone: &str) -> Result<mpsc::Receiver<Vec<Record>>, TransferError> {
        let first = &self.contracts[0];
        let trimmed = first.prepare_name(zone, &self.dns_zone);

        let soa = first
            .get_records(&trimmed, RegistryRecordType::Soa)
            .await
            .map_err(|e| {
                tracing::warn!("couldn't transfer zone '{zone}' as '{trimmed}': {e}");
                TransferError::NotAuthoritative
            })?;
        if soa.is_empty() {
            return Err(TransferError::NotAuthoritative);
        }

        let (tx, rx) = mpsc::channel(1);
        let contracts = self.contracts.clone();
        let dns_zone = self.dns_zone.clone();
        let zone = zone.to_string();

        tokio::spawn(async move {
            match assemble_zone(&contracts, &zone, &dns_zone).await {
                Ok(records) => {
                    let _ = tx.send(records).await;
                }
                Err(e) => tracing::warn!("couldn't transfer zone '{zone}': {e}"),
            }
        });

        Ok(rx)
    }
}

#[async_trait]
impl DnsHandler for NameResolver {
    async fn handle(&self, writer: &mut dyn ResponseWriter, req: &Message) -> anyhow::Result<()> {
        let answers = match req.queries().first() {
            Some(query) => self.resolve_records(query).await,
            None => None,
        };

        match answers {
            Some(answers) => {
                let mut reply = reply_to(req);
                reply.insert_answers(answers);
                writer.write_msg(reply).await
            }
            None => match &self.next {
                Some(next) => next.handle(writer, req).await,
                None => {
                    let mut reply = reply_to(req);
                    reply.set_response_code(ResponseCode::ServFail);
                    writer.write_msg(reply).await
                }
            },
        }
    }
}

fn registry_type(qtype: RecordType) -> Option<RegistryRecordType> {
    match qtype {
        RecordType::A => Some(RegistryRecordType::A),
        RecordType::AAAA => Some(RegistryRecordType::Aaaa),
        RecordType::TXT => Some(RegistryRecordType::Txt),
        RecordType::CNAME => Some(RegistryRecordType::Cname),
        RecordType::SOA => Some(RegistryRecordType::Soa),
        _ => None,
    }
}

/// Build answer records whose header copies the query's name, type and
/// class, with TTL 0, and whose rdata comes from the registry strings.
fn build_answer_records(query: &Query, resolved: &[String]) -> anyhow::Result<Vec<Record>> {
    let name = query.name().clone();
    resolved
        .iter()
        .map(|data| {
            let rdata = registry_rdata(query.query_type(), data)?;
            let mut record = Record::from_rdata(name.clone(), 0, rdata);
            record.set_dns_class(query.query_class());
            Ok(record)
        })
        .collect()
}

fn registry_rdata(qtype: RecordType, data: &str) -> anyhow::Result<RData> {
    match qtype {
        RecordType::TXT => Ok(RData::TXT(TXT::new(vec![data.to_string()]))),
        RecordType::A => {
            let addr: Ipv4Addr = data
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid A record data '{data}'"))?;
            Ok(RData::A(A::from(addr)))
        }
        RecordType::AAAA => {
            let addr: Ipv6Addr = data
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid AAAA record data '{data}'"))?;
            Ok(RData::AAAA(AAAA::from(addr)))
        }
        RecordType::CNAME => Ok(RData::CNAME(CNAME(Name::from_str(data)?))),
        RecordType::SOA => {
            let (_, soa) = parse_soa_data(data)?;
            Ok(RData::SOA(soa))
        }
        other => anyhow::bail!("unsupported record type: {other}"),
    }
}

/// Records accumulated for one `(owner, type)` pair of the zone.
struct ZoneEntry {
    name: String,
    record_type: RegistryRecordType,
    data: Vec<String>,
}

type ZoneMap = HashMap<(String, RegistryRecordType), ZoneEntry>;

async fn assemble_zone(
    contracts: &[Arc<dyn RecordRegistry>],
    zone: &str,
    dns_zone: &str,
) -> anyhow::Result<Vec<Record>> {
    let mut merged: ZoneMap = HashMap::new();

    for (i, contract) in contracts.iter().enumerate() {
        match gather_contract(contract.as_ref(), zone, dns_zone, i == 0).await {
            Ok(map) => merged.extend(map),
            Err(e) => tracing::warn!(
                "get all records in contract '{}': {e}",
                contract.label()
            ),
        }
    }

    form_zone_transfer(merged)
}

/// Fetch and group every record one contract holds for the zone. The
/// first contract must hold exactly one SOA for the zone apex.
async fn gather_contract(
    contract: &dyn RecordRegistry,
    zone: &str,
    dns_zone: &str,
    need_soa: bool,
) -> anyhow::Result<ZoneMap> {
    let name = contract.prepare_name(zone, dns_zone);
    let records = contract.all_records(&name).await?;

    let mut map: ZoneMap = HashMap::new();
    for record in records {
        let owner = append_root(&record.name);
        map.entry((owner.clone(), record.record_type))
            .or_insert_with(|| ZoneEntry {
                name: owner,
                record_type: record.record_type,
                data: Vec::new(),
            })
            .data
            .push(record.data);
    }

    if need_soa {
        let apex = (append_root(&name), RegistryRecordType::Soa);
        let count = map.get(&apex).map(|e| e.data.len()).unwrap_or(0);
        if count != 1 {
            anyhow::bail!("invalid number of soa records: {count}");
        }
    }

    Ok(map)
}

/// Order the zone by owner name then type and frame it with the SOA as
/// both the first and the last record.
fn form_zone_transfer(map: ZoneMap) -> anyhow::Result<Vec<Record>> {
    if map.is_empty() {
        anyhow::bail!("records must not be empty");
    }

    let mut entries: Vec<ZoneEntry> = map.into_values().collect();
    entries.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then(a.record_type.cmp(&b.record_type))
    });

    let mut soa_record = None;
    let mut body = Vec::new();

    for entry in entries {
        if entry.record_type == RegistryRecordType::Soa {
            soa_record = Some(parse_soa_entry(&entry)?);
            continue;
        }

        for data in &entry.data {
            body.push(zone_record(&entry, data)?);
        }
    }

    let soa = soa_record.ok_or_else(|| anyhow::anyhow!("zone carries no soa record"))?;

    let mut results = Vec::with_capacity(body.len() + 2);
    results.push(soa.clone());
    results.extend(body);
    results.push(soa);
    Ok(results)
}

fn zone_record(entry: &ZoneEntry, data: &str) -> anyhow::Result<Record> {
    let qtype = RecordType::from(entry.record_type.code());
    let rdata = registry_rdata(qtype, data)?;
    let mut record = Record::from_rdata(Name::from_str(&entry.name)?, 0, rdata);
    record.set_dns_class(DNSClass::IN);
    Ok(record)
}

fn parse_soa_entry(entry: &ZoneEntry) -> anyhow::Result<Record> {
    if entry.data.len() != 1 {
        anyhow::bail!("invalid len for soa record");
    }

    let (ns, soa) = parse_soa_data(&entry.data[0])?;
    if entry.name != ns {
        anyhow::bail!("invalid soa record, mismatched names: {} {}", entry.name, ns);
    }

    let minttl = soa.minimum();
    let mut record = Record::from_rdata(Name::from_str(&ns)?, minttl, RData::SOA(soa));
    record.set_dns_class(DNSClass::IN);
    Ok(record)
}

/// Decode the space-separated SOA septuple
/// `<ns> <mbox> <serial> <refresh> <retry> <expire> <minttl>`. Serials
/// longer than ten digits are truncated to ten, which accommodates
/// second-precision timestamp serials. Returns the normalised primary
/// name alongside the rdata.
fn parse_soa_data(data: &str) -> anyhow::Result<(String, SOA)> {
    let fields: Vec<&str> = data.split(' ').collect();
    if fields.len() != 7 {
        anyhow::bail!("invalid soa record: {data}");
    }

    let ns = append_root(fields[0]);
    let mbox = append_root(fields[1]).replace('@', ".");

    let serial_digits = fields[2].len().min(10);
    let serial = parse_u32(fields[2].get(..serial_digits).unwrap_or(fields[2]))
        .map_err(|_| anyhow::anyhow!("invalid soa record, invalid serial: {}", fields[2]))?;
    let refresh = parse_u32(fields[3])
        .map_err(|_| anyhow::anyhow!("invalid soa record, invalid refresh: {}", fields[3]))?;
    let retry = parse_u32(fields[4])
        .map_err(|_| anyhow::anyhow!("invalid soa record, invalid retry: {}", fields[4]))?;
    let expire = parse_u32(fields[5])
        .map_err(|_| anyhow::anyhow!("invalid soa record, invalid expire: {}", fields[5]))?;
    let minttl = parse_u32(fields[6])
        .map_err(|_| anyhow::anyhow!("invalid soa record, invalid ttl: {}", fields[6]))?;

    let soa = SOA::new(
        Name::from_str(&ns)?,
        Name::from_str(&mbox)?,
        serial,
        refresh as i32,
        retry as i32,
        expire as i32,
        minttl,
    );
    Ok((ns, soa))
}

fn parse_u32(data: &str) -> Result<u32, std::num::ParseIntError> {
    data.parse()
}

fn append_root(data: &str) -> String {
    if !data.is_empty() && !data.ends_with('.') {
        format!("{data}.")
    } else {
        data.to_string()
    }
}
