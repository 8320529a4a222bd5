//! Integration tests for the NameResolver stage
//!
//! Exercises the real contract handle against a scripted RPC invoker:
//! resolution through the handler chain, fallthrough on failure, and
//! full-zone transfer with SOA bracketing.

mod common;

use async_trait::async_trait;
use common::{a_record, query, RecordingWriter, StaticAnswers};
use edgedns::adapters::outbound::NnsContract;
use edgedns::application::{NameResolver, TransferError};
use edgedns::domain::entities::ContractHash;
use edgedns::domain::ports::{
    CallArg, DnsHandler, InvokeOutcome, RecordRegistry, RpcInvoker, StackItem,
};
use hickory_proto::op::{Message, Query};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use std::str::FromStr;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const ZONE: &str = "containers.testnet.fs.neo.org";
const SOA_DATA: &str = "container admin@container 1641987592 3600 600 86400 3600";

fn sim_hash() -> ContractHash {
    ContractHash::from_le_hex("9c1f4bcbbcfd53dbe72bcff39ea43b5e1f4bd742").unwrap()
}

fn bytes(s: &str) -> StackItem {
    StackItem::ByteString(s.as_bytes().to_vec())
}

fn record_item(name: &str, type_code: u16, data: &str) -> StackItem {
    StackItem::Array(vec![
        bytes(name),
        StackItem::Integer(type_code as i64),
        bytes(data),
        StackItem::Integer(0),
    ])
}

/// Scripted RPC node: answers `resolve`/`getRecords` from a map and
/// serves `getAllRecords` through a session iterator.
#[derive(Default)]
struct ChainSim {
    resolve: HashMap<(String, i64), Vec<String>>,
    soa: Vec<String>,
    batches: Mutex<VecDeque<Vec<StackItem>>>,
    fail_calls: bool,
}

impl ChainSim {
    fn with_resolution(name: &str, type_code: i64, data: &[&str]) -> Self {
        let mut sim = Self::default();
        sim.resolve.insert(
            (name.to_string(), type_code),
            data.iter().map(|s| s.to_string()).collect(),
        );
        sim
    }

    fn with_zone(records: Vec<StackItem>) -> Self {
        Self {
            soa: vec![SOA_DATA.to_string()],
            batches: Mutex::new(VecDeque::from([records])),
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail_calls: true,
            ..Self::default()
        }
    }

    fn string_args(args: &[CallArg]) -> (String, i64) {
        let name = match args.first() {
            Some(CallArg::String(s)) => s.clone(),
            _ => String::new(),
        };
        let type_code = match args.get(1) {
            Some(CallArg::Integer(n)) => *n,
            _ => 0,
        };
        (name, type_code)
    }
}

#[async_trait]
impl RpcInvoker for ChainSim {
    async fn call(
        &self,
        _contract: ContractHash,
        method: &str,
        args: Vec<CallArg>,
    ) -> anyhow::Result<InvokeOutcome> {
        if self.fail_calls {
            anyhow::bail!("node unavailable");
        }

        let (name, type_code) = Self::string_args(&args);
        match method {
            "resolve" => {
                let stack = match self.resolve.get(&(name, type_code)) {
                    Some(data) => vec![StackItem::Array(
                        data.iter().map(|s| bytes(s)).collect(),
                    )],
                    None => vec![StackItem::Null],
                };
                Ok(InvokeOutcome {
                    stack,
                    session: None,
                })
            }
            "getRecords" => Ok(InvokeOutcome {
                stack: vec![StackItem::Array(
                    self.soa.iter().map(|s| bytes(s)).collect(),
                )],
                session: None,
            }),
            "getAllRecords" => Ok(InvokeOutcome {
                stack: vec![StackItem::Iterator { id: "it-1".into() }],
                session: Some("sess-1".into()),
            }),
            other => anyhow::bail!("unscripted method '{other}'"),
        }
    }

    async fn traverse_iterator(
        &self,
        _session: &str,
        _iterator: &str,
        _count: usize,
    ) -> anyhow::Result<Vec<StackItem>> {
        Ok(self.batches.lock().pop_front().unwrap_or_default())
    }

    async fn contract_hash_by_id(&self, _id: i64) -> anyhow::Result<ContractHash> {
        Ok(sim_hash())
    }

    async fn contract_exists(&self, _hash: ContractHash) -> anyhow::Result<()> {
        Ok(())
    }
}

async fn registry(sim: ChainSim, nns_domain: &str) -> Arc<dyn RecordRegistry> {
    Arc::new(
        NnsContract::connect(Arc::new(sim), Some(sim_hash()), nns_domain)
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn resolves_through_the_contract() {
    let sim = ChainSim::with_resolution("nicename.container", 1, &["10.0.0.7"]);
    let resolver =
        NameResolver::new(vec![registry(sim, "container").await], ZONE, None).unwrap();

    let mut writer = RecordingWriter::udp();
    let req = query(&format!("nicename.{ZONE}."), RecordType::A);
    resolver.handle(&mut writer, &req).await.unwrap();

    let answers = writer.answers();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].name().to_utf8(), format!("nicename.{ZONE}."));
    assert_eq!(answers[0].record_type(), RecordType::A);
    assert_eq!(answers[0].ttl(), 0);
    assert_eq!(answers[0].data().unwrap().to_string(), "10.0.0.7");
}

#[tokio::test]
async fn header_copies_query_class() {
    let sim = ChainSim::with_resolution("netmap", 16, &["0605a9623cb07b638fc6fe243bb7dc8bc50d30cd"]);
    let resolver = NameResolver::new(vec![registry(sim, "").await], ".", None).unwrap();

    let mut req = Message::new();
    req.set_id(4321);
    let mut q = Query::new();
    q.set_name(Name::from_str("netmap.").unwrap());
    q.set_query_type(RecordType::TXT);
    q.set_query_class(DNSClass::CH);
    req.add_query(q);

    let mut writer = RecordingWriter::udp();
    resolver.handle(&mut writer, &req).await.unwrap();

    let answers = writer.answers();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].dns_class(), DNSClass::CH);
    let Some(RData::TXT(txt)) = answers[0].data() else {
        panic!("expected a TXT answer");
    };
    assert_eq!(
        txt.txt_data()[0].as_ref(),
        b"0605a9623cb07b638fc6fe243bb7dc8bc50d30cd"
    );
}

#[tokio::test]
async fn failure_falls_through_to_next_handler() {
    let fallback: Arc<dyn DnsHandler> =
        Arc::new(StaticAnswers(vec![a_record("test.neofs.", "192.0.2.1")]));
    let resolver = NameResolver::new(
        vec![registry(ChainSim::failing(), "").await],
        ".",
        Some(fallback),
    )
    .unwrap();

    let mut writer = RecordingWriter::udp();
    resolver
        .handle(&mut writer, &query("test.neofs.", RecordType::A))
        .await
        .unwrap();

    assert_eq!(writer.answers().len(), 1);
    assert_eq!(
        writer.answers()[0].data().unwrap().to_string(),
        "192.0.2.1"
    );
}

#[tokio::test]
async fn transfer_emits_soa_bracketed_zone() {
    let sim = ChainSim::with_zone(vec![
        record_item("beta.container", 1, "10.0.0.2"),
        record_item("alpha.container", 1, "10.0.0.1"),
        record_item("container", 6, SOA_DATA),
        record_item("alpha.container", 16, "payload"),
    ]);
    let resolver =
        NameResolver::new(vec![registry(sim, "container").await], ZONE, None).unwrap();

    let mut rx = resolver.transfer(&format!("{ZONE}.")).await.unwrap();
    let records = rx.recv().await.unwrap();
    assert!(rx.recv().await.is_none());

    assert_eq!(records.len(), 5);
    let first = &records[0];
    let last = records.last().unwrap();
    assert_eq!(first.record_type(), RecordType::SOA);
    assert_eq!(first, last);

    // the mbox's '@' became a dot
    let rdata = first.data().unwrap().to_string();
    assert!(rdata.contains("admin.container."), "unexpected soa: {rdata}");

    // body sorted by owner then type
    assert_eq!(records[1].name().to_utf8(), "alpha.container.");
    assert_eq!(records[1].record_type(), RecordType::A);
    assert_eq!(records[2].record_type(), RecordType::TXT);
    assert_eq!(records[3].name().to_utf8(), "beta.container.");
}

#[tokio::test]
async fn transfer_refuses_foreign_zone() {
    let sim = ChainSim::default(); // no SOA anywhere
    let resolver =
        NameResolver::new(vec![registry(sim, "container").await], ZONE, None).unwrap();

    let err = resolver.transfer("elsewhere.org.").await.unwrap_err();
    assert!(matches!(err, TransferError::NotAuthoritative));
}
