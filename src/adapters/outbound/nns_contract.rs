//! NNS Contract Handle
//!
//! A [`RecordRegistry`] backed by one name-service contract reachable
//! through an [`RpcInvoker`]. The handle is immutable after construction:
//! connecting resolves and verifies the contract hash once, and every
//! lookup is a read-only invocation.

use crate::domain::entities::{ContractHash, RegistryRecord, RegistryRecordType};
use crate::domain::ports::{CallArg, RecordRegistry, RpcInvoker, StackItem};
use async_trait::async_trait;
use std::sync::Arc;

/// Items fetched per `traverseiterator` round trip.
const RECORD_BATCH: usize = 50;

/// Contract id the name service is deployed under when no explicit hash
/// is configured.
const NNS_CONTRACT_ID: i64 = 1;

pub struct NnsContract {
    invoker: Arc<dyn RpcInvoker>,
    hash: ContractHash,
    nns_domain: String,
}

impl NnsContract {
    /// Bind to a contract. With no explicit hash the well-known contract
    /// id is looked up; an explicit hash is verified to be deployed.
    pub async fn connect(
        invoker: Arc<dyn RpcInvoker>,
        hash: Option<ContractHash>,
        nns_domain: &str,
    ) -> anyhow::Result<Self> {
        let hash = match hash {
            None => invoker
                .contract_hash_by_id(NNS_CONTRACT_ID)
                .await
                .map_err(|e| anyhow::anyhow!("get contract by id {NNS_CONTRACT_ID}: {e}"))?,
            Some(h) => {
                invoker
                    .contract_exists(h)
                    .await
                    .map_err(|e| anyhow::anyhow!("get contract '{h}': {e}"))?;
                h
            }
        };

        Ok(Self {
            invoker,
            hash,
            nns_domain: nns_domain.trim_matches('.').to_string(),
        })
    }

    pub fn hash(&self) -> ContractHash {
        self.hash
    }

    fn type_arg(record_type: RegistryRecordType) -> CallArg {
        CallArg::Integer(record_type.code() as i64)
    }
}

fn strings_from_items(items: &[StackItem]) -> anyhow::Result<Vec<String>> {
    items
        .iter()
        .map(|item| Ok(String::from_utf8(item.as_bytes()?)?))
        .collect()
}

/// Decode one iterator item: a struct of at least (name, type, data).
fn record_from_item(item: &StackItem) -> anyhow::Result<RegistryRecord> {
    let StackItem::Array(fields) = item else {
        anyhow::bail!("registry record is not a struct");
    };
    if fields.len() != 4 {
        anyhow::bail!("registry record struct has {} fields, want 4", fields.len());
    }

    let name = String::from_utf8(fields[0].as_bytes()?)?;
    let type_code = fields[1].as_integer()?;
    let record_type = u16::try_from(type_code)
        .ok()
        .and_then(RegistryRecordType::from_code)
        .ok_or_else(|| anyhow::anyhow!("invalid registry record type {type_code}"))?;
    let data = String::from_utf8(fields[2].as_bytes()?)?;

    Ok(RegistryRecord {
        name,
        record_type,
        data,
    })
}

#[async_trait]
impl RecordRegistry for NnsContract {
    async fn resolve(
        &self,
        name: &str,
        record_type: RegistryRecordType,
    ) -> anyhow::Result<Vec<String>> {
        let outcome = self
            .invoker
            .call(
                self.hash,
                "resolve",
                vec![
                    CallArg::String(name.to_string()),
                    Self::type_arg(record_type),
                ],
            )
            .await?;

        match outcome.item()? {
            StackItem::Null => Ok(Vec::new()),
            StackItem::Array(items) => strings_from_items(items),
            other => anyhow::bail!("resolve returned {other:?}, want an array"),
        }
    }

    async fn get_records(
        &self,
        name: &str,
        record_type: RegistryRecordType,
    ) -> anyhow::Result<Vec<String>> {
        let outcome = self
            .invoker
            .call(
                self.hash,
                "getRecords",
                vec![
                    CallArg::String(name.to_string()),
                    Self::type_arg(record_type),
                ],
            )
            .await?;

        match outcome.item()? {
            StackItem::Array(items) => strings_from_items(items),
            other => anyhow::bail!("getRecords returned {other:?}, want an array"),
        }
    }

    async fn all_records(&self, name: &str) -> anyhow::Result<Vec<RegistryRecord>> {
        let outcome = self
            .invoker
            .call(
                self.hash,
                "getAllRecords",
                vec![CallArg::String(name.to_string())],
            )
            .await?;

        let session = outcome
            .session
            .clone()
            .ok_or_else(|| anyhow::anyhow!("getAllRecords returned no session"))?;
        let StackItem::Iterator { id } = outcome.item()? else {
            anyhow::bail!("getAllRecords did not return an iterator");
        };

        let mut records = Vec::new();
        loop {
            let batch = self
                .invoker
                .traverse_iterator(&session, id, RECORD_BATCH)
                .await?;

            for item in &batch {
                records.push(record_from_item(item)?);
            }

            if batch.len() < RECORD_BATCH {
                break;
            }
        }

        Ok(records)
    }

    fn prepare_name(&self, name: &str, dns_suffix: &str) -> String {
        let name = name.strip_suffix('.').unwrap_or(name);
        if self.nns_domain.is_empty() {
            return name.to_string();
        }

        let name = name.strip_suffix(dns_suffix).unwrap_or(name);
        let name = name.strip_suffix('.').unwrap_or(name);
        if name.is_empty() {
            self.nns_domain.clone()
        } else {
            format!("{}.{}", name, self.nns_domain)
        }
    }

    fn label(&self) -> String {
        self.hash.to_le_string()
    }
}
