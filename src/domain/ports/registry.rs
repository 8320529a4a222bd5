//! Record Registry Port
//!
//! Contract-level record lookups used by the name resolver. One registry
//! corresponds to one configured contract.

use crate::domain::entities::{RegistryRecord, RegistryRecordType};
use async_trait::async_trait;

#[async_trait]
pub trait RecordRegistry: Send + Sync {
    /// Resolve `name` to the data strings stored under `record_type`,
    /// following any indirection the registry implements.
    async fn resolve(
        &self,
        name: &str,
        record_type: RegistryRecordType,
    ) -> anyhow::Result<Vec<String>>;

    /// Plain lookup of the records stored under `(name, record_type)`.
    async fn get_records(
        &self,
        name: &str,
        record_type: RegistryRecordType,
    ) -> anyhow::Result<Vec<String>>;

    /// Every record stored under `name` and its subdomains.
    async fn all_records(&self, name: &str) -> anyhow::Result<Vec<RegistryRecord>>;

    /// Translate a DNS query name into the registry's namespace: the
    /// configured DNS suffix is stripped and the registry's own domain
    /// suffix appended.
    fn prepare_name(&self, name: &str, dns_suffix: &str) -> String;

    /// Identifier used in log lines.
    fn label(&self) -> String;
}
