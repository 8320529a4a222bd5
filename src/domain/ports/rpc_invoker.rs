//! Chain RPC Invoker Port
//!
//! The slice of the blockchain RPC surface the registry contract needs:
//! read-only contract invocation, session-iterator traversal and contract
//! state queries. The wire client behind it is an adapter concern.

use crate::domain::entities::ContractHash;
use async_trait::async_trait;

/// Argument to a contract method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    String(String),
    Integer(i64),
}

/// A value on the VM evaluation stack, as returned by the RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackItem {
    Null,
    Bool(bool),
    Integer(i64),
    ByteString(Vec<u8>),
    Array(Vec<StackItem>),
    /// Server-side iterator handle; traversed via the session it came with
    Iterator { id: String },
}

impl StackItem {
    /// Byte representation of the item, if it has one.
    pub fn as_bytes(&self) -> anyhow::Result<Vec<u8>> {
        match self {
            StackItem::ByteString(b) => Ok(b.clone()),
            StackItem::Integer(n) => Ok(n.to_string().into_bytes()),
            other => anyhow::bail!("stack item {:?} has no byte representation", other),
        }
    }

    pub fn as_integer(&self) -> anyhow::Result<i64> {
        match self {
            StackItem::Integer(n) => Ok(*n),
            other => anyhow::bail!("stack item {:?} is not an integer", other),
        }
    }
}

/// Result of a read-only invocation.
#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    /// Evaluation stack after the call; the first item is the return value
    pub stack: Vec<StackItem>,
    /// Session for traversing any iterator items on the stack
    pub session: Option<String>,
}

impl InvokeOutcome {
    /// The call's return value.
    pub fn item(&self) -> anyhow::Result<&StackItem> {
        self.stack
            .first()
            .ok_or_else(|| anyhow::anyhow!("empty result stack"))
    }
}

#[async_trait]
pub trait RpcInvoker: Send + Sync {
    /// Invoke a contract method read-only. Implementations fail the call
    /// when the VM did not halt cleanly.
    async fn call(
        &self,
        contract: ContractHash,
        method: &str,
        args: Vec<CallArg>,
    ) -> anyhow::Result<InvokeOutcome>;

    /// Fetch up to `count` items from a server-side iterator.
    async fn traverse_iterator(
        &self,
        session: &str,
        iterator: &str,
        count: usize,
    ) -> anyhow::Result<Vec<StackItem>>;

    /// Hash of the native contract deployed under `id`.
    async fn contract_hash_by_id(&self, id: i64) -> anyhow::Result<ContractHash>;

    /// Verify that a contract with the given hash is deployed.
    async fn contract_exists(&self, hash: ContractHash) -> anyhow::Result<()>;
}
