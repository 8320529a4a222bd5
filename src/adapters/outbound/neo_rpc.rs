//! Neo JSON-RPC Invoker
//!
//! Implements [`RpcInvoker`] against a Neo N3 node: `invokefunction` for
//! read-only calls, `traverseiterator` for session iterators and
//! `getcontractstate` for deployment checks. Only the slice of the wire
//! protocol the registry needs is modelled.

use crate::domain::entities::ContractHash;
use crate::domain::ports::{CallArg, InvokeOutcome, RpcInvoker, StackItem};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, serde::Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// JSON-RPC client for a single node endpoint.
pub struct NeoRpcClient {
    endpoint: String,
    client: reqwest::Client,
    request_id: AtomicU64,
}

impl NeoRpcClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            request_id: AtomicU64::new(1),
        }
    }

    async fn rpc(&self, method: &'static str, params: Value) -> anyhow::Result<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("rpc http status {}", response.status());
        }

        let body: JsonRpcResponse = response.json().await?;
        if let Some(err) = body.error {
            anyhow::bail!("rpc error {}: {}", err.code, err.message);
        }
        body.result
            .ok_or_else(|| anyhow::anyhow!("rpc response carried no result"))
    }
}

fn hash_param(hash: ContractHash) -> String {
    format!("0x{}", hash.to_le_string())
}

fn encode_arg(arg: &CallArg) -> Value {
    match arg {
        CallArg::String(s) => json!({ "type": "String", "value": s }),
        CallArg::Integer(n) => json!({ "type": "Integer", "value": n.to_string() }),
    }
}

fn parse_stack_item(value: &Value) -> anyhow::Result<StackItem> {
    let item_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("stack item without type: {value}"))?;

    match item_type {
        "Any" => Ok(StackItem::Null),
        "Boolean" => {
            let b = value
                .get("value")
                .and_then(Value::as_bool)
                .ok_or_else(|| anyhow::anyhow!("boolean item without value"))?;
            Ok(StackItem::Bool(b))
        }
        "Integer" => {
            let raw = value
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("integer item without value"))?;
            Ok(StackItem::Integer(raw.parse()?))
        }
        "ByteString" | "Buffer" => {
            let raw = value
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("byte item without value"))?;
            Ok(StackItem::ByteString(BASE64.decode(raw)?))
        }
        "Array" | "Struct" => {
            let children = value
                .get("value")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow::anyhow!("array item without value"))?;
            let items = children
                .iter()
                .map(parse_stack_item)
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(StackItem::Array(items))
        }
        "InteropInterface" => {
            let id = value
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("interop item without iterator id"))?;
            Ok(StackItem::Iterator { id: id.to_string() })
        }
        other => anyhow::bail!("unsupported stack item type '{other}'"),
    }
}

/// Interpret an `invokefunction` result: the VM must have halted cleanly,
/// otherwise the exception is surfaced as the error.
fn parse_invoke_result(result: &Value) -> anyhow::Result<InvokeOutcome> {
    let state = result.get("state").and_then(Value::as_str).unwrap_or("");
    if state != "HALT" {
        let exception = result
            .get("exception")
            .and_then(Value::as_str)
            .unwrap_or("unknown failure");
        anyhow::bail!("invocation faulted ({state}): {exception}");
    }

    let stack = result
        .get("stack")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(parse_stack_item).collect())
        .transpose()?
        .unwrap_or_default();

    let session = result
        .get("session")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(InvokeOutcome { stack, session })
}

#[async_trait]
impl RpcInvoker for NeoRpcClient {
    async fn call(
        &self,
        contract: ContractHash,
        method: &str,
        args: Vec<CallArg>,
    ) -> anyhow::Result<InvokeOutcome> {
        let encoded: Vec<Value> = args.iter().map(encode_arg).collect();
        let params = json!([hash_param(contract), method, encoded]);
        let result = self.rpc("invokefunction", params).await?;
        parse_invoke_result(&result)
    }

    async fn traverse_iterator(
        &self,
        session: &str,
        iterator: &str,
        count: usize,
    ) -> anyhow::Result<Vec<StackItem>> {
        let result = self
            .rpc("traverseiterator", json!([session, iterator, count]))
            .await?;
        result
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("traverseiterator returned a non-array"))?
            .iter()
            .map(parse_stack_item)
            .collect()
    }

    async fn contract_hash_by_id(&self, id: i64) -> anyhow::Result<ContractHash> {
        let result = self.rpc("getcontractstate", json!([id])).await?;
        let hash = result
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("contract state carried no hash"))?;
        ContractHash::from_le_hex(hash)
    }

    async fn contract_exists(&self, hash: ContractHash) -> anyhow::Result<()> {
        self.rpc("getcontractstate", json!([hash_param(hash)]))
            .await
            .map(|_| ())
    }
}
