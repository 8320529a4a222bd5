//! Health Probe Port
//!
//! A single liveness check against an endpoint address. Probes own their
//! timeouts; they run to completion or timeout and are never cancelled
//! from the DNS path.

use async_trait::async_trait;

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the endpoint once. `endpoint` is the textual IP taken from
    /// an answer record.
    async fn check(&self, endpoint: &str) -> bool;
}
