//! HealthFilter Stage
//!
//! Drops address records whose endpoints currently fail their health
//! probes. Only records whose owner name matches one of the configured
//! filters take part; everything else passes through untouched.
//!
//! An endpoint seen for the first time is admitted optimistically: it is
//! cached, probed, and still included in the response that introduced it.
//! Later sightings consult the cached health bit.

use crate::application::answers::{endpoint_ip, is_address_query};
use crate::domain::ports::{DnsHandler, HealthProbe, ResponseWriter};
use crate::domain::services::{match_any, NameFilter};
use crate::infrastructure::ProbeCache;
use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::Record;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Endpoint health bookkeeping shared by every request of the stage.
pub struct EndpointHealth {
    filters: Vec<NameFilter>,
    cache: ProbeCache,
}

impl EndpointHealth {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        capacity: usize,
        interval: Duration,
        filters: Vec<NameFilter>,
    ) -> anyhow::Result<Self> {
        if filters.is_empty() {
            anyhow::bail!("filters must not be empty");
        }
        Ok(Self {
            filters,
            cache: ProbeCache::new(probe, capacity, interval)?,
        })
    }

    /// Apply the health policy to an answer section.
    pub async fn filter_records(&self, records: Vec<Record>) -> Vec<Record> {
        let mut result = Vec::with_capacity(records.len());

        for record in records {
            if match_any(&self.filters, &record.name().to_utf8()) {
                let Some(endpoint) = endpoint_ip(&record) else {
                    tracing::warn!("record will be ignored: not an address record: {record}");
                    continue;
                };
                let key = endpoint.to_string();

                if let Some(healthy) = self.cache.health(&key) {
                    if healthy {
                        result.push(record);
                    }
                    continue;
                }

                self.cache.admit(&key).await;
                tracing::debug!("record '{record}' will be cached");
            }
            result.push(record);
        }

        result
    }

    /// Number of endpoints currently tracked, for observability.
    pub fn tracked_endpoints(&self) -> usize {
        self.cache.len()
    }
}

/// The pipeline stage: installs a filtering writer for address queries.
pub struct HealthFilter {
    next: Arc<dyn DnsHandler>,
    health: Arc<EndpointHealth>,
}

impl HealthFilter {
    pub fn new(next: Arc<dyn DnsHandler>, health: Arc<EndpointHealth>) -> Self {
        Self { next, health }
    }
}

#[async_trait]
impl DnsHandler for HealthFilter {
    async fn handle(&self, writer: &mut dyn ResponseWriter, req: &Message) -> anyhow::Result<()> {
        if !is_address_query(req) {
            tracing::debug!("unsupported query type, nothing to filter");
            return self.next.handle(writer, req).await;
        }

        let mut filtering = FilteringWriter {
            inner: writer,
            health: &self.health,
        };
        self.next.handle(&mut filtering, req).await
    }
}

struct FilteringWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    health: &'a EndpointHealth,
}

#[async_trait]
impl ResponseWriter for FilteringWriter<'_> {
    fn remote_ip(&self) -> Option<IpAddr> {
        self.inner.remote_ip()
    }

    async fn write_msg(&mut self, mut msg: Message) -> anyhow::Result<()> {
        if msg.answers().is_empty() {
            tracing::debug!("answer is empty, nothing to filter");
            return self.inner.write_msg(msg).await;
        }

        let answers = self.health.filter_records(msg.take_answers()).await;
        if answers.is_empty() {
            let qname = msg
                .queries()
                .first()
                .map(|q| q.name().to_utf8())
                .unwrap_or_default();
            tracing::warn!("no answer returned: couldn't resolve {qname}: no healthy IPs");
        }
        msg.insert_answers(answers);

        self.inner.write_msg(msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata::{A, TXT};
    use hickory_proto::rr::{Name, RData};
    use std::net::Ipv4Addr;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FixedProbe(AtomicBool);

    impl FixedProbe {
        fn verdict(v: bool) -> Arc<Self> {
            Arc::new(Self(AtomicBool::new(v)))
        }
    }

    #[async_trait]
    impl HealthProbe for FixedProbe {
        async fn check(&self, _endpoint: &str) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn a_record(owner: &str, addr: &str) -> Record {
        let name = Name::from_str(owner).unwrap();
        let addr: Ipv4Addr = addr.parse().unwrap();
        Record::from_rdata(name, 0, RData::A(A::from(addr)))
    }

    fn txt_record(owner: &str) -> Record {
        let name = Name::from_str(owner).unwrap();
        Record::from_rdata(name, 0, RData::TXT(TXT::new(vec!["x".to_string()])))
    }

    fn health_with(probe: Arc<dyn HealthProbe>, filters: Vec<NameFilter>) -> EndpointHealth {
        EndpointHealth::new(probe, 8, Duration::from_secs(60), filters).unwrap()
    }

    #[test]
    fn test_filters_must_not_be_empty() {
        let result = EndpointHealth::new(
            FixedProbe::verdict(true),
            8,
            Duration::from_secs(60),
            vec![],
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_non_matching_names_pass_through() {
        let health = health_with(FixedProbe::verdict(false), vec![NameFilter::exact("watched")]);

        let records = vec![a_record("other.example.", "10.0.0.1")];
        let kept = health.filter_records(records).await;
        assert_eq!(kept.len(), 1);
        assert_eq!(health.tracked_endpoints(), 0);
    }

    #[tokio::test]
    async fn test_first_sighting_is_optimistic() {
        let health = health_with(
            FixedProbe::verdict(false),
            vec![NameFilter::exact("watched.example")],
        );

        let records = vec![a_record("watched.example.", "10.0.0.1")];
        let kept = health.filter_records(records).await;
        // included even though the initial probe said unhealthy
        assert_eq!(kept.len(), 1);
        assert_eq!(health.tracked_endpoints(), 1);
    }

    #[tokio::test]
    async fn test_unhealthy_endpoint_dropped_on_second_sighting() {
        let health = health_with(
            FixedProbe::verdict(false),
            vec![NameFilter::exact("watched.example")],
        );

        let make = || vec![a_record("watched.example.", "10.0.0.1")];
        health.filter_records(make()).await;
        let kept = health.filter_records(make()).await;
        assert!(kept.is_empty());
    }

    #[tokio::test]
    async fn test_healthy_endpoint_survives() {
        let health = health_with(
            FixedProbe::verdict(true),
            vec![NameFilter::pattern(r".*\.example").unwrap()],
        );

        let make = || vec![a_record("watched.example.", "10.0.0.1")];
        health.filter_records(make()).await;
        let kept = health.filter_records(make()).await;
        assert_eq!(kept.len(), 1);
    }

    #[tokio::test]
    async fn test_matching_non_address_record_is_dropped() {
        let health = health_with(
            FixedProbe::verdict(true),
            vec![NameFilter::exact("watched.example")],
        );

        let records = vec![
            txt_record("watched.example."),
            a_record("watched.example.", "10.0.0.1"),
        ];
        let kept = health.filter_records(records).await;
        assert_eq!(kept.len(), 1);
    }
}
