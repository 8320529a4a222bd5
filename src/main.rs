//! edgedns - Response-shaping DNS pipeline
//!
//! This is the composition root that wires the configured stages into a
//! handler chain and serves it.

use edgedns::adapters::inbound::{DnsServer, Refuser};
use edgedns::adapters::outbound::{
    HttpProbe, HttpProbeParams, IcmpProbe, IcmpProbeParams, MaxMindGeoReader, NeoRpcClient,
    NnsContract,
};
use edgedns::application::{EndpointHealth, GeoRanker, GeoSort, HealthFilter, NameResolver};
use edgedns::config::{self, ProbeMethod};
use edgedns::domain::ports::{DnsHandler, HealthProbe, RecordRegistry, RpcInvoker};
use edgedns::domain::services::NameFilter;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;

    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!("starting edgedns listen={} zone={}", cfg.listen_addr, cfg.zone);

    // ===== COMPOSITION ROOT =====
    // The chain is assembled innermost-first: the resolver answers,
    // the health filter prunes, the geo sorter ranks and truncates.

    let mut transfer = None;
    let mut chain: Arc<dyn DnsHandler> = if cfg.contracts.is_empty() {
        Arc::new(Refuser)
    } else {
        let mut contracts: Vec<Arc<dyn RecordRegistry>> = Vec::with_capacity(cfg.contracts.len());
        for prm in &cfg.contracts {
            let invoker: Arc<dyn RpcInvoker> = Arc::new(NeoRpcClient::new(prm.endpoint.clone()));
            let contract = NnsContract::connect(invoker, prm.hash, &prm.nns_domain).await?;
            tracing::info!(
                "registry contract '{}' via {}",
                contract.hash(),
                prm.endpoint
            );
            contracts.push(Arc::new(contract));
        }

        let resolver = Arc::new(NameResolver::new(contracts, &cfg.zone, None)?);
        transfer = Some(Arc::clone(&resolver));
        resolver
    };

    if let Some(prm) = &cfg.health {
        let probe: Arc<dyn HealthProbe> = match prm.method {
            ProbeMethod::Http => Arc::new(HttpProbe::new(HttpProbeParams {
                port: prm.port,
                timeout: prm.timeout,
                scheme: prm.scheme.clone(),
            })?),
            ProbeMethod::Icmp => Arc::new(IcmpProbe::new(IcmpProbeParams {
                privileged: prm.privileged,
                timeout: prm.timeout,
            })),
        };

        let mut filters = Vec::with_capacity(prm.filters.len());
        for spec in &prm.filters {
            filters.push(match spec {
                config::FilterSpec::Origin => NameFilter::exact(cfg.zone.clone()),
                config::FilterSpec::Pattern(p) => NameFilter::pattern(p)?,
            });
        }

        let health = EndpointHealth::new(probe, prm.cache_size, prm.interval, filters)?;
        chain = Arc::new(HealthFilter::new(chain, Arc::new(health)));
        tracing::info!(
            "health filtering enabled: cache={} interval={:?}",
            prm.cache_size,
            prm.interval
        );
    }

    if let Some(prm) = &cfg.geo {
        let reader = MaxMindGeoReader::open_dir(&prm.db_dir)?;
        let ranker = GeoRanker::new(Arc::new(reader), prm.max_records)?;
        chain = Arc::new(GeoSort::new(chain, Arc::new(ranker)));
        tracing::info!("geo sorting enabled: max_records={}", prm.max_records);
    }

    DnsServer::new(cfg.listen_addr, chain, transfer).run().await
}
