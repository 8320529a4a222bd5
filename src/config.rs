//! Configuration
//!
//! The pipeline is configured by a directive file: one directive per
//! line, with an optional `{ … }` block of key/value options. A malformed
//! directive refuses startup. The file path comes from the first argument
//! or `EDGEDNS_CONFIG`; the listen address and debug switch can also be
//! set from the environment.
//!
//! ```text
//! listen 127.0.0.1:5353
//! zone containers.testnet.fs.neo.org
//!
//! geodns /var/lib/geoip 2
//!
//! healthchecker http 128 30s @ .*\.fs\.neo\.org {
//!     port 8080
//!     timeout 3s
//! }
//!
//! nns http://localhost:30333 - container
//! ```

use crate::domain::entities::ContractHash;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5353";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Zone origin, substituted for `@` filters and stripped from query
    /// names before registry lookups
    pub zone: String,
    pub debug: bool,
    pub geo: Option<GeoSortConfig>,
    pub health: Option<HealthFilterConfig>,
    pub contracts: Vec<ContractConfig>,
}

#[derive(Debug, Clone)]
pub struct GeoSortConfig {
    pub db_dir: PathBuf,
    pub max_records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Http,
    Icmp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    /// `@`: the zone origin, matched literally
    Origin,
    /// A regular expression over the owner name
    Pattern(String),
}

#[derive(Debug, Clone)]
pub struct HealthFilterConfig {
    pub method: ProbeMethod,
    pub cache_size: usize,
    pub interval: Duration,
    pub filters: Vec<FilterSpec>,
    pub port: Option<u16>,
    pub timeout: Option<Duration>,
    pub scheme: Option<String>,
    pub privileged: bool,
}

#[derive(Debug, Clone)]
pub struct ContractConfig {
    pub endpoint: String,
    /// `None` means "look up the well-known contract id"
    pub hash: Option<ContractHash>,
    pub nns_domain: String,
}

/// Load the configuration from the file named by the first argument or
/// `EDGEDNS_CONFIG`, with environment overrides applied on top.
pub fn load_config() -> anyhow::Result<Config> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("EDGEDNS_CONFIG").ok())
        .ok_or_else(|| anyhow::anyhow!("no config file: pass a path or set EDGEDNS_CONFIG"))?;

    let text = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("couldn't read config {path}: {e}"))?;
    let mut cfg = parse(&text)?;

    if let Ok(addr) = std::env::var("EDGEDNS_LISTEN_ADDR") {
        cfg.listen_addr = addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid EDGEDNS_LISTEN_ADDR '{addr}': {e}"))?;
    }
    if std::env::var("DEBUG").is_ok() {
        cfg.debug = true;
    }

    Ok(cfg)
}

/// Parse the directive text.
pub fn parse(text: &str) -> anyhow::Result<Config> {
    let mut cfg = Config {
        listen_addr: DEFAULT_LISTEN_ADDR.parse().expect("default addr parses"),
        zone: String::new(),
        debug: false,
        geo: None,
        health: None,
        contracts: Vec::new(),
    };

    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        let block = if tokens.last() == Some(&"{") {
            tokens.pop();
            collect_block(&mut lines)?
        } else {
            Vec::new()
        };

        let Some((directive, args)) = tokens.split_first() else {
            anyhow::bail!("block without a directive");
        };
        match *directive {
            "listen" => {
                let addr = one_arg("listen", args)?;
                cfg.listen_addr = addr
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid listen address '{addr}': {e}"))?;
            }
            "zone" => cfg.zone = one_arg("zone", args)?.trim_matches('.').to_string(),
            "debug" => {
                if !args.is_empty() {
                    anyhow::bail!("'debug' is a flag and takes no arguments");
                }
                cfg.debug = true;
            }
            "geodns" => {
                ensure_unset(cfg.geo.is_some(), "geodns")?;
                cfg.geo = Some(parse_geodns(args)?);
            }
            "healthchecker" => {
                ensure_unset(cfg.health.is_some(), "healthchecker")?;
                cfg.health = Some(parse_healthchecker(args, &block)?);
            }
            "nns" => cfg.contracts.push(parse_nns(args)?),
            other => anyhow::bail!("unknown directive '{other}'"),
        }

        if !block.is_empty() && *directive != "healthchecker" {
            anyhow::bail!("directive '{directive}' does not take a block");
        }
    }

    if cfg.zone.is_empty()
        && cfg
            .health
            .as_ref()
            .map(|h| h.filters.contains(&FilterSpec::Origin))
            .unwrap_or(false)
    {
        anyhow::bail!("'@' filter requires a 'zone' directive");
    }

    Ok(cfg)
}

fn ensure_unset(already: bool, directive: &str) -> anyhow::Result<()> {
    if already {
        anyhow::bail!("duplicate '{directive}' directive");
    }
    Ok(())
}

fn one_arg<'a>(directive: &str, args: &[&'a str]) -> anyhow::Result<&'a str> {
    match args {
        [value] => Ok(value),
        _ => anyhow::bail!("'{directive}' expects exactly one argument"),
    }
}

fn collect_block<'a, I>(lines: &mut I) -> anyhow::Result<Vec<(String, Vec<String>)>>
where
    I: Iterator<Item = &'a str>,
{
    let mut block = Vec::new();
    for line in lines {
        let line = line.trim();
        if line == "}" {
            return Ok(block);
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace().map(str::to_string);
        let key = tokens.next().expect("non-empty line");
        block.push((key, tokens.collect()));
    }
    anyhow::bail!("unterminated block: missing '}}'")
}

fn parse_geodns(args: &[&str]) -> anyhow::Result<GeoSortConfig> {
    let (db_dir, max_records) = match args {
        [dir] => (dir, 1),
        [dir, max] => {
            let max: usize = max
                .parse()
                .ok()
                .filter(|m| *m >= 1)
                .ok_or_else(|| anyhow::anyhow!("invalid max records arg: {max}"))?;
            (dir, max)
        }
        _ => anyhow::bail!("geodns supports: 'geodns GEOIP_DB_DIR [MAX_RECORDS]'"),
    };

    Ok(GeoSortConfig {
        db_dir: PathBuf::from(db_dir),
        max_records,
    })
}

fn parse_healthchecker(
    args: &[&str],
    block: &[(String, Vec<String>)],
) -> anyhow::Result<HealthFilterConfig> {
    if args.len() < 4 {
        anyhow::bail!(
            "healthchecker supports: 'healthchecker METHOD CACHE_SIZE INTERVAL FILTER [FILTER…]'"
        );
    }

    let method = match args[0] {
        "http" => ProbeMethod::Http,
        "icmp" => ProbeMethod::Icmp,
        other => anyhow::bail!("unsupported checker type: '{other}'"),
    };

    let cache_size: usize = args[1]
        .parse()
        .ok()
        .filter(|s| *s > 0)
        .ok_or_else(|| anyhow::anyhow!("invalid cache size: {}", args[1]))?;

    let interval = parse_duration(args[2])
        .map_err(|_| anyhow::anyhow!("invalid endpoint check interval: {}", args[2]))?;

    let mut filters = Vec::with_capacity(args.len() - 3);
    for raw in &args[3..] {
        if *raw == "@" {
            filters.push(FilterSpec::Origin);
        } else {
            regex::Regex::new(raw).map_err(|_| anyhow::anyhow!("invalid regexp filter: {raw}"))?;
            filters.push(FilterSpec::Pattern(raw.to_string()));
        }
    }

    let mut cfg = HealthFilterConfig {
        method,
        cache_size,
        interval,
        filters,
        port: None,
        timeout: None,
        scheme: None,
        privileged: false,
    };

    for (key, values) in block {
        match (method, key.as_str()) {
            (ProbeMethod::Http, "port") => {
                let port = one_value(key, values)?
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p > 0)
                    .ok_or_else(|| anyhow::anyhow!("invalid port: '{}'", values.join(" ")))?;
                cfg.port = Some(port);
            }
            (ProbeMethod::Http, "scheme") => {
                let scheme = one_value(key, values)?;
                if scheme != "http" && scheme != "https" {
                    anyhow::bail!("invalid scheme '{scheme}'");
                }
                cfg.scheme = Some(scheme.to_string());
            }
            (ProbeMethod::Icmp, "privileged") => {
                if !values.is_empty() {
                    anyhow::bail!("'privileged' is a flag and takes no value");
                }
                cfg.privileged = true;
            }
            (_, "timeout") => {
                let timeout = parse_duration(one_value(key, values)?)
                    .map_err(|_| anyhow::anyhow!("invalid timeout '{}'", values.join(" ")))?;
                cfg.timeout = Some(timeout);
            }
            (ProbeMethod::Http, other) => anyhow::bail!("unknown http parameter: '{other}'"),
            (ProbeMethod::Icmp, other) => anyhow::bail!("unknown icmp parameter: '{other}'"),
        }
    }

    Ok(cfg)
}

fn one_value<'a>(key: &str, values: &'a [String]) -> anyhow::Result<&'a str> {
    match values {
        [value] => Ok(value),
        _ => anyhow::bail!("'{key}' expects exactly one value, got '{}'", values.join(" ")),
    }
}

fn parse_nns(args: &[&str]) -> anyhow::Result<ContractConfig> {
    if args.len() < 2 || args.len() > 3 {
        anyhow::bail!("nns supports: 'nns RPC_ENDPOINT CONTRACT_HASH|- [NNS_DOMAIN]'");
    }

    let endpoint = args[0];
    validate_endpoint(endpoint)?;

    let hash = if args[1] == "-" {
        None
    } else {
        Some(
            ContractHash::from_le_hex(args[1])
                .map_err(|_| anyhow::anyhow!("invalid nns contract address"))?,
        )
    };

    Ok(ContractConfig {
        endpoint: endpoint.to_string(),
        hash,
        nns_domain: args.get(2).unwrap_or(&"").to_string(),
    })
}

/// An RPC endpoint must carry both a scheme and a port.
fn validate_endpoint(endpoint: &str) -> anyhow::Result<()> {
    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| anyhow::anyhow!("invalid endpoint: {endpoint}"))?;
    let authority = rest.split('/').next().unwrap_or_default();
    let port_ok = authority
        .rsplit_once(':')
        .map(|(_, port)| port.parse::<u16>().is_ok())
        .unwrap_or(false);

    if scheme.is_empty() || !port_ok {
        anyhow::bail!("invalid endpoint: {endpoint}");
    }
    Ok(())
}

/// Durations in the forms `250ms`, `3s`, `5m`, `2h`; must be positive.
pub fn parse_duration(text: &str) -> anyhow::Result<Duration> {
    let unit_at = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow::anyhow!("duration '{text}' has no unit"))?;
    let (number, unit) = text.split_at(unit_at);
    let number: u64 = number
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration '{text}'"))?;

    let duration = match unit {
        "ms" => Duration::from_millis(number),
        "s" => Duration::from_secs(number),
        "m" => Duration::from_secs(number * 60),
        "h" => Duration::from_secs(number * 3600),
        _ => anyhow::bail!("invalid duration unit in '{text}'"),
    };

    if duration.is_zero() {
        anyhow::bail!("duration '{text}' must be positive");
    }
    Ok(duration)
}
