//! HTTP Health Probe
//!
//! Probes an endpoint with a single GET against its root path. Redirects
//! are not followed; any status below 500 counts as healthy, so a
//! redirecting or authenticating endpoint still passes.

use crate::domain::ports::HealthProbe;
use async_trait::async_trait;
use std::time::Duration;

const DEFAULT_SCHEME: &str = "http";
const DEFAULT_PORT: u16 = 80;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct HttpProbeParams {
    pub port: Option<u16>,
    pub timeout: Option<Duration>,
    pub scheme: Option<String>,
}

pub struct HttpProbe {
    client: reqwest::Client,
    port: u16,
    scheme: String,
}

impl HttpProbe {
    pub fn new(params: HttpProbeParams) -> anyhow::Result<Self> {
        let scheme = params.scheme.unwrap_or_else(|| DEFAULT_SCHEME.to_string());
        if scheme != "http" && scheme != "https" {
            anyhow::bail!("invalid probe scheme '{scheme}'");
        }

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(params.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(Self {
            client,
            port: params.port.unwrap_or(DEFAULT_PORT),
            scheme,
        })
    }

    fn probe_url(&self, endpoint: &str) -> String {
        // IPv6 hosts need brackets in an authority
        if endpoint.contains(':') {
            format!("{}://[{}]:{}/", self.scheme, endpoint, self.port)
        } else {
            format!("{}://{}:{}/", self.scheme, endpoint, self.port)
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self, endpoint: &str) -> bool {
        let url = self.probe_url(endpoint);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().as_u16() < 500,
            Err(e) => {
                tracing::debug!("http probe of {url} failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url_shape() {
        let probe = HttpProbe::new(HttpProbeParams::default()).unwrap();
        assert_eq!(probe.probe_url("10.1.2.3"), "http://10.1.2.3:80/");
    }

    #[test]
    fn test_ipv6_hosts_are_bracketed() {
        let probe = HttpProbe::new(HttpProbeParams {
            port: Some(8080),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(probe.probe_url("4444:1::"), "http://[4444:1::]:8080/");
    }

    #[test]
    fn test_https_scheme_accepted() {
        let probe = HttpProbe::new(HttpProbeParams {
            scheme: Some("https".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(probe.probe_url("h"), "https://h:80/");
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let result = HttpProbe::new(HttpProbeParams {
            scheme: Some("gopher".to_string()),
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
