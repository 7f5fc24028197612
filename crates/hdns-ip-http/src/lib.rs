// # HTTP IP Source
//
// This crate determines the host's public IPv4 address by asking external
// "echo my IP" services over HTTP.
//
// ## Architecture
//
// Candidates are tried one at a time, in configuration order. The first one
// that returns a valid public IPv4 address wins; transport errors, non-2xx
// statuses and implausible bodies are logged and the next candidate is
// tried. Nothing is cached between calls.
//
// Response bodies are untrusted, so at most `MAX_BODY_BYTES` are read.

use hdns_core::ProviderRegistry;
use hdns_core::address::validate_public_ipv4;
use hdns_core::config::IpSourceConfig;
use hdns_core::traits::{IpSource, IpSourceFactory};
use hdns_core::{Error, Result};

use std::net::Ipv4Addr;
use std::time::Duration;

/// Longest body that can hold an IPv4 literal
const MAX_BODY_BYTES: usize = 15;

/// Default per-request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// HTTP-based public IP source
pub struct HttpIpSource {
    /// Echo services, tried in order
    urls: Vec<String>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a new HTTP IP source
    ///
    /// # Parameters
    ///
    /// - `urls`: Echo services to try, in order (e.g., "https://api.ipify.org")
    pub fn new(urls: Vec<String>) -> Result<Self> {
        Self::with_timeout(urls, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create with a custom per-request timeout
    pub fn with_timeout(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::config("At least one IP resolver URL is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hdns/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { urls, client })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Ask one echo service
    async fn fetch_ip(&self, url: &str) -> Result<Ipv4Addr> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!("{} returned {}", url, response.status())));
        }

        let mut body = Vec::with_capacity(MAX_BODY_BYTES);
        while body.len() < MAX_BODY_BYTES {
            let chunk = response
                .chunk()
                .await
                .map_err(|e| Error::http(format!("Failed to read response from {}: {}", url, e)))?;

            match chunk {
                Some(bytes) => {
                    let room = MAX_BODY_BYTES - body.len();
                    body.extend_from_slice(&bytes[..bytes.len().min(room)]);
                }
                None => break,
            }
        }

        let text = String::from_utf8_lossy(&body);
        validate_public_ipv4(text.trim())
    }
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn current(&self) -> Result<Ipv4Addr> {
        for url in &self.urls {
            match self.fetch_ip(url).await {
                Ok(ip) => {
                    tracing::debug!("Public IP {} reported by {}", ip, url);
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::warn!("IP resolver {} unusable: {}", url, e);
                }
            }
        }

        Err(Error::resolution(format!(
            "none of {} IP resolvers returned a usable address",
            self.urls.len()
        )))
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP IP sources
pub struct HttpFactory;

impl IpSourceFactory for HttpFactory {
    fn create(&self, config: &IpSourceConfig) -> Result<Box<dyn IpSource>> {
        match config {
            IpSourceConfig::Http { urls, timeout_secs } => Ok(Box::new(HttpIpSource::with_timeout(
                urls.clone(),
                Duration::from_secs(*timeout_secs),
            )?)),
        }
    }
}

/// Register the HTTP IP source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_source("http", Box::new(HttpFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn echo(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_factory_creation() {
        let factory = HttpFactory;

        let source = factory.create(&IpSourceConfig::default());
        assert!(source.is_ok());

        let empty = IpSourceConfig::Http {
            urls: vec![],
            timeout_secs: 10,
        };
        assert!(matches!(factory.create(&empty), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_first_valid_answer_wins() {
        let server = MockServer::start().await;
        echo(&server, "/a", "203.0.113.7\n").await;
        echo(&server, "/b", "198.51.100.1").await;

        let source =
            HttpIpSource::new(vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())]).unwrap();

        assert_eq!(source.current().await.unwrap(), Ipv4Addr::new(203, 0, 113, 7));
    }

    #[tokio::test]
    async fn test_implausible_answers_fall_through() {
        let server = MockServer::start().await;
        echo(&server, "/private", "10.0.0.5").await;
        echo(&server, "/v6", "2001:db8::1").await;
        echo(&server, "/html", "<html><body>hello</body></html>").await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503).set_body_string("203.0.113.9"))
            .mount(&server)
            .await;
        echo(&server, "/good", "  203.0.113.7  ").await;

        let urls = ["/private", "/v6", "/html", "/down", "/good"]
            .iter()
            .map(|p| format!("{}{}", server.uri(), p))
            .collect();
        let source = HttpIpSource::new(urls).unwrap();

        assert_eq!(source.current().await.unwrap(), Ipv4Addr::new(203, 0, 113, 7));
    }

    #[tokio::test]
    async fn test_long_body_is_capped() {
        let server = MockServer::start().await;
        // Only the first 15 bytes are read, which is not a valid address
        echo(&server, "/long", "203.0.113.7 and a lot of trailing text").await;

        let source = HttpIpSource::new(vec![format!("{}/long", server.uri())]).unwrap();
        assert!(matches!(source.current().await, Err(Error::ResolutionFailure(_))));
    }

    #[tokio::test]
    async fn test_all_candidates_exhausted() {
        let server = MockServer::start().await;
        echo(&server, "/loopback", "127.0.0.1").await;

        let source = HttpIpSource::new(vec![
            format!("{}/loopback", server.uri()),
            format!("{}/missing", server.uri()),
        ])
        .unwrap();

        assert!(matches!(source.current().await, Err(Error::ResolutionFailure(_))));
    }

    #[tokio::test]
    async fn test_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", concat!("hdns/", env!("CARGO_PKG_VERSION"))))
            .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.7"))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpIpSource::new(vec![server.uri()]).unwrap();
        assert!(source.current().await.is_ok());
    }
}
