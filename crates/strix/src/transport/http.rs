use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use super::{Method, Transport, TransportResult, terminate_body};

/// 🔧 Where the search service lives and how to prove we're allowed in.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceConfig {
    /// 📡 Host (`search.example.com`) or full base URL (`http://localhost:9200`).
    /// A bare host gets `https://` in front of it.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 🌍 The region requests are scoped to.
    #[serde(default = "default_region")]
    pub region: String,
    /// 🔒 Username. The bouncer at the club. Except the club is a search cluster.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key, the velvet rope variant of authentication. Wins over basic auth.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_region() -> String {
    "us-west-2".to_string()
}

impl ServiceConfig {
    /// 📡 The `_bulk` URL, or `None` when no usable endpoint is configured.
    pub fn bulk_url(&self) -> Option<String> {
        let endpoint = self.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        let base = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };
        // -- trim_end_matches('/'): one slash of difference, infinite suffering of difference
        Some(format!("{}/_bulk", base.trim_end_matches('/')))
    }
}

/// 📡 The real transport: a reused `reqwest::Client` with auth baked into every request.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpTransport {
    /// 🚀 Build the client. 10s to connect, 30s for the whole request, because bulk
    /// bodies can be meaty and we're not monsters. No connectivity ping here: an
    /// invocation with nothing to flush should not need the network at all.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept. Probably a missing cert store or a cursed system OpenSSL. Either way: tragic.")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, method: Method, url: &str, region: &str, body: String) -> TransportResult {
        let body = terminate_body(body);
        let size = body.len() as i64;
        debug!(%method, url, region, bytes = size, "📡 Sending request to the search service");

        let mut request = self
            .client
            .request(method.clone(), url)
            // ⚠️ x-ndjson, not json. The bulk API is particular about its diet.
            .header("Content-Type", "application/x-ndjson");

        // -- 🔒 api_key beats basic auth in this club. This is not a democracy.
        if let Some(ref api_key) = self.config.api_key {
            request = request.header("Authorization", format!("ApiKey {api_key}"));
        } else if let Some(ref username) = self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        let started = Instant::now();
        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(err) => {
                return TransportResult::failed(format!(
                    "💀 Exception '{method}'ing request to {url}. Message {err}"
                ));
            }
        };

        let status = i32::from(response.status().as_u16());
        match response.text().await {
            Ok(text) => {
                trace!(status, "🚀 Response landed");
                TransportResult {
                    status,
                    body: text,
                    elapsed: started.elapsed().as_secs_f64(),
                    size,
                }
            }
            // -- 💀 we got a status line and then the body evaporated mid-read
            Err(err) => TransportResult::failed(format!(
                "💀 Reading the response body from {url} failed after status {status}. Message {err}"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_at(endpoint: &str) -> ServiceConfig {
        ServiceConfig {
            endpoint: Some(endpoint.to_string()),
            api_key: Some("c2VjcmV0".to_string()),
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn the_one_where_bulk_urls_are_assembled_with_slash_hygiene() {
        assert_eq!(
            service_at("search.example.com").bulk_url().as_deref(),
            Some("https://search.example.com/_bulk")
        );
        assert_eq!(
            service_at("http://localhost:9200/").bulk_url().as_deref(),
            Some("http://localhost:9200/_bulk")
        );
        assert_eq!(service_at("   ").bulk_url(), None);
        assert_eq!(ServiceConfig::default().bulk_url(), None);
    }

    #[tokio::test]
    async fn the_one_where_the_bulk_post_lands_with_its_api_key() -> Result<()> {
        let the_cluster = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("Authorization", "ApiKey c2VjcmV0"))
            .and(header("Content-Type", "application/x-ndjson"))
            .and(body_string("{\"index\":{}}\n{\"a\":1}\n"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"errors":false}"#))
            .expect(1)
            .mount(&the_cluster)
            .await;

        let the_config = service_at(&the_cluster.uri());
        let the_url = the_config.bulk_url().context("💀 endpoint was configured")?;
        let the_transport = HttpTransport::new(the_config)?;

        let the_result = the_transport
            .send(Method::POST, &the_url, "eu-west-1", "{\"index\":{}}\n{\"a\":1}".to_string())
            .await;

        assert_eq!(the_result.status, 200);
        assert_eq!(the_result.body, r#"{"errors":false}"#);
        assert_eq!(the_result.size, 21, "the appended trailing newline counts toward size");
        assert!(the_result.elapsed >= 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_error_statuses_are_reported_not_thrown() -> Result<()> {
        let the_cluster = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&the_cluster)
            .await;

        let the_config = ServiceConfig {
            endpoint: Some(the_cluster.uri()),
            username: Some("elastic".to_string()),
            password: Some("changeme".to_string()),
            ..ServiceConfig::default()
        };
        let the_url = the_config.bulk_url().context("💀 endpoint was configured")?;
        let the_result = HttpTransport::new(the_config)?
            .send(Method::POST, &the_url, "us-west-2", "{}\n".to_string())
            .await;

        assert_eq!(the_result.status, 403);
        assert_eq!(the_result.body, "forbidden");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_nobody_is_home_and_we_get_minus_one() -> Result<()> {
        let the_transport = HttpTransport::new(ServiceConfig::default())?;
        let the_result = the_transport
            .send(Method::POST, "http://127.0.0.1:1/_bulk", "us-west-2", "{}".to_string())
            .await;

        assert_eq!(the_result.status, -1);
        assert!(the_result.body.contains("http://127.0.0.1:1/_bulk"));
        Ok(())
    }
}
