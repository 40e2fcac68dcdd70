use reqwest::Client;
use std::{future::Future, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteProbeError {
    #[error("Timeout")]
    Timeout,
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// What came back from `https://<domain>/` after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteResponse {
    pub status: u16,
    pub final_host: Option<String>,
    pub body: String,
}

pub trait SiteProbe {
    fn fetch(&self, domain: &str) -> impl Future<Output = Result<SiteResponse, SiteProbeError>> + Send;
}

pub struct HttpsSiteProbe {
    client: Client,
    timeout: Duration,
    max_body_bytes: usize,
    scheme: String,
}

impl HttpsSiteProbe {
    pub fn new(client: Client, timeout: Duration, max_body_bytes: usize) -> Self {
        Self {
            client,
            timeout,
            max_body_bytes,
            scheme: "https".into(),
        }
    }

    /// Fetch `<scheme>://<domain>/` instead of the https root. Used against
    /// local test servers, where `domain` is `host:port`.
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }
}

pub(crate) fn root_url(scheme: &str, domain: &str) -> String {
    format!("{}://{}/", scheme, domain)
}

impl SiteProbe for HttpsSiteProbe {
    async fn fetch(&self, domain: &str) -> Result<SiteResponse, SiteProbeError> {
        let url = root_url(&self.scheme, domain);
        let limit = self.max_body_bytes;

        let exchange = async {
            let mut response = self.client.get(&url).send().await?;
            let status = response.status().as_u16();
            let final_host = response.url().host_str().map(str::to_lowercase);

            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                let room = limit.saturating_sub(body.len());
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                if body.len() >= limit {
                    break;
                }
            }

            Ok::<_, reqwest::Error>(SiteResponse {
                status,
                final_host,
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) if e.is_timeout() => Err(SiteProbeError::Timeout),
            Ok(Err(e)) => Err(SiteProbeError::Request(e)),
            Err(_) => Err(SiteProbeError::Timeout),
        }
    }
}
