//! DNS-over-HTTPS resolver pool.
//!
//! The pool keeps an ordered list of endpoints and an active index. Every
//! [`ROTATE_AFTER`] successful queries the active index advances to the next
//! endpoint (wrapping). A failed query marks the endpoint degraded and is
//! retried on the following endpoints in list order; the caller only sees an
//! error once every endpoint failed for that query. Whichever endpoint answers
//! becomes active, and degraded endpoints come back into play as rotation
//! reaches them again.

use crate::ratelimit::EndpointRateLimiters;
use reqwest::{header::ACCEPT, Client};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

pub const ROTATE_AFTER: u32 = 25;

const DNS_JSON: &str = "application/dns-json";
const RCODE_NOERROR: u32 = 0;
const RCODE_NXDOMAIN: u32 = 3;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("{endpoint}: timed out")]
    Timeout { endpoint: String },
    #[error("{endpoint}: HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("{endpoint}: request failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint}: malformed response: {reason}")]
    Malformed { endpoint: String, reason: String },
    #[error("{endpoint}: answered rcode {rcode}")]
    Rcode { endpoint: String, rcode: u32 },
    #[error("all {attempts} resolvers failed for {domain}; last error: {last}")]
    Exhausted {
        domain: String,
        attempts: usize,
        last: Box<ResolverError>,
    },
    #[error("resolver list is empty")]
    NoEndpoints,
}

/// Configured resolver: display name and JSON DoH URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverSpec {
    pub name: String,
    pub url: String,
}

pub fn default_resolvers() -> Vec<ResolverSpec> {
    vec![
        ResolverSpec {
            name: "cloudflare".into(),
            url: "https://cloudflare-dns.com/dns-query".into(),
        },
        ResolverSpec {
            name: "google".into(),
            url: "https://dns.google/resolve".into(),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverEndpoint {
    pub name: String,
    pub url: String,
    pub queries_since_rotation: u32,
    pub is_degraded: bool,
}

impl From<ResolverSpec> for ResolverEndpoint {
    fn from(spec: ResolverSpec) -> Self {
        Self {
            name: spec.name,
            url: spec.url,
            queries_since_rotation: 0,
            is_degraded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsAnswer {
    pub found: bool,
}

/// One lookup against one endpoint. `Ok(true)` means the name exists.
pub trait DnsTransport {
    fn lookup(
        &self,
        endpoint: &ResolverEndpoint,
        domain: &str,
    ) -> impl Future<Output = Result<bool, ResolverError>> + Send;
}

pub struct ResolverPool<T> {
    endpoints: Vec<ResolverEndpoint>,
    active: usize,
    transport: T,
}

impl<T: DnsTransport> ResolverPool<T> {
    pub fn new<I>(specs: I, transport: T) -> Result<Self, ResolverError>
    where
        I: IntoIterator<Item = ResolverSpec>,
    {
        let endpoints: Vec<ResolverEndpoint> = specs.into_iter().map(Into::into).collect();
        if endpoints.is_empty() {
            return Err(ResolverError::NoEndpoints);
        }
        Ok(Self {
            endpoints,
            active: 0,
            transport,
        })
    }

    pub fn endpoints(&self) -> &[ResolverEndpoint] {
        &self.endpoints
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> &ResolverEndpoint {
        &self.endpoints[self.active]
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Rotation step: next endpoint in list order becomes active with a fresh count.
    pub fn advance(&mut self) {
        self.active = (self.active + 1) % self.endpoints.len();
        self.endpoints[self.active].queries_since_rotation = 0;
    }

    /// Marks `failed` degraded and returns the endpoint to try next.
    pub fn fallback(&mut self, failed: usize) -> usize {
        self.endpoints[failed].is_degraded = true;
        (failed + 1) % self.endpoints.len()
    }

    fn record_success(&mut self, index: usize) {
        if index != self.active {
            self.active = index;
            self.endpoints[index].queries_since_rotation = 0;
        }
        let endpoint = &mut self.endpoints[index];
        endpoint.is_degraded = false;
        endpoint.queries_since_rotation += 1;
        if endpoint.queries_since_rotation >= ROTATE_AFTER {
            self.advance();
            debug!(active = %self.active().name, "Rotated resolver");
        }
    }

    pub async fn query(&mut self, domain: &str) -> Result<DnsAnswer, ResolverError> {
        let attempts = self.endpoints.len();
        let mut index = self.active;
        let mut last = None;

        for _ in 0..attempts {
            let outcome = self.transport.lookup(&self.endpoints[index], domain).await;
            match outcome {
                Ok(found) => {
                    self.record_success(index);
                    return Ok(DnsAnswer { found });
                }
                Err(e) => {
                    warn!(resolver = %self.endpoints[index].name, %domain, error = %e, "Resolver failed, falling back");
                    index = self.fallback(index);
                    last = Some(e);
                }
            }
        }

        Err(ResolverError::Exhausted {
            domain: domain.to_string(),
            attempts,
            last: Box::new(last.unwrap_or(ResolverError::NoEndpoints)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
}

/// JSON DoH transport (`?name=<domain>&type=NS`, `accept: application/dns-json`).
pub struct DohTransport {
    client: Client,
    timeout: Duration,
    limiters: EndpointRateLimiters,
}

impl DohTransport {
    pub fn new(client: Client, timeout: Duration, max_rate_per_resolver: u32) -> Self {
        Self {
            client,
            timeout,
            limiters: EndpointRateLimiters::new(max_rate_per_resolver),
        }
    }
}

impl DnsTransport for DohTransport {
    async fn lookup(&self, endpoint: &ResolverEndpoint, domain: &str) -> Result<bool, ResolverError> {
        self.limiters.acquire(&endpoint.name).await;

        let request = self
            .client
            .get(&endpoint.url)
            .query(&[("name", domain), ("type", "NS")])
            .header(ACCEPT, DNS_JSON);

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(source)) if source.is_timeout() => {
                return Err(ResolverError::Timeout {
                    endpoint: endpoint.name.clone(),
                })
            }
            Ok(Err(source)) => {
                return Err(ResolverError::Request {
                    endpoint: endpoint.name.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(ResolverError::Timeout {
                    endpoint: endpoint.name.clone(),
                })
            }
        };

        if !status.is_success() {
            return Err(ResolverError::Status {
                endpoint: endpoint.name.clone(),
                status: status.as_u16(),
            });
        }

        let parsed: DohResponse =
            serde_json::from_slice(&body).map_err(|e| ResolverError::Malformed {
                endpoint: endpoint.name.clone(),
                reason: e.to_string(),
            })?;

        match parsed.status {
            RCODE_NOERROR => Ok(true),
            RCODE_NXDOMAIN => Ok(false),
            rcode => Err(ResolverError::Rcode {
                endpoint: endpoint.name.clone(),
                rcode,
            }),
        }
    }
}
