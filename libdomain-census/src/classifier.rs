use crate::{
    heuristics::classify_site,
    resolver::{DnsTransport, ResolverError, ResolverPool},
    site::SiteProbe,
    types::{Candidate, Classification},
};
use tracing::debug;

/// DNS stage, then (for registered names) HTTP stage, then product stage.
pub struct Classifier<T, P> {
    pool: ResolverPool<T>,
    site: P,
}

impl<T: DnsTransport, P: SiteProbe> Classifier<T, P> {
    pub fn new(pool: ResolverPool<T>, site: P) -> Self {
        Self { pool, site }
    }

    pub fn pool(&self) -> &ResolverPool<T> {
        &self.pool
    }

    /// Only resolver exhaustion is reported; HTTP failures become `NoWebsite`.
    pub async fn classify(&mut self, candidate: &Candidate) -> Result<Classification, ResolverError> {
        let domain = candidate.domain();

        let answer = self.pool.query(&domain).await?;
        if !answer.found {
            return Ok(Classification::unregistered());
        }

        let response = match self.site.fetch(&domain).await {
            Ok(response) => Some(response),
            Err(e) => {
                debug!(%domain, error = %e, "No usable HTTP response");
                None
            }
        };

        let (usage, product) = classify_site(response.as_ref());
        Ok(Classification::registered(usage, product))
    }
}
