pub mod agent;
pub mod aggregate;
pub mod checkpoint;
pub mod classifier;
pub mod generator;
mod heuristics;
mod http;
mod ratelimit;
pub mod resolver;
mod scheduler;
pub mod site;
pub mod tlds;
mod types;
pub mod upload;
pub mod wordlist;

pub use agent::{Agent, AgentError, AgentSettings, BlockOutcome, BlockReport, ExhaustionPolicy, RunOutcome};
pub use checkpoint::{CheckpointError, CheckpointStore};
pub use classifier::Classifier;
pub use generator::{CandidateSource, Cursor, LabelSpace, ShortLabelGenerator, WordGenerator};
pub use heuristics::{classify_site, is_parked_or_placeholder};
pub use http::create_http_pool;
pub use resolver::{default_resolvers, DohTransport, ResolverPool, ResolverSpec};
pub use site::HttpsSiteProbe;
pub use types::{
    Candidate, Classification, Mode, PartOfSpeech, ProbeConfig, ProductState, UsageState,
};
pub use upload::{UploadClient, UploadError, UploadOutcome};
pub use wordlist::WordList;

pub type DohClassifier = Classifier<DohTransport, HttpsSiteProbe>;

/// Classifier over live DoH resolvers and HTTPS probing, sharing one pooled client.
pub fn doh_classifier(
    client: reqwest::Client,
    resolvers: Vec<ResolverSpec>,
    config: &ProbeConfig,
) -> Result<DohClassifier, resolver::ResolverError> {
    let transport = DohTransport::new(client.clone(), config.timeout, config.max_rate_per_resolver);
    let pool = ResolverPool::new(resolvers, transport)?;
    let site = HttpsSiteProbe::new(client, config.timeout, config.max_body_bytes);
    Ok(Classifier::new(pool, site))
}
