use libdomain_census::{
    default_resolvers,
    generator::GeneratorError,
    tlds::{default_tlds, normalize_tlds, TldError},
    wordlist::DEFAULT_MAX_WORD_LENGTH,
    AgentSettings, ExhaustionPolicy, LabelSpace, ProbeConfig, ResolverSpec,
};
use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://dom4in.net";
pub const DEFAULT_CHARSET: &str = "abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Invalid TLD list: {0}")]
    Tld(#[from] TldError),
    #[error("Invalid label space: {0}")]
    LabelSpace(#[from] GeneratorError),
    #[error("No API key configured (set [api] key, --api-key or CENSUS_API_KEY, or use --dry-run)")]
    MissingApiKey,
    #[error("Could not determine a default {0} directory")]
    NoDefaultDir(&'static str),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub probe: ProbeSection,
    pub short: ShortConfig,
    pub words: WordsConfig,
    pub tlds: TldConfig,
    pub state: StateConfig,
    pub resolvers: Vec<ResolverSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            probe: ProbeSection::default(),
            short: ShortConfig::default(),
            words: WordsConfig::default(),
            tlds: TldConfig::default(),
            state: StateConfig::default(),
            resolvers: default_resolvers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base: String,
    pub key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_API_BASE.to_string(),
            key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeSection {
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub request_delay_ms: u64,
    pub block_pause_secs: u64,
    pub max_resolver_qps: u32,
    pub max_consecutive_upload_failures: u32,
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            batch_size: 25,
            timeout_secs: 5,
            request_delay_ms: 0,
            block_pause_secs: 60,
            max_resolver_qps: 20,
            max_consecutive_upload_failures: 3,
            on_exhausted: ExhaustionPolicy::Stop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShortConfig {
    pub enabled: bool,
    pub charset: String,
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for ShortConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            charset: DEFAULT_CHARSET.to_string(),
            min_length: 1,
            max_length: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WordsConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub max_length: usize,
}

impl Default for WordsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("wordlists"),
            max_length: DEFAULT_MAX_WORD_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TldConfig {
    pub list: Vec<String>,
}

impl Default for TldConfig {
    fn default() -> Self {
        Self {
            list: default_tlds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    pub dir: Option<PathBuf>,
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("domain-census").join("config.toml"))
}

fn default_state_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("domain-census"))
}

impl Config {
    /// Reads `path`, or the default location when none is given. A missing
    /// default file yields the built-in defaults; an explicitly named file
    /// must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        Self::parse(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolvers.is_empty() {
            return Err(ConfigError::Invalid("at least one resolver is required".into()));
        }
        for resolver in &self.resolvers {
            let url = reqwest::Url::parse(&resolver.url).map_err(|e| {
                ConfigError::Invalid(format!("resolver {}: bad URL {:?}: {}", resolver.name, resolver.url, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "resolver {}: URL must be http(s), got {}",
                    resolver.name,
                    url.scheme()
                )));
            }
        }

        self.tld_list()?;
        if self.short.enabled {
            self.label_space()?;
        }
        if self.words.enabled && self.words.max_length == 0 {
            return Err(ConfigError::Invalid("words.max_length must be at least 1".into()));
        }
        if !self.short.enabled && !self.words.enabled {
            return Err(ConfigError::Invalid("no mode enabled".into()));
        }
        if self.probe.batch_size == 0 {
            return Err(ConfigError::Invalid("probe.batch_size must be at least 1".into()));
        }
        if self.probe.timeout_secs == 0 {
            return Err(ConfigError::Invalid("probe.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tld_list(&self) -> Result<Vec<String>, TldError> {
        normalize_tlds(&self.tlds.list)
    }

    pub fn label_space(&self) -> Result<LabelSpace, GeneratorError> {
        LabelSpace::new(&self.short.charset, self.short.min_length, self.short.max_length)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api.key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn state_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.state.dir {
            Some(dir) => Ok(dir.clone()),
            None => default_state_dir().ok_or(ConfigError::NoDefaultDir("state")),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.probe.timeout_secs)
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: self.timeout(),
            max_rate_per_resolver: self.probe.max_resolver_qps,
            ..ProbeConfig::default()
        }
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            batch_size: self.probe.batch_size,
            block_pause: Duration::from_secs(self.probe.block_pause_secs),
            request_delay: Duration::from_millis(self.probe.request_delay_ms),
            on_exhausted: self.probe.on_exhausted,
            max_consecutive_failures: self.probe.max_consecutive_upload_failures,
            ..AgentSettings::default()
        }
    }
}

pub fn default_config_toml() -> String {
    r#"# Domain Census agent configuration

[api]
# Stats store base URL and admin key (CENSUS_API_BASE / CENSUS_API_KEY override)
base = "https://dom4in.net"
# key = "..."

[probe]
# Candidates per block (one upload per block)
batch_size = 25
# Per-request timeout for DoH, site probes and uploads
timeout_secs = 5
# Extra delay between candidates
request_delay_ms = 0
# Pause between blocks
block_pause_secs = 60
# Per-resolver query ceiling
max_resolver_qps = 20
# Stop after this many failed uploads in a row
max_consecutive_upload_failures = 3
# What to do once a mode has enumerated everything: "stop" or "wrap"
on_exhausted = "stop"

[short]
enabled = true
charset = "abcdefghijklmnopqrstuvwxyz"
min_length = 1
max_length = 6

[words]
# Needs word lists; see --fetch-wordlists
enabled = false
dir = "wordlists"
max_length = 10

[tlds]
list = ["com", "net", "org", "io", "co"]

[state]
# Checkpoints and the agent lock; defaults to the local data directory
# dir = "/var/lib/domain-census"

[[resolvers]]
name = "cloudflare"
url = "https://cloudflare-dns.com/dns-query"

[[resolvers]]
name = "google"
url = "https://dns.google/resolve"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_template_matches_defaults() {
        let parsed = Config::parse(&default_config_toml()).unwrap();
        assert_eq!(parsed, Config::default());
        parsed.validate().unwrap();
    }

    #[test]
    fn empty_file_yields_defaults() {
        let parsed = Config::parse("").unwrap();
        assert_eq!(parsed.resolvers, default_resolvers());
        assert_eq!(parsed.probe.batch_size, 25);
        assert_eq!(parsed.tlds.list, ["com", "net", "org", "io", "co"]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let parsed = Config::parse(
            r#"
            [probe]
            batch_size = 10
            on_exhausted = "wrap"

            [tlds]
            list = ["COM", ".net", "com"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.probe.batch_size, 10);
        assert_eq!(parsed.probe.on_exhausted, ExhaustionPolicy::Wrap);
        assert_eq!(parsed.probe.block_pause_secs, 60);
        assert_eq!(parsed.tld_list().unwrap(), ["com", "net"]);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        config.resolvers.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.resolvers[0].url = "ftp://example.com".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.short.charset = "aab".into();
        assert!(matches!(config.validate(), Err(ConfigError::LabelSpace(_))));

        let mut config = Config::default();
        config.short.min_length = 4;
        config.short.max_length = 2;
        assert!(matches!(config.validate(), Err(ConfigError::LabelSpace(_))));

        let mut config = Config::default();
        config.tlds.list.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Tld(TldError::Empty))));

        let mut config = Config::default();
        config.short.enabled = false;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.probe.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        assert!(Config::parse("[probe]\non_exhausted = \"loop\"\n").is_err());
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let mut config = Config::default();
        config.api.key = Some("  ".into());
        assert_eq!(config.api_key(), None);
        config.api.key = Some("k".into());
        assert_eq!(config.api_key(), Some("k"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nkey = \"abc\"\n[state]\ndir = \"/tmp/census\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.api_key(), Some("abc"));
        assert_eq!(config.state_dir().unwrap(), PathBuf::from("/tmp/census"));
    }

    #[test]
    fn settings_carry_probe_section() {
        let mut config = Config::default();
        config.probe.request_delay_ms = 250;
        config.probe.max_resolver_qps = 7;
        let settings = config.agent_settings();
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.request_delay, Duration::from_millis(250));
        assert_eq!(settings.max_consecutive_failures, 3);
        let probe = config.probe_config();
        assert_eq!(probe.timeout, Duration::from_secs(5));
        assert_eq!(probe.max_rate_per_resolver, 7);
    }
}
