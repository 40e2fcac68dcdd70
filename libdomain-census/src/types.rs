use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Which enumeration a candidate (or cursor, or block) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Short,
    Word,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Short => "short",
            Mode::Word => "word",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Part of speech of a dictionary word. Declaration order is the precedence
/// used when a word appears in more than one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
}

impl PartOfSpeech {
    pub const ALL: [PartOfSpeech; 4] = [
        PartOfSpeech::Noun,
        PartOfSpeech::Verb,
        PartOfSpeech::Adjective,
        PartOfSpeech::Adverb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartOfSpeech::Noun => "noun",
            PartOfSpeech::Verb => "verb",
            PartOfSpeech::Adjective => "adjective",
            PartOfSpeech::Adverb => "adverb",
        }
    }

    pub(crate) fn plural(&self) -> &'static str {
        match self {
            PartOfSpeech::Noun => "nouns",
            PartOfSpeech::Verb => "verbs",
            PartOfSpeech::Adjective => "adjectives",
            PartOfSpeech::Adverb => "adverbs",
        }
    }
}

impl fmt::Display for PartOfSpeech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub label: String,
    pub tld: String,
    pub mode: Mode,
    pub part_of_speech: Option<PartOfSpeech>,
}

impl Candidate {
    pub fn domain(&self) -> String {
        format!("{}.{}", self.label, self.tld)
    }

    pub fn length(&self) -> usize {
        self.label.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageState {
    NoWebsite,
    ParkedOrPlaceholder,
    ActiveSite,
}

impl UsageState {
    pub fn is_active(&self) -> bool {
        matches!(self, UsageState::ActiveSite)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageState::NoWebsite => "no_website",
            UsageState::ParkedOrPlaceholder => "parked_or_placeholder",
            UsageState::ActiveSite => "active_site",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductState {
    ActiveProduct,
    Unknown,
}

impl ProductState {
    pub fn is_active_product(&self) -> bool {
        matches!(self, ProductState::ActiveProduct)
    }
}

/// Outcome of classifying one candidate. Unregistered domains always carry
/// `NoWebsite` / `Unknown`; the constructors are the only way to build one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    registered: bool,
    usage: UsageState,
    product: ProductState,
}

impl Classification {
    pub fn unregistered() -> Self {
        Self {
            registered: false,
            usage: UsageState::NoWebsite,
            product: ProductState::Unknown,
        }
    }

    pub fn registered(usage: UsageState, product: ProductState) -> Self {
        Self {
            registered: true,
            usage,
            product,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn usage(&self) -> UsageState {
        self.usage
    }

    pub fn product(&self) -> ProductState {
        self.product
    }

    /// Registered but not serving a real site.
    pub fn is_unused(&self) -> bool {
        self.registered && !self.usage.is_active()
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub max_rate_per_resolver: u32,
    pub max_body_bytes: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_rate_per_resolver: 20,
            max_body_bytes: 256 * 1024,
        }
    }
}
