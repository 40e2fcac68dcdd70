use crate::types::PartOfSpeech;
use reqwest::Client;
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_WORD_LENGTH: usize = 10;

/// Combined, sorted union written next to the per-POS files.
pub const ALL_WORDS_FILE: &str = "words_10_all.txt";

const WORDLIST_BASE_URL: &str =
    "https://raw.githubusercontent.com/david47k/top-english-wordlists/master";

#[derive(Debug, Error)]
pub enum WordListError {
    #[error("Failed to read word list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write word list {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to fetch word list: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("No usable words found in {0}")]
    Empty(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordEntry {
    pub word: String,
    pub pos: PartOfSpeech,
}

/// Alphabetically ordered unique words, each tagged with its primary part of speech.
#[derive(Debug, Clone, Default)]
pub struct WordList {
    entries: Vec<WordEntry>,
}

impl WordList {
    /// Builds the list from per-POS word sets. A word present in several sets
    /// keeps the highest-precedence tag (noun, verb, adjective, adverb).
    pub fn from_pos_lists<I>(lists: I) -> Self
    where
        I: IntoIterator<Item = (PartOfSpeech, Vec<String>)>,
    {
        let mut tagged: BTreeMap<String, PartOfSpeech> = BTreeMap::new();
        for (pos, words) in lists {
            for word in words {
                tagged
                    .entry(word)
                    .and_modify(|existing| *existing = (*existing).min(pos))
                    .or_insert(pos);
            }
        }

        Self {
            entries: tagged
                .into_iter()
                .map(|(word, pos)| WordEntry { word, pos })
                .collect(),
        }
    }

    /// Loads `words_10_<pos>.txt` files from `dir`. Missing files are skipped;
    /// an overall empty result is an error.
    pub fn load_dir(dir: &Path, max_length: usize) -> Result<Self, WordListError> {
        let mut lists = Vec::new();
        for pos in PartOfSpeech::ALL {
            let path = dir.join(pos_file_name(pos));
            match fs::read_to_string(&path) {
                Ok(text) => {
                    let words = clean_words(&text, max_length);
                    debug!(path = %path.display(), count = words.len(), "Loaded word list");
                    lists.push((pos, words));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "Word list missing, skipping {}s", pos);
                }
                Err(source) => return Err(WordListError::Read { path, source }),
            }
        }

        let list = Self::from_pos_lists(lists);
        if list.is_empty() {
            return Err(WordListError::Empty(dir.to_path_buf()));
        }
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WordEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WordEntry> {
        self.entries.iter()
    }
}

pub fn pos_file_name(pos: PartOfSpeech) -> String {
    format!("words_10_{}.txt", pos.plural())
}

/// Lowercased, ASCII-alphabetic, length-bounded words in first-seen order.
pub fn clean_words(text: &str, max_length: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|w| !w.is_empty() && w.len() <= max_length)
        .filter(|w| w.chars().all(|c| c.is_ascii_alphabetic()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    pub per_pos: Vec<(PartOfSpeech, usize)>,
    pub unique: usize,
}

fn source_url(pos: PartOfSpeech) -> String {
    format!(
        "{}/top_english_{}_lower_10000.txt",
        WORDLIST_BASE_URL,
        match pos {
            PartOfSpeech::Noun => "nouns",
            PartOfSpeech::Verb => "verbs",
            PartOfSpeech::Adjective => "adjs",
            PartOfSpeech::Adverb => "advs",
        }
    )
}

fn write_sorted(path: &Path, words: &[String]) -> Result<(), WordListError> {
    let mut sorted = words.to_vec();
    sorted.sort();
    let mut body = sorted.join("\n");
    body.push('\n');
    fs::write(path, body).map_err(|source| WordListError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Downloads the four part-of-speech lists, cleans them and writes the
/// per-POS files plus the combined list into `dir`.
pub async fn fetch_wordlists(
    client: &Client,
    dir: &Path,
    max_length: usize,
) -> Result<FetchSummary, WordListError> {
    fs::create_dir_all(dir).map_err(|source| WordListError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut summary = FetchSummary::default();
    let mut union: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    for pos in PartOfSpeech::ALL {
        let url = source_url(pos);
        info!(%url, "Downloading {} list", pos);
        let text = client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let words = clean_words(&text, max_length);
        write_sorted(&dir.join(pos_file_name(pos)), &words)?;
        summary.per_pos.push((pos, words.len()));
        union.extend(words.into_iter().filter(|w| seen.insert(w.clone())));
    }

    write_sorted(&dir.join(ALL_WORDS_FILE), &union)?;
    summary.unique = union.len();
    Ok(summary)
}
