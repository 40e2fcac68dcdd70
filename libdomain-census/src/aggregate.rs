//! Per-block tallies.
//!
//! A [`BlockAggregator`] lives for exactly one block: it is created empty,
//! fed once per classified candidate and consumed by [`BlockAggregator::finalize`].
//! `unregistered_found` and `unused_found` are disjoint: a candidate lands in
//! the first when it has no DNS presence, in the second when it is registered
//! but not an active site.

use crate::types::{Candidate, Classification, Mode, PartOfSpeech};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// TLD column value for rows that span every probed TLD.
pub const ALL_TLDS: &str = "ALL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalDelta {
    #[serde(rename = "domains_tracked_lifetime")]
    pub domains_tracked_lifetime_delta: u64,
    #[serde(rename = "domains_tracked_24h")]
    pub domains_tracked_24h_delta: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LengthStats {
    pub length: usize,
    pub total_possible: u64,
    pub tracked_count: u64,
    pub unregistered_found: u64,
    pub unused_found: u64,
    pub tld: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordPosStats {
    pub pos: PartOfSpeech,
    pub length: usize,
    pub tracked_count: u64,
    pub unregistered_found: u64,
    pub unused_found: u64,
}

/// Local-only per-TLD breakdown, logged in the block summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TldStats {
    pub checked: u64,
    pub unregistered: u64,
    pub unused: u64,
    pub active: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAggregate {
    pub mode: Mode,
    pub date: NaiveDate,
    pub global: GlobalDelta,
    pub length_stats: Vec<LengthStats>,
    pub word_pos_stats: Vec<WordPosStats>,
    pub tld_stats: BTreeMap<String, TldStats>,
    pub skipped: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    tracked: u64,
    unregistered: u64,
    unused: u64,
}

impl Counters {
    fn add(&mut self, result: &Classification) {
        self.tracked += 1;
        if !result.is_registered() {
            self.unregistered += 1;
        } else if result.is_unused() {
            self.unused += 1;
        }
    }
}

#[derive(Debug)]
pub struct BlockAggregator {
    mode: Mode,
    charset_size: Option<u64>,
    processed: u64,
    skipped: u64,
    lengths: BTreeMap<usize, Counters>,
    words: BTreeMap<(PartOfSpeech, usize), Counters>,
    tlds: BTreeMap<String, TldStats>,
}

impl BlockAggregator {
    /// `charset_size` drives `total_possible` for short-mode rows.
    pub fn new(mode: Mode, charset_size: Option<u64>) -> Self {
        Self {
            mode,
            charset_size,
            processed: 0,
            skipped: 0,
            lengths: BTreeMap::new(),
            words: BTreeMap::new(),
            tlds: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, candidate: &Candidate, result: &Classification) {
        self.processed += 1;
        let length = candidate.length();

        match (candidate.mode, candidate.part_of_speech) {
            (Mode::Short, _) => self.lengths.entry(length).or_default().add(result),
            (Mode::Word, Some(pos)) => self.words.entry((pos, length)).or_default().add(result),
            (Mode::Word, None) => {
                debug!(domain = %candidate.domain(), "Word candidate without part of speech");
            }
        }

        let tld = self.tlds.entry(candidate.tld.clone()).or_default();
        tld.checked += 1;
        if !result.is_registered() {
            tld.unregistered += 1;
        } else if result.is_unused() {
            tld.unused += 1;
        } else {
            tld.active += 1;
        }
    }

    /// Candidate given up on (resolver exhaustion); counted nowhere but here.
    pub fn record_skipped(&mut self, candidate: &Candidate) {
        debug!(domain = %candidate.domain(), "Candidate skipped");
        self.skipped += 1;
    }

    fn total_possible(&self, length: usize) -> u64 {
        let Some(base) = self.charset_size else {
            return 0;
        };
        u32::try_from(length)
            .ok()
            .and_then(|exp| base.checked_pow(exp))
            .unwrap_or(u64::MAX)
    }

    pub fn finalize(self) -> BlockAggregate {
        self.finalize_on(Utc::now().date_naive())
    }

    pub fn finalize_on(self, date: NaiveDate) -> BlockAggregate {
        let length_stats = self
            .lengths
            .iter()
            .map(|(&length, c)| LengthStats {
                length,
                total_possible: self.total_possible(length),
                tracked_count: c.tracked,
                unregistered_found: c.unregistered,
                unused_found: c.unused,
                tld: ALL_TLDS,
            })
            .collect();

        let word_pos_stats = self
            .words
            .iter()
            .map(|(&(pos, length), c)| WordPosStats {
                pos,
                length,
                tracked_count: c.tracked,
                unregistered_found: c.unregistered,
                unused_found: c.unused,
            })
            .collect();

        BlockAggregate {
            mode: self.mode,
            date,
            global: GlobalDelta {
                domains_tracked_lifetime_delta: self.processed,
                domains_tracked_24h_delta: self.processed,
            },
            length_stats,
            word_pos_stats,
            tld_stats: self.tlds,
            skipped: self.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProductState, UsageState};

    fn short(label: &str, tld: &str) -> Candidate {
        Candidate {
            label: label.into(),
            tld: tld.into(),
            mode: Mode::Short,
            part_of_speech: None,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn total_possible_is_analytic() {
        let mut agg = BlockAggregator::new(Mode::Short, Some(26));
        agg.record(&short("abc", "com"), &Classification::unregistered());
        let block = agg.finalize_on(date());
        assert_eq!(block.length_stats.len(), 1);
        assert_eq!(block.length_stats[0].total_possible, 17576);
        assert_eq!(block.length_stats[0].tracked_count, 1);
        assert_eq!(block.length_stats[0].tld, "ALL");
    }

    #[test]
    fn unregistered_and_unused_are_disjoint() {
        let mut agg = BlockAggregator::new(Mode::Short, Some(26));
        agg.record(&short("a", "com"), &Classification::unregistered());
        agg.record(
            &short("b", "com"),
            &Classification::registered(UsageState::NoWebsite, ProductState::Unknown),
        );
        agg.record(
            &short("c", "com"),
            &Classification::registered(UsageState::ParkedOrPlaceholder, ProductState::Unknown),
        );
        agg.record(
            &short("d", "net"),
            &Classification::registered(UsageState::ActiveSite, ProductState::ActiveProduct),
        );

        let block = agg.finalize_on(date());
        let row = &block.length_stats[0];
        assert_eq!(row.tracked_count, 4);
        assert_eq!(row.unregistered_found, 1);
        assert_eq!(row.unused_found, 2);
        assert_eq!(block.global.domains_tracked_lifetime_delta, 4);
        assert_eq!(block.global.domains_tracked_24h_delta, 4);
        assert_eq!(
            block.tld_stats["com"],
            TldStats {
                checked: 3,
                unregistered: 1,
                unused: 2,
                active: 0
            }
        );
        assert_eq!(block.tld_stats["net"].active, 1);
    }

    #[test]
    fn word_mode_buckets_by_pos_and_length() {
        let mut agg = BlockAggregator::new(Mode::Word, None);
        let word = |label: &str, pos| Candidate {
            label: label.into(),
            tld: "com".into(),
            mode: Mode::Word,
            part_of_speech: Some(pos),
        };
        agg.record(&word("cat", PartOfSpeech::Noun), &Classification::unregistered());
        agg.record(&word("dog", PartOfSpeech::Noun), &Classification::unregistered());
        agg.record(
            &word("run", PartOfSpeech::Verb),
            &Classification::registered(UsageState::ActiveSite, ProductState::Unknown),
        );

        let block = agg.finalize_on(date());
        assert!(block.length_stats.is_empty());
        assert_eq!(
            block.word_pos_stats,
            [
                WordPosStats {
                    pos: PartOfSpeech::Noun,
                    length: 3,
                    tracked_count: 2,
                    unregistered_found: 2,
                    unused_found: 0
                },
                WordPosStats {
                    pos: PartOfSpeech::Verb,
                    length: 3,
                    tracked_count: 1,
                    unregistered_found: 0,
                    unused_found: 0
                },
            ]
        );
    }

    #[test]
    fn skipped_candidates_do_not_count() {
        let mut agg = BlockAggregator::new(Mode::Short, Some(26));
        agg.record_skipped(&short("a", "com"));
        let block = agg.finalize_on(date());
        assert_eq!(block.skipped, 1);
        assert_eq!(block.global, GlobalDelta::default());
        assert!(block.length_stats.is_empty());
    }
}
