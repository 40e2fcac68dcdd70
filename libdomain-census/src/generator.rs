//! Deterministic, resumable candidate enumeration.
//!
//! Short mode walks length ascending, then label ascending in charset order,
//! then TLD in list order. Word mode walks the word list in stored order, then
//! TLD in list order. Each source owns a working cursor that advances as
//! batches are handed out; persisting it is the caller's business.

use crate::{
    types::{Candidate, Mode},
    wordlist::WordList,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("charset is empty")]
    EmptyCharset,
    #[error("charset symbol {0:?} is not a lowercase ASCII letter or digit")]
    InvalidSymbol(char),
    #[error("charset symbol {0:?} appears more than once")]
    DuplicateSymbol(char),
    #[error("invalid label length range {min}..={max}")]
    InvalidLengthRange { min: usize, max: usize },
    #[error("label space for length {0} does not fit in 64 bits")]
    SpaceTooLarge(usize),
    #[error("TLD list is empty")]
    NoTlds,
    #[error("word list is empty")]
    EmptyWordList,
    #[error("cursor belongs to {found} mode, expected {expected}")]
    ModeMismatch { expected: Mode, found: Mode },
    #[error("cursor {0:?} is outside the enumeration space")]
    CursorOutOfRange(Cursor),
}

/// Persistable enumeration position.
///
/// A valid cursor never points past the last label of the space, with one
/// exception: the end marker a source reports once it is exhausted
/// (`length == max_length + 1` with position and TLD index at zero for short
/// labels, `word_index == words.len()` for words). `seek` accepts it so a mode
/// that was checkpointed as exhausted stays exhausted after a restart instead
/// of failing to load or starting over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Cursor {
    Short {
        length: usize,
        #[serde(rename = "position_within_length")]
        position: u64,
        tld_index: usize,
    },
    Word {
        word_index: usize,
        tld_index: usize,
    },
}

impl Cursor {
    pub fn mode(&self) -> Mode {
        match self {
            Cursor::Short { .. } => Mode::Short,
            Cursor::Word { .. } => Mode::Word,
        }
    }
}

/// Result of one `next_batch` call. `exhausted` is set once the working
/// cursor sits at the end of the space.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub candidates: Vec<Candidate>,
    pub exhausted: bool,
}

pub trait CandidateSource {
    fn mode(&self) -> Mode;

    fn initial_cursor(&self) -> Cursor;

    /// Working cursor: the position of the next candidate to be produced.
    fn cursor(&self) -> Cursor;

    /// Moves the working cursor, rejecting positions outside the space.
    fn seek(&mut self, cursor: Cursor) -> Result<(), GeneratorError>;

    fn next_batch(&mut self, n: usize) -> Batch;

    fn is_exhausted(&self) -> bool;

    /// Alphabet size for analytic totals; `None` for dictionary sources.
    fn charset_size(&self) -> Option<u64>;

    /// Back to the initial cursor.
    fn restart(&mut self);
}

/// The combinatorial label alphabet and length bounds.
#[derive(Debug, Clone)]
pub struct LabelSpace {
    charset: Vec<char>,
    min_length: usize,
    max_length: usize,
}

impl LabelSpace {
    pub fn new(charset: &str, min_length: usize, max_length: usize) -> Result<Self, GeneratorError> {
        let symbols: Vec<char> = charset.chars().collect();
        if symbols.is_empty() {
            return Err(GeneratorError::EmptyCharset);
        }
        for (i, c) in symbols.iter().enumerate() {
            if !(c.is_ascii_lowercase() || c.is_ascii_digit()) {
                return Err(GeneratorError::InvalidSymbol(*c));
            }
            if symbols[..i].contains(c) {
                return Err(GeneratorError::DuplicateSymbol(*c));
            }
        }
        if min_length == 0 || min_length > max_length {
            return Err(GeneratorError::InvalidLengthRange {
                min: min_length,
                max: max_length,
            });
        }
        let base = symbols.len() as u64;
        if u32::try_from(max_length)
            .ok()
            .and_then(|exp| base.checked_pow(exp))
            .is_none()
        {
            return Err(GeneratorError::SpaceTooLarge(max_length));
        }

        Ok(Self {
            charset: symbols,
            min_length,
            max_length,
        })
    }

    pub fn charset_size(&self) -> u64 {
        self.charset.len() as u64
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// `charset_size ^ length`; bounded by the check in `new` for lengths in range.
    pub fn combinations(&self, length: usize) -> u64 {
        u32::try_from(length)
            .ok()
            .and_then(|exp| self.charset_size().checked_pow(exp))
            .unwrap_or(u64::MAX)
    }

    /// Label number `index` of the given length, most significant symbol first.
    pub fn label_at(&self, length: usize, mut index: u64) -> String {
        let base = self.charset_size();
        let mut symbols = vec![self.charset[0]; length];
        for slot in symbols.iter_mut().rev() {
            *slot = self.charset[(index % base) as usize];
            index /= base;
        }
        symbols.into_iter().collect()
    }
}

#[derive(Debug, Clone)]
pub struct ShortLabelGenerator {
    space: LabelSpace,
    tlds: Vec<String>,
    length: usize,
    position: u64,
    tld_index: usize,
}

impl ShortLabelGenerator {
    pub fn new(space: LabelSpace, tlds: Vec<String>) -> Result<Self, GeneratorError> {
        if tlds.is_empty() {
            return Err(GeneratorError::NoTlds);
        }
        let length = space.min_length();
        Ok(Self {
            space,
            tlds,
            length,
            position: 0,
            tld_index: 0,
        })
    }

    fn end_length(&self) -> usize {
        self.space.max_length() + 1
    }

    fn step(&mut self) {
        self.tld_index += 1;
        if self.tld_index < self.tlds.len() {
            return;
        }
        self.tld_index = 0;
        self.position += 1;
        if self.position < self.space.combinations(self.length) {
            return;
        }
        self.position = 0;
        self.length += 1;
    }
}

impl CandidateSource for ShortLabelGenerator {
    fn mode(&self) -> Mode {
        Mode::Short
    }

    fn initial_cursor(&self) -> Cursor {
        Cursor::Short {
            length: self.space.min_length(),
            position: 0,
            tld_index: 0,
        }
    }

    fn cursor(&self) -> Cursor {
        Cursor::Short {
            length: self.length,
            position: self.position,
            tld_index: self.tld_index,
        }
    }

    fn seek(&mut self, cursor: Cursor) -> Result<(), GeneratorError> {
        let Cursor::Short {
            length,
            position,
            tld_index,
        } = cursor
        else {
            return Err(GeneratorError::ModeMismatch {
                expected: Mode::Short,
                found: cursor.mode(),
            });
        };

        let at_end = length == self.end_length() && position == 0 && tld_index == 0;
        let in_range = length >= self.space.min_length()
            && length <= self.space.max_length()
            && position < self.space.combinations(length)
            && tld_index < self.tlds.len();
        if !(at_end || in_range) {
            return Err(GeneratorError::CursorOutOfRange(cursor));
        }

        self.length = length;
        self.position = position;
        self.tld_index = tld_index;
        Ok(())
    }

    fn next_batch(&mut self, n: usize) -> Batch {
        let mut candidates = Vec::with_capacity(n);
        while candidates.len() < n && !self.is_exhausted() {
            candidates.push(Candidate {
                label: self.space.label_at(self.length, self.position),
                tld: self.tlds[self.tld_index].clone(),
                mode: Mode::Short,
                part_of_speech: None,
            });
            self.step();
        }
        Batch {
            candidates,
            exhausted: self.is_exhausted(),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.length > self.space.max_length()
    }

    fn restart(&mut self) {
        self.length = self.space.min_length();
        self.position = 0;
        self.tld_index = 0;
    }

    fn charset_size(&self) -> Option<u64> {
        Some(self.space.charset_size())
    }
}

#[derive(Debug, Clone)]
pub struct WordGenerator {
    words: WordList,
    tlds: Vec<String>,
    word_index: usize,
    tld_index: usize,
}

impl WordGenerator {
    pub fn new(words: WordList, tlds: Vec<String>) -> Result<Self, GeneratorError> {
        if words.is_empty() {
            return Err(GeneratorError::EmptyWordList);
        }
        if tlds.is_empty() {
            return Err(GeneratorError::NoTlds);
        }
        Ok(Self {
            words,
            tlds,
            word_index: 0,
            tld_index: 0,
        })
    }

    fn step(&mut self) {
        self.tld_index += 1;
        if self.tld_index == self.tlds.len() {
            self.tld_index = 0;
            self.word_index += 1;
        }
    }
}

impl CandidateSource for WordGenerator {
    fn mode(&self) -> Mode {
        Mode::Word
    }

    fn initial_cursor(&self) -> Cursor {
        Cursor::Word {
            word_index: 0,
            tld_index: 0,
        }
    }

    fn cursor(&self) -> Cursor {
        Cursor::Word {
            word_index: self.word_index,
            tld_index: self.tld_index,
        }
    }

    fn seek(&mut self, cursor: Cursor) -> Result<(), GeneratorError> {
        let Cursor::Word {
            word_index,
            tld_index,
        } = cursor
        else {
            return Err(GeneratorError::ModeMismatch {
                expected: Mode::Word,
                found: cursor.mode(),
            });
        };

        let at_end = word_index == self.words.len() && tld_index == 0;
        let in_range = word_index < self.words.len() && tld_index < self.tlds.len();
        if !(at_end || in_range) {
            return Err(GeneratorError::CursorOutOfRange(cursor));
        }

        self.word_index = word_index;
        self.tld_index = tld_index;
        Ok(())
    }

    fn next_batch(&mut self, n: usize) -> Batch {
        let mut candidates = Vec::with_capacity(n);
        while candidates.len() < n && !self.is_exhausted() {
            if let Some(entry) = self.words.get(self.word_index) {
                candidates.push(Candidate {
                    label: entry.word.clone(),
                    tld: self.tlds[self.tld_index].clone(),
                    mode: Mode::Word,
                    part_of_speech: Some(entry.pos),
                });
            }
            self.step();
        }
        Batch {
            candidates,
            exhausted: self.is_exhausted(),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.word_index >= self.words.len()
    }

    fn restart(&mut self) {
        self.word_index = 0;
        self.tld_index = 0;
    }

    fn charset_size(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartOfSpeech;

    fn tlds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn domains(batch: &Batch) -> Vec<String> {
        batch.candidates.iter().map(Candidate::domain).collect()
    }

    #[test]
    fn label_at_is_charset_ordered() {
        let space = LabelSpace::new("abc", 1, 3).unwrap();
        assert_eq!(space.label_at(1, 0), "a");
        assert_eq!(space.label_at(2, 0), "aa");
        assert_eq!(space.label_at(2, 1), "ab");
        assert_eq!(space.label_at(2, 3), "ba");
        assert_eq!(space.label_at(2, 8), "cc");
        assert_eq!(space.combinations(3), 27);
    }

    #[test]
    fn rejects_bad_charsets() {
        assert_eq!(LabelSpace::new("", 1, 2).unwrap_err(), GeneratorError::EmptyCharset);
        assert_eq!(LabelSpace::new("aba", 1, 2).unwrap_err(), GeneratorError::DuplicateSymbol('a'));
        assert_eq!(LabelSpace::new("a-b", 1, 2).unwrap_err(), GeneratorError::InvalidSymbol('-'));
        assert!(matches!(
            LabelSpace::new("ab", 3, 2),
            Err(GeneratorError::InvalidLengthRange { .. })
        ));
        assert_eq!(
            LabelSpace::new("abcdefghijklmnopqrstuvwxyz", 1, 20).unwrap_err(),
            GeneratorError::SpaceTooLarge(20)
        );
    }

    #[test]
    fn short_mode_iterates_tld_innermost_then_label_then_length() {
        let space = LabelSpace::new("ab", 1, 2).unwrap();
        let mut generator = ShortLabelGenerator::new(space, tlds(&["com", "net"])).unwrap();
        let batch = generator.next_batch(6);
        assert_eq!(
            domains(&batch),
            ["a.com", "a.net", "b.com", "b.net", "aa.com", "aa.net"]
        );
        assert!(!batch.exhausted);
        assert_eq!(
            generator.cursor(),
            Cursor::Short {
                length: 2,
                position: 1,
                tld_index: 0
            }
        );
    }

    #[test]
    fn short_mode_reports_exhaustion_explicitly() {
        let space = LabelSpace::new("ab", 1, 1).unwrap();
        let mut generator = ShortLabelGenerator::new(space, tlds(&["com"])).unwrap();
        let batch = generator.next_batch(10);
        assert_eq!(domains(&batch), ["a.com", "b.com"]);
        assert!(batch.exhausted);

        let empty = generator.next_batch(10);
        assert!(empty.candidates.is_empty());
        assert!(empty.exhausted);

        generator.restart();
        assert_eq!(generator.cursor(), generator.initial_cursor());
        assert_eq!(domains(&generator.next_batch(1)), ["a.com"]);
    }

    #[test]
    fn resuming_from_cursor_continues_the_sequence() {
        let space = LabelSpace::new("abc", 1, 3).unwrap();
        let mut first = ShortLabelGenerator::new(space.clone(), tlds(&["com", "io"])).unwrap();
        let mut reference = ShortLabelGenerator::new(space.clone(), tlds(&["com", "io"])).unwrap();
        let all = reference.next_batch(60);

        for split in [1usize, 5, 6, 17, 59] {
            first.restart();
            let head = first.next_batch(split);
            let mut resumed = ShortLabelGenerator::new(space.clone(), tlds(&["com", "io"])).unwrap();
            resumed.seek(first.cursor()).unwrap();
            let next = resumed.next_batch(1);
            assert_eq!(head.candidates.last(), all.candidates.get(split - 1));
            assert_eq!(next.candidates.first(), all.candidates.get(split));
        }
    }

    #[test]
    fn seek_rejects_cursors_past_the_space() {
        let space = LabelSpace::new("ab", 1, 2).unwrap();
        let mut generator = ShortLabelGenerator::new(space, tlds(&["com"])).unwrap();
        let past = Cursor::Short {
            length: 1,
            position: 2,
            tld_index: 0,
        };
        assert_eq!(generator.seek(past), Err(GeneratorError::CursorOutOfRange(past)));
        assert!(generator
            .seek(Cursor::Short {
                length: 3,
                position: 0,
                tld_index: 0
            })
            .is_ok());
        assert!(generator.is_exhausted());
        assert!(matches!(
            generator.seek(Cursor::Word {
                word_index: 0,
                tld_index: 0
            }),
            Err(GeneratorError::ModeMismatch { .. })
        ));
    }

    #[test]
    fn exhausted_cursor_survives_a_restart() {
        let space = LabelSpace::new("ab", 1, 2).unwrap();
        let mut generator = ShortLabelGenerator::new(space.clone(), tlds(&["com", "io"])).unwrap();
        assert!(generator.next_batch(100).exhausted);
        let end = generator.cursor();
        assert_eq!(
            end,
            Cursor::Short {
                length: 3,
                position: 0,
                tld_index: 0
            }
        );

        let stored = serde_json::to_string(&end).unwrap();
        let mut resumed = ShortLabelGenerator::new(space, tlds(&["com", "io"])).unwrap();
        resumed.seek(serde_json::from_str(&stored).unwrap()).unwrap();
        assert!(resumed.is_exhausted());
        assert!(resumed.next_batch(10).candidates.is_empty());

        let beyond = Cursor::Short {
            length: 3,
            position: 1,
            tld_index: 0,
        };
        assert_eq!(resumed.seek(beyond), Err(GeneratorError::CursorOutOfRange(beyond)));
    }

    #[test]
    fn word_mode_walks_words_then_tlds() {
        let words = WordList::from_pos_lists([
            (PartOfSpeech::Verb, vec!["run".to_string()]),
            (PartOfSpeech::Noun, vec!["cat".to_string(), "run".to_string()]),
        ]);
        let mut generator = WordGenerator::new(words, tlds(&["com", "net"])).unwrap();
        let batch = generator.next_batch(3);
        assert_eq!(domains(&batch), ["cat.com", "cat.net", "run.com"]);
        assert_eq!(batch.candidates[2].part_of_speech, Some(PartOfSpeech::Noun));

        let rest = generator.next_batch(3);
        assert_eq!(domains(&rest), ["run.net"]);
        assert!(rest.exhausted);
        assert_eq!(
            generator.cursor(),
            Cursor::Word {
                word_index: 2,
                tld_index: 0
            }
        );
    }

    #[test]
    fn cursor_serializes_with_mode_tag() {
        let cursor = Cursor::Short {
            length: 3,
            position: 42,
            tld_index: 1,
        };
        let json = serde_json::to_value(cursor).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"mode": "short", "length": 3, "position_within_length": 42, "tld_index": 1})
        );
        let back: Cursor = serde_json::from_value(json).unwrap();
        assert_eq!(back, cursor);
    }
}
