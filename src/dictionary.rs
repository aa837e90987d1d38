//! Secret word list
//!
//! One word per line, uppercased on load. Blank lines are skipped.

use crate::error::{HangmanError, Result};
use crate::mailbox::MAX_WORD_LEN;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Ordered, immutable list of secret words
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dictionary {
    words: Vec<String>,
}

impl Dictionary {
    /// Load from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(HangmanError::Dictionary)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load from any line-oriented reader (e.g. stdin)
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut words = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(HangmanError::Dictionary)?;
            if let Some(word) = Self::parse_line(index + 1, &line)? {
                words.push(word);
            }
        }
        Ok(Self { words })
    }

    /// Build from in-memory words, applying the same rules as a file
    pub fn from_words<I, S>(words: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for (index, word) in words.into_iter().enumerate() {
            if let Some(word) = Self::parse_line(index + 1, word.as_ref())? {
                parsed.push(word);
            }
        }
        Ok(Self { words: parsed })
    }

    fn parse_line(line: usize, raw: &str) -> Result<Option<String>> {
        let word = raw.trim_end_matches(&['\r', '\n'][..]);
        if word.trim().is_empty() {
            return Ok(None);
        }
        if !word.is_ascii() {
            return Err(HangmanError::InvalidWord {
                line,
                reason: "only ASCII words can be played".to_string(),
            });
        }
        if word.len() > MAX_WORD_LEN {
            return Err(HangmanError::InvalidWord {
                line,
                reason: format!("{} characters, max {}", word.len(), MAX_WORD_LEN),
            });
        }
        if !word.bytes().any(|b| b.is_ascii_alphabetic()) {
            return Err(HangmanError::InvalidWord {
                line,
                reason: "no letters to guess".to_string(),
            });
        }
        Ok(Some(word.to_ascii_uppercase()))
    }

    /// Word for a session's `index`-th game
    pub fn get(&self, index: usize) -> Option<&str> {
        self.words.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
