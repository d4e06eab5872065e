//! Keyword matching against item text.
//!
//! Matching is case-insensitive and, by default, a plain substring test: the
//! keyword `cat` matches `category`. [`MatchMode::WholeWord`] restricts hits to
//! occurrences bordered by non-alphanumeric characters or the ends of the text.

use crate::KeywordSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Substring,
    WholeWord,
}

#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: KeywordSet,
    mode: MatchMode,
}

impl KeywordMatcher {
    pub fn new(keywords: KeywordSet, mode: MatchMode) -> Self {
        Self { keywords, mode }
    }

    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Returns the first keyword, in configured order, found in `text`.
    pub fn matches(&self, text: Option<&str>) -> Option<&str> {
        let text = text?.to_lowercase();
        if text.is_empty() {
            return None;
        }

        self.keywords.iter().find(|keyword| match self.mode {
            MatchMode::Substring => text.contains(keyword),
            MatchMode::WholeWord => contains_word(&text, keyword),
        })
    }
}

/// Substring match with the default [`MatchMode::Substring`].
pub fn matches<'k>(text: Option<&str>, keywords: &'k KeywordSet) -> Option<&'k str> {
    let text = text?.to_lowercase();
    if text.is_empty() {
        return None;
    }

    keywords.iter().find(|keyword| text.contains(keyword))
}

fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(start, found)| {
        let before = text[..start].chars().next_back();
        let after = text[start + found.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
