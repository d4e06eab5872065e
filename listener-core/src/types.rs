use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const REDDIT_BASE_URL: &str = "https://www.reddit.com";
const COMMENT_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Submission,
    Comment,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Submission => write!(f, "post"),
            ItemKind::Comment => write!(f, "comment"),
        }
    }
}

/// A post or comment observed on a monitored subreddit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    /// Title only exists for submissions.
    pub title: Option<String>,
    /// Text the keyword matcher runs against.
    pub text: Option<String>,
    pub source_channel: String,
    pub permalink: String,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Builds a submission; title and self-text are joined for matching.
    pub fn submission(
        id: impl Into<String>,
        title: impl Into<String>,
        selftext: Option<String>,
        source_channel: impl Into<String>,
        permalink: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        let text = match selftext.filter(|body| !body.trim().is_empty()) {
            Some(body) => format!("{title}\n{body}"),
            None => title.clone(),
        };

        Self {
            id: id.into(),
            kind: ItemKind::Submission,
            title: Some(title),
            text: Some(text),
            source_channel: source_channel.into(),
            permalink: permalink.into(),
            created_at,
        }
    }

    pub fn comment(
        id: impl Into<String>,
        body: Option<String>,
        source_channel: impl Into<String>,
        permalink: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Comment,
            title: None,
            text: body,
            source_channel: source_channel.into(),
            permalink: permalink.into(),
            created_at,
        }
    }

    pub fn url(&self) -> String {
        if self.permalink.starts_with("http") {
            self.permalink.clone()
        } else {
            format!("{}{}", REDDIT_BASE_URL, self.permalink)
        }
    }
}

/// Case-insensitive keywords in configured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    terms: Vec<String>,
}

impl KeywordSet {
    /// Trims and lower-cases every term, dropping blanks and repeats.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for term in terms {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() && !normalized.contains(&term) {
                normalized.push(term);
            }
        }
        Self { terms: normalized }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// What happened to an item the first time it was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Processed without matching any keyword.
    Ignored,
    /// Matched and the alert was delivered.
    Notified,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ignored => "ignored",
            Disposition::Notified => "notified",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ignored" => Some(Disposition::Ignored),
            "notified" => Some(Disposition::Notified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenRecord {
    pub id: String,
    pub disposition: Disposition,
    pub first_seen_at: DateTime<Utc>,
}

impl SeenRecord {
    pub fn notified(&self) -> bool {
        self.disposition == Disposition::Notified
    }
}

/// An unseen item together with the first keyword it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEvent {
    pub item: Item,
    pub keyword: String,
}

impl MatchEvent {
    pub fn new(item: Item, keyword: impl Into<String>) -> Self {
        Self {
            item,
            keyword: keyword.into(),
        }
    }

    pub fn headline(&self) -> String {
        let kind = match self.item.kind {
            ItemKind::Submission => "New Post",
            ItemKind::Comment => "New Comment",
        };
        format!(
            "{} in r/{} matching \"{}\"",
            kind, self.item.source_channel, self.keyword
        )
    }

    pub fn body(&self) -> String {
        match self.item.kind {
            ItemKind::Submission => format!(
                "Title: {}\nURL: {}",
                self.item.title.as_deref().unwrap_or_default(),
                self.item.url()
            ),
            ItemKind::Comment => {
                let text = self.item.text.as_deref().unwrap_or_default();
                let preview: String = text.chars().take(COMMENT_PREVIEW_CHARS).collect();
                format!("Comment: {}...\nURL: {}", preview, self.item.url())
            }
        }
    }
}
