//! Owner-Name Filters
//!
//! Decide which answer records are subject to health filtering. A filter
//! either matches the owner name literally or by regular expression.

use regex::Regex;

#[derive(Debug, Clone)]
pub enum NameFilter {
    /// Literal match, insensitive to a trailing root dot on either side
    Exact(String),
    Pattern(Regex),
}

impl NameFilter {
    pub fn exact(name: impl Into<String>) -> Self {
        Self::Exact(name.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    pub fn matches(&self, owner: &str) -> bool {
        match self {
            Self::Exact(name) => owner.trim_end_matches('.') == name.trim_end_matches('.'),
            Self::Pattern(re) => re.is_match(owner),
        }
    }
}

/// True when any filter admits the owner name.
pub fn match_any(filters: &[NameFilter], owner: &str) -> bool {
    filters.iter().any(|f| f.matches(owner))
}
