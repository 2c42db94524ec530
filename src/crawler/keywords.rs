//! Keyword file handling.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum KeywordError {
    #[error("Failed to read keyword file {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("Failed to rewrite keyword file {path}: {source}")]
    Write { path: String, source: io::Error },
}

pub type KeywordResult<T> = Result<T, KeywordError>;

/// A trimmed, non-empty search term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Keyword(String);

impl Keyword {
    /// Returns `None` for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Keyword(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory name for this keyword's downloads (double quotes removed).
    pub fn dir_name(&self) -> String {
        self.0.replace('"', "")
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trims every line, drops blanks, then sorts and deduplicates.
pub fn normalize(content: &str) -> Vec<Keyword> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    content
        .lines()
        .filter_map(Keyword::new)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Reads the keyword file and writes the normalized list back.
///
/// A missing file is not an error: it is logged and yields no keywords.
pub fn load_keywords(path: &Path) -> KeywordResult<Vec<Keyword>> {
    if !path.exists() {
        warn!("Keyword file not found: {}", path.display());
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).map_err(|source| KeywordError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let keywords = normalize(&content);

    let rewritten: String = keywords.iter().map(|k| format!("{}\n", k)).collect();
    fs::write(path, rewritten).map_err(|source| KeywordError::Write {
        path: path.display().to_string(),
        source,
    })?;

    info!("Loaded {} keywords from {}", keywords.len(), path.display());
    Ok(keywords)
}
