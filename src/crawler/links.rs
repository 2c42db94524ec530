//! Image references and the ordered, deduplicated link set produced by extraction.

use std::collections::HashSet;
use std::fmt;

/// MIME subtype declared by an inline `data:` image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineFormat {
    Jpeg,
    Png,
}

impl InlineFormat {
    /// File extension written for this payload.
    pub fn extension(&self) -> &'static str {
        match self {
            InlineFormat::Jpeg => "jpg",
            InlineFormat::Png => "png",
        }
    }
}

/// A single image source scraped from a results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Anything fetched over the network.
    Remote(String),
    /// A base64 `data:` URL carrying the image bytes.
    Inline { format: InlineFormat, source: String },
}

impl ImageRef {
    /// Classifies a raw `src` value.
    ///
    /// Only base64 jpeg and png payloads are recognised as inline; every other
    /// string, other `data:` URLs included, is treated as remote.
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        if source.starts_with("data:image/jpeg;base64") {
            ImageRef::Inline { format: InlineFormat::Jpeg, source }
        } else if source.starts_with("data:image/png;base64") {
            ImageRef::Inline { format: InlineFormat::Png, source }
        } else {
            ImageRef::Remote(source)
        }
    }

    /// The exact reference string this was parsed from.
    pub fn as_str(&self) -> &str {
        match self {
            ImageRef::Remote(url) => url,
            ImageRef::Inline { source, .. } => source,
        }
    }

    /// The encoded part of an inline reference (everything after the first comma).
    pub fn inline_payload(&self) -> Option<&str> {
        match self {
            ImageRef::Inline { source, .. } => source.split_once(',').map(|(_, data)| data),
            ImageRef::Remote(_) => None,
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // data URLs can be hundreds of kilobytes; keep log lines readable
        let text = self.as_str();
        match text.char_indices().nth(50) {
            Some((cut, _)) => write!(f, "{}...", &text[..cut]),
            None => write!(f, "{}", text),
        }
    }
}

/// Ordered collection of image references where the first occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct LinkSet {
    refs: Vec<ImageRef>,
    seen: HashSet<String>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the reference unless the exact same string is already present.
    /// Returns `true` when it was added.
    pub fn insert(&mut self, image: ImageRef) -> bool {
        if self.seen.contains(image.as_str()) {
            return false;
        }
        self.seen.insert(image.as_str().to_string());
        self.refs.push(image);
        true
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageRef> {
        self.refs.iter()
    }
}

impl FromIterator<ImageRef> for LinkSet {
    fn from_iter<I: IntoIterator<Item = ImageRef>>(iter: I) -> Self {
        let mut set = LinkSet::new();
        for image in iter {
            set.insert(image);
        }
        set
    }
}

impl<'a> IntoIterator for &'a LinkSet {
    type Item = &'a ImageRef;
    type IntoIter = std::slice::Iter<'a, ImageRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.refs.iter()
    }
}
