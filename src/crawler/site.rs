//! Search engines and the four crawl variants run against them.

use std::fmt;

use url::form_urlencoded::byte_serialize;

/// Search engine an image search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Google,
    Naver,
}

impl Engine {
    /// Display name, also used for file prefixes and marker names.
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Google => "google",
            Engine::Naver => "naver",
        }
    }

    /// Query fragment appended for face-search mode.
    pub fn face_modifier(&self) -> &'static str {
        match self {
            Engine::Google => "&tbs=itp:face",
            Engine::Naver => "&face=1",
        }
    }

    pub fn all() -> [Engine; 2] {
        [Engine::Google, Engine::Naver]
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One crawl variant: an engine plus thumbnail or full-resolution extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Site {
    GoogleThumbnail,
    NaverThumbnail,
    GoogleFullRes,
    NaverFullRes,
}

impl Site {
    pub fn new(engine: Engine, full_resolution: bool) -> Self {
        match (engine, full_resolution) {
            (Engine::Google, false) => Site::GoogleThumbnail,
            (Engine::Google, true) => Site::GoogleFullRes,
            (Engine::Naver, false) => Site::NaverThumbnail,
            (Engine::Naver, true) => Site::NaverFullRes,
        }
    }

    pub fn engine(&self) -> Engine {
        match self {
            Site::GoogleThumbnail | Site::GoogleFullRes => Engine::Google,
            Site::NaverThumbnail | Site::NaverFullRes => Engine::Naver,
        }
    }

    pub fn is_full_resolution(&self) -> bool {
        matches!(self, Site::GoogleFullRes | Site::NaverFullRes)
    }

    /// Display name shared by the thumbnail and full-resolution variants.
    pub fn name(&self) -> &'static str {
        self.engine().name()
    }

    pub fn face_modifier(&self) -> &'static str {
        self.engine().face_modifier()
    }

    /// Builds the image-search URL for a keyword.
    ///
    /// # Arguments
    ///
    /// * `keyword`: Raw search term, URL-encoded here.
    /// * `modifier`: Extra query fragment (empty, or the face-search modifier).
    pub fn search_url(&self, keyword: &str, modifier: &str) -> String {
        let query: String = byte_serialize(keyword.as_bytes()).collect();
        match self {
            Site::GoogleThumbnail => format!(
                "https://www.google.com/search?q={}&source=lnms&tbm=isch{}",
                query, modifier
            ),
            Site::GoogleFullRes => format!(
                "https://www.google.com/search?q={}&tbm=isch{}",
                query, modifier
            ),
            Site::NaverThumbnail | Site::NaverFullRes => format!(
                "https://search.naver.com/search.naver?where=image&sm=tab_jum&query={}{}",
                query, modifier
            ),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_full_resolution() {
            write!(f, "{}_full", self.name())
        } else {
            f.write_str(self.name())
        }
    }
}
