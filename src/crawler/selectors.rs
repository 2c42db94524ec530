//! Page-structure selectors for each engine.
//!
//! Engine markup drifts constantly, so every lookup is an ordered chain of
//! strategies where the first one yielding at least one element wins. Updating
//! for new markup means editing the tables below.

use std::fmt;

use tracing::{debug, warn};

use crate::crawler::browser::{BrowserDriver, DriverResult};
use crate::crawler::site::Engine;

/// A single element-location strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    XPath(&'static str),
    Css(&'static str),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::XPath(path) => write!(f, "xpath:{}", path),
            Selector::Css(css) => write!(f, "css:{}", css),
        }
    }
}

/// Ordered fallback list of selectors.
#[derive(Debug, Clone, Copy)]
pub struct SelectorChain(pub &'static [Selector]);

impl SelectorChain {
    pub fn selectors(&self) -> &'static [Selector] {
        self.0
    }

    /// Returns the elements matched by the first selector that finds any.
    ///
    /// A failing lookup is logged and the next selector is tried; an empty
    /// vector means nothing in the chain matched.
    pub async fn find_first<D: BrowserDriver>(&self, driver: &D) -> DriverResult<Vec<D::Element>> {
        for selector in self.0 {
            match driver.find_elements(selector).await {
                Ok(found) if !found.is_empty() => {
                    debug!("Selector {} matched {} elements", selector, found.len());
                    return Ok(found);
                }
                Ok(_) => debug!("Selector {} matched nothing", selector),
                Err(e) if e.is_session_lost() => return Err(e),
                Err(e) => warn!("Selector {} failed: {}", selector, e),
            }
        }
        Ok(Vec::new())
    }
}

/// How the results page is paged through before scraping thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPlan {
    /// Keep paging down until the offset stops changing for `patience` samples.
    UntilStalled { patience: usize },
    /// Send a fixed number of page-down presses.
    Fixed { presses: usize },
}

/// Which of the matched viewer elements are read in full-resolution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerTake {
    First,
    All,
}

#[derive(Debug, Clone, Copy)]
pub struct ThumbnailProfile {
    pub scroll: ScrollPlan,
    pub images: SelectorChain,
    /// Sources starting with this character are dropped.
    pub skip_prefix: Option<char>,
}

#[derive(Debug, Clone, Copy)]
pub struct FullResProfile {
    pub click_targets: SelectorChain,
    pub viewer: SelectorChain,
    pub take: ViewerTake,
    /// Host serving placeholder proxies instead of the real image.
    pub static_asset_host: Option<&'static str>,
    pub patience: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineProfile {
    pub thumbnail: ThumbnailProfile,
    pub full_resolution: FullResProfile,
}

const GOOGLE_THUMBNAILS: &[Selector] = &[
    Selector::XPath(r#"//div[@jsname="dTDiAc"]/div[@jsname="qQjpJ"]//img"#),
];

const GOOGLE_CLICK_TARGETS: &[Selector] = &[
    Selector::XPath(r#"//div[@jsname="dTDiAc"]"#),
    Selector::XPath(r#"//div[contains(@jsname, "dTDiAc")]"#),
    Selector::XPath(r#"//div[contains(@class, "isv-r")]//img"#),
];

const GOOGLE_VIEWER: &[Selector] = &[
    Selector::XPath(r#"//div[@jsname="figiqf"]//img[not(contains(@src,"gstatic.com"))]"#),
    Selector::XPath(r#"//div[contains(@jsname, "figiqf")]//img[not(contains(@src,"gstatic.com"))]"#),
    Selector::XPath(r#"//div[contains(@class, "isv-r")]//img[not(contains(@src,"gstatic.com"))]"#),
];

const NAVER_TILES: &[Selector] = &[
    Selector::XPath(r#"//div[@class="tile_item _fe_image_tab_content_tile"]//img[@class="_fe_image_tab_content_thumbnail_image"]"#),
    Selector::XPath(r#"//div[contains(@class, "tile_item")]//img[contains(@class, "thumbnail_image")]"#),
    Selector::XPath(r#"//img[contains(@class, "thumbnail_image")]"#),
];

const NAVER_THUMBNAILS: &[Selector] = &[
    Selector::XPath(r#"//div[@class="tile_item _fe_image_tab_content_tile"]//img[@class="_fe_image_tab_content_thumbnail_image"]"#),
    Selector::XPath(r#"//div[contains(@class, "tile_item")]//img[contains(@class, "thumbnail_image")]"#),
    Selector::XPath(r#"//img[contains(@class, "thumbnail_image")]"#),
    Selector::Css("img.thumbnail_image, img._fe_image_tab_content_thumbnail_image"),
];

const NAVER_VIEWER: &[Selector] = &[
    Selector::XPath(r#"//img[@class="_fe_image_viewer_image_fallback_target"]"#),
    Selector::XPath(r#"//img[contains(@class, "_fe_image_viewer_image")]"#),
    Selector::XPath(r#"//img[contains(@class, "image__image")]"#),
];

static GOOGLE: EngineProfile = EngineProfile {
    thumbnail: ThumbnailProfile {
        scroll: ScrollPlan::UntilStalled { patience: 50 },
        images: SelectorChain(GOOGLE_THUMBNAILS),
        skip_prefix: None,
    },
    full_resolution: FullResProfile {
        click_targets: SelectorChain(GOOGLE_CLICK_TARGETS),
        viewer: SelectorChain(GOOGLE_VIEWER),
        take: ViewerTake::First,
        static_asset_host: Some("gstatic.com"),
        patience: 100,
    },
};

static NAVER: EngineProfile = EngineProfile {
    thumbnail: ThumbnailProfile {
        scroll: ScrollPlan::Fixed { presses: 60 },
        images: SelectorChain(NAVER_THUMBNAILS),
        // lazy-loaded tiles still carry a data: placeholder
        skip_prefix: Some('d'),
    },
    full_resolution: FullResProfile {
        click_targets: SelectorChain(NAVER_TILES),
        viewer: SelectorChain(NAVER_VIEWER),
        take: ViewerTake::All,
        static_asset_host: None,
        patience: 100,
    },
};

/// Selector tables and pagination settings for an engine.
pub fn profile(engine: Engine) -> &'static EngineProfile {
    match engine {
        Engine::Google => &GOOGLE,
        Engine::Naver => &NAVER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_plans() {
        assert_eq!(profile(Engine::Google).thumbnail.scroll, ScrollPlan::UntilStalled { patience: 50 });
        assert_eq!(profile(Engine::Naver).thumbnail.scroll, ScrollPlan::Fixed { presses: 60 });
        assert_eq!(profile(Engine::Google).full_resolution.patience, 100);
        assert_eq!(profile(Engine::Naver).full_resolution.patience, 100);
    }

    #[test]
    fn test_naver_chain_ends_with_css_fallback() {
        let chain = profile(Engine::Naver).thumbnail.images.selectors();
        assert_eq!(chain.len(), 4);
        assert!(matches!(chain[3], Selector::Css(_)));
        assert_eq!(profile(Engine::Naver).thumbnail.skip_prefix, Some('d'));
        assert_eq!(profile(Engine::Google).thumbnail.skip_prefix, None);
    }
}
