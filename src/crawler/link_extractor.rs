//! Link extraction
//!
//! Drives a browser session through an image-search results page and returns
//! the image sources found there, either the grid thumbnails or, in
//! full-resolution mode, the images shown by the result viewer while paging
//! through it. Extraction never fails: errors are logged and whatever was
//! collected up to that point is returned.

use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::crawler::browser::{Browser, BrowserDriver, DriverResult, NavKey};
use crate::crawler::config_loader::Pacing;
use crate::crawler::keywords::Keyword;
use crate::crawler::links::{ImageRef, LinkSet};
use crate::crawler::selectors::{self, FullResProfile, ScrollPlan, SelectorChain, ThumbnailProfile, ViewerTake};
use crate::crawler::site::Site;
use crate::crawler::worker_pool::Cancellation;

/// Link cap for full-resolution mode when no limit is set.
pub const FULL_RES_UNLIMITED: usize = 10_000;

/// Counts consecutive scroll samples that did not move the page.
#[derive(Debug)]
struct StallTracker {
    last: f64,
    stalls: usize,
    patience: usize,
}

impl StallTracker {
    fn new(patience: usize) -> Self {
        Self { last: 0.0, stalls: 0, patience }
    }

    /// Records a sample; returns `true` once patience is exhausted.
    fn observe(&mut self, offset: f64) -> bool {
        if offset == self.last {
            self.stalls += 1;
        } else {
            self.stalls = 0;
            self.last = offset;
        }
        self.stalls >= self.patience
    }
}

pub struct LinkExtractor {
    pacing: Pacing,
    cancel: Cancellation,
}

impl LinkExtractor {
    pub fn new(pacing: Pacing, cancel: Cancellation) -> Self {
        Self { pacing, cancel }
    }

    /// Collects image links for `keyword` from `site` and closes the session.
    ///
    /// # Arguments
    ///
    /// * `browser`: Session to drive; an unavailable one yields an empty set.
    /// * `modifier`: Extra query fragment for the search URL.
    /// * `limit`: Full-resolution link cap, 0 for unlimited. Thumbnail mode
    ///   always takes the whole page.
    pub async fn extract<D: BrowserDriver>(
        &self,
        browser: Browser<D>,
        keyword: &Keyword,
        modifier: &str,
        site: Site,
        limit: usize,
    ) -> LinkSet {
        let mut links = LinkSet::new();
        let driver = match browser.driver() {
            Ok(driver) => driver,
            Err(e) => {
                error!("Skipping {} for '{}': {}", site, keyword, e);
                return links;
            }
        };

        let url = site.search_url(keyword.as_str(), modifier);
        let profile = selectors::profile(site.engine());
        info!("Collecting links from {} for '{}'", site, keyword);

        let outcome = if site.is_full_resolution() {
            self.full_resolution(driver, &url, &profile.full_resolution, limit, &mut links)
                .await
        } else {
            self.thumbnails(driver, &url, &profile.thumbnail, &mut links).await
        };

        if let Err(e) = outcome {
            error!(
                "Collecting links from {} for '{}' aborted after {} links: {}",
                site,
                keyword,
                links.len(),
                e
            );
        }

        browser.close().await;
        info!("Collect links done. Site: {}, Keyword: {}, Total: {}", site, keyword, links.len());
        links
    }

    async fn thumbnails<D: BrowserDriver>(
        &self,
        driver: &D,
        url: &str,
        profile: &ThumbnailProfile,
        links: &mut LinkSet,
    ) -> DriverResult<()> {
        driver.navigate(url).await?;
        sleep(self.pacing.page_load).await;

        debug!("Scrolling down");
        match profile.scroll {
            ScrollPlan::UntilStalled { patience } => {
                let mut tracker = StallTracker::new(patience);
                while !self.cancel.is_cancelled() {
                    driver.send_key(NavKey::PageDown).await?;
                    sleep(self.pacing.scroll_step).await;
                    if tracker.observe(driver.scroll_offset().await?) {
                        break;
                    }
                }
            }
            ScrollPlan::Fixed { presses } => {
                for _ in 0..presses {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    driver.send_key(NavKey::PageDown).await?;
                    sleep(self.pacing.scroll_step).await;
                }
            }
        }

        debug!("Scraping links");
        let elements = profile.images.find_first(driver).await?;
        debug!("Found {} image elements", elements.len());

        for element in &elements {
            let source = match driver.attribute(element, "src").await {
                Ok(Some(source)) => source,
                Ok(None) => continue,
                Err(e) if e.is_stale() => continue,
                Err(e) => return Err(e),
            };
            if profile.skip_prefix.is_some_and(|prefix| source.starts_with(prefix)) {
                continue;
            }
            links.insert(ImageRef::parse(source));
        }
        Ok(())
    }

    async fn full_resolution<D: BrowserDriver>(
        &self,
        driver: &D,
        url: &str,
        profile: &FullResProfile,
        limit: usize,
        links: &mut LinkSet,
    ) -> DriverResult<()> {
        driver.navigate(url).await?;
        sleep(self.pacing.page_load).await;

        if !self.click_first_result(driver, profile.click_targets).await? {
            warn!("Could not open the first result with any click target");
            return Ok(());
        }
        sleep(self.pacing.after_click).await;

        let cap = if limit == 0 { FULL_RES_UNLIMITED } else { limit };
        let mut tracker = StallTracker::new(profile.patience);

        while links.len() < cap {
            if self.cancel.is_cancelled() {
                info!("Cancelled with {} links collected", links.len());
                break;
            }

            match self.collect_viewer(driver, profile, cap, links).await {
                Ok(()) => {}
                Err(e) if e.is_stale() => {}
                Err(e) if e.is_session_lost() => return Err(e),
                Err(e) => warn!("Failed to read the image viewer: {}", e),
            }

            if tracker.observe(driver.scroll_offset().await?) {
                info!("Scroll patience ({}) exhausted", profile.patience);
                break;
            }
            driver.send_key(NavKey::ArrowRight).await?;
        }
        Ok(())
    }

    /// Tries each click target in turn, refreshing the page between failed
    /// attempts. Returns `false` when nothing could be clicked.
    async fn click_first_result<D: BrowserDriver>(&self, driver: &D, targets: SelectorChain) -> DriverResult<bool> {
        for selector in targets.selectors() {
            for attempt in 1..=self.pacing.click_retries {
                match driver.click(selector, self.pacing.click_wait).await {
                    Ok(element) => {
                        if let Err(e) = driver.highlight(&element).await {
                            debug!("Highlight failed: {}", e);
                        }
                        debug!("Opened first result with {}", selector);
                        return Ok(true);
                    }
                    Err(e) if e.is_session_lost() => return Err(e),
                    Err(e) => {
                        warn!(
                            "Click on {} failed (attempt {}/{}): {}",
                            selector, attempt, self.pacing.click_retries, e
                        );
                        driver.refresh().await?;
                        sleep(self.pacing.refresh_settle).await;
                    }
                }
            }
        }
        Ok(false)
    }

    /// Waits for the viewer to show images and adds their sources.
    async fn collect_viewer<D: BrowserDriver>(
        &self,
        driver: &D,
        profile: &FullResProfile,
        cap: usize,
        links: &mut LinkSet,
    ) -> DriverResult<()> {
        let deadline = Instant::now() + self.pacing.viewer_wait;
        let mut elements = loop {
            let found = profile.viewer.find_first(driver).await?;
            if !found.is_empty() || Instant::now() >= deadline || self.cancel.is_cancelled() {
                break found;
            }
            sleep(self.pacing.poll_interval).await;
        };

        if elements.is_empty() {
            debug!("No viewer image within {:?}", self.pacing.viewer_wait);
            return Ok(());
        }
        if profile.take == ViewerTake::First {
            elements.truncate(1);
        }

        for element in &elements {
            if links.len() >= cap {
                break;
            }
            if let Err(e) = driver.highlight(element).await {
                debug!("Highlight failed: {}", e);
            }
            let Some(source) = driver.attribute(element, "src").await? else {
                continue;
            };
            if is_static_asset(&source, profile.static_asset_host) {
                debug!("Skipping static asset {}", source);
                continue;
            }
            let image = ImageRef::parse(source);
            let shown = image.to_string();
            if links.insert(image) {
                debug!("{}: {}", links.len(), shown);
            }
        }
        Ok(())
    }
}

/// Whether `source` is served by `host` or one of its subdomains.
fn is_static_asset(source: &str, host: Option<&str>) -> bool {
    let Some(host) = host else {
        return false;
    };
    url::Url::parse(source)
        .ok()
        .and_then(|url| url.host_str().map(|h| h == host || h.ends_with(&format!(".{}", host))))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::browser::DriverError;
    use crate::crawler::selectors::Selector;
    use crate::crawler::site::Engine;
    use crate::crawler::testing::{FakeDriver, NO_SRC};
    use std::time::Duration;

    fn pacing() -> Pacing {
        Pacing {
            page_load: Duration::ZERO,
            scroll_step: Duration::ZERO,
            poll_interval: Duration::ZERO,
            viewer_wait: Duration::ZERO,
            click_wait: Duration::ZERO,
            click_retries: 3,
            refresh_settle: Duration::ZERO,
            after_click: Duration::ZERO,
        }
    }

    fn extractor() -> LinkExtractor {
        LinkExtractor::new(pacing(), Cancellation::new())
    }

    fn keyword() -> Keyword {
        Keyword::new("red fox").unwrap()
    }

    fn sources(links: &LinkSet) -> Vec<&str> {
        links.iter().map(ImageRef::as_str).collect()
    }

    fn thumbnail_chain(engine: Engine) -> &'static [Selector] {
        selectors::profile(engine).thumbnail.images.selectors()
    }

    fn full_res(engine: Engine) -> &'static FullResProfile {
        &selectors::profile(engine).full_resolution
    }

    #[tokio::test]
    async fn test_google_thumbnails_scroll_until_stalled() {
        let driver = FakeDriver::new()
            .with_offsets(&[100.0, 200.0, 300.0])
            .with_matches(thumbnail_chain(Engine::Google)[0], &["http://a/1.jpg", NO_SRC, "http://a/2.jpg", "http://a/1.jpg"]);

        let links = extractor()
            .extract(Browser::Ready(driver.clone()), &keyword(), "", Site::GoogleThumbnail, 0)
            .await;

        assert_eq!(sources(&links), vec!["http://a/1.jpg", "http://a/2.jpg"]);
        let state = driver.state();
        // three moving samples, then fifty stalled ones
        assert_eq!(state.presses(NavKey::PageDown), 53);
        assert_eq!(state.visited, vec!["https://www.google.com/search?q=red+fox&source=lnms&tbm=isch"]);
        assert!(state.closed);
    }

    #[tokio::test]
    async fn test_naver_thumbnails_fixed_presses_and_prefix_filter() {
        let driver = FakeDriver::new().with_matches(
            thumbnail_chain(Engine::Naver)[1],
            &["https://n/1.jpg", "data:image/gif;base64,R0lG", "https://n/2.jpg"],
        );

        let links = extractor()
            .extract(Browser::Ready(driver.clone()), &keyword(), "&face=1", Site::NaverThumbnail, 0)
            .await;

        assert_eq!(sources(&links), vec!["https://n/1.jpg", "https://n/2.jpg"]);
        let state = driver.state();
        assert_eq!(state.presses(NavKey::PageDown), 60);
        assert!(state.visited[0].ends_with("query=red+fox&face=1"));
    }

    #[tokio::test]
    async fn test_first_matching_selector_wins() {
        let chain = thumbnail_chain(Engine::Naver);
        let driver = FakeDriver::new()
            .with_matches(chain[2], &["https://n/third.jpg"])
            .with_matches(chain[3], &["https://n/css.jpg"]);

        let links = extractor()
            .extract(Browser::Ready(driver), &keyword(), "", Site::NaverThumbnail, 0)
            .await;

        assert_eq!(sources(&links), vec!["https://n/third.jpg"]);
    }

    #[tokio::test]
    async fn test_stale_thumbnails_are_skipped() {
        let driver = FakeDriver::new().with_matches(
            thumbnail_chain(Engine::Google)[0],
            &["stale:gone", "http://a/kept.jpg"],
        );

        let links = extractor()
            .extract(Browser::Ready(driver), &keyword(), "", Site::GoogleThumbnail, 0)
            .await;

        assert_eq!(sources(&links), vec!["http://a/kept.jpg"]);
    }

    #[tokio::test]
    async fn test_unavailable_browser_yields_nothing() {
        let links = extractor()
            .extract(Browser::<FakeDriver>::Unavailable, &keyword(), "", Site::GoogleFullRes, 0)
            .await;
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn test_google_full_resolution_honours_limit_and_skips_static_assets() {
        let profile = full_res(Engine::Google);
        let driver = FakeDriver::new()
            .with_offsets(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .with_matches(profile.click_targets.selectors()[0], &["tile"])
            .with_frames(
                profile.viewer.selectors()[0],
                &[
                    &["https://img/1.jpg", "https://img/extra.jpg"],
                    &["https://encrypted-tbn0.gstatic.com/x"],
                    &["https://img/2.jpg"],
                    &["https://img/2.jpg"],
                    &["https://img/3.jpg"],
                    &["https://img/4.jpg"],
                ],
            );

        let links = extractor()
            .extract(Browser::Ready(driver.clone()), &keyword(), "", Site::GoogleFullRes, 3)
            .await;

        // only the first viewer element is read per step
        assert_eq!(sources(&links), vec!["https://img/1.jpg", "https://img/2.jpg", "https://img/3.jpg"]);
        let state = driver.state();
        assert_eq!(state.clicks, 1);
        assert!(state.closed);
    }

    #[tokio::test]
    async fn test_naver_full_resolution_takes_every_viewer_image() {
        let profile = full_res(Engine::Naver);
        let driver = FakeDriver::new()
            .with_matches(profile.click_targets.selectors()[2], &["tile"])
            .with_frames(
                profile.viewer.selectors()[1],
                &[&["https://n/a.jpg", "https://n/b.jpg"], &["https://n/b.jpg", "https://n/c.jpg"]],
            );

        let links = extractor()
            .extract(Browser::Ready(driver.clone()), &keyword(), "", Site::NaverFullRes, 0)
            .await;

        assert_eq!(sources(&links), vec!["https://n/a.jpg", "https://n/b.jpg", "https://n/c.jpg"]);
        // offset never moves, so the loop ends after the patience window
        assert_eq!(driver.state().presses(NavKey::ArrowRight), 99);
    }

    #[tokio::test]
    async fn test_stale_viewer_image_is_retried_on_next_step() {
        let profile = full_res(Engine::Google);
        let driver = FakeDriver::new()
            .with_matches(profile.click_targets.selectors()[0], &["tile"])
            .with_frames(profile.viewer.selectors()[0], &[&["stale:x"], &["https://img/1.jpg"]]);

        let links = extractor()
            .extract(Browser::Ready(driver.clone()), &keyword(), "", Site::GoogleFullRes, 1)
            .await;

        assert_eq!(sources(&links), vec!["https://img/1.jpg"]);
        let state = driver.state();
        assert_eq!(state.presses(NavKey::ArrowRight), 1);
        assert!(state.closed);
    }

    #[tokio::test]
    async fn test_click_retries_refresh_between_attempts() {
        let profile = full_res(Engine::Google);
        let driver = FakeDriver::new()
            .with_click_failures(2)
            .with_matches(profile.click_targets.selectors()[0], &["tile"])
            .with_frames(profile.viewer.selectors()[0], &[&["https://img/1.jpg"]]);

        let links = extractor()
            .extract(Browser::Ready(driver.clone()), &keyword(), "", Site::GoogleFullRes, 1)
            .await;

        assert_eq!(sources(&links), vec!["https://img/1.jpg"]);
        assert_eq!(driver.state().refreshes, 2);
    }

    #[tokio::test]
    async fn test_no_clickable_result_yields_nothing() {
        let driver = FakeDriver::new();

        let links = extractor()
            .extract(Browser::Ready(driver.clone()), &keyword(), "", Site::GoogleFullRes, 0)
            .await;

        assert!(links.is_empty());
        let state = driver.state();
        let targets = full_res(Engine::Google).click_targets.selectors().len();
        assert_eq!(state.refreshes, targets * 3);
        assert!(state.closed);
    }

    #[tokio::test]
    async fn test_cancellation_stops_full_resolution_loop() {
        let profile = full_res(Engine::Google);
        let driver = FakeDriver::new()
            .with_matches(profile.click_targets.selectors()[0], &["tile"])
            .with_frames(profile.viewer.selectors()[0], &[&["https://img/1.jpg"]]);
        let cancel = Cancellation::new();
        cancel.cancel();

        let links = LinkExtractor::new(pacing(), cancel)
            .extract(Browser::Ready(driver.clone()), &keyword(), "", Site::GoogleFullRes, 0)
            .await;

        assert!(links.is_empty());
        assert_eq!(driver.state().presses(NavKey::ArrowRight), 0);
    }

    #[test]
    fn test_stall_tracker_resets_on_movement() {
        let mut tracker = StallTracker::new(2);
        assert!(!tracker.observe(0.0));
        assert!(!tracker.observe(10.0));
        assert!(!tracker.observe(10.0));
        assert!(tracker.observe(10.0));
    }

    #[test]
    fn test_static_asset_hosts() {
        assert!(is_static_asset("https://encrypted-tbn0.gstatic.com/images?q=1", Some("gstatic.com")));
        assert!(is_static_asset("https://gstatic.com/a.png", Some("gstatic.com")));
        assert!(!is_static_asset("https://notgstatic.com/a.png", Some("gstatic.com")));
        assert!(!is_static_asset("https://gstatic.com/a.png", None));
        assert!(!is_static_asset("data:image/png;base64,AAAA", Some("gstatic.com")));
    }

    #[test]
    fn test_session_lost_is_not_stale() {
        assert!(!DriverError::SessionLost("x".into()).is_stale());
    }
}
