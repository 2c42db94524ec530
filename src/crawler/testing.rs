//! In-memory browser for extractor and orchestrator tests.
//!
//! Elements are plain strings holding their `src`. `NO_SRC` models an element
//! without the attribute, a `stale:` prefix one that detached from the page.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::crawler::browser::{Browser, BrowserDriver, DriverError, DriverResult, NavKey, SessionLauncher};
use crate::crawler::selectors::Selector;

pub const NO_SRC: &str = "<no-src>";
pub const STALE_PREFIX: &str = "stale:";

#[derive(Debug, Default)]
pub struct PageState {
    pub visited: Vec<String>,
    pub keys: Vec<NavKey>,
    /// Scroll offsets returned in order; the last one repeats once drained.
    pub offsets: VecDeque<f64>,
    pub last_offset: f64,
    pub matches: HashMap<String, Vec<String>>,
    /// Per selector, the elements visible after n ArrowRight presses.
    pub frames: HashMap<String, Vec<Vec<String>>>,
    pub click_failures: usize,
    pub clicks: usize,
    pub refreshes: usize,
    pub closed: bool,
}

impl PageState {
    pub fn presses(&self, key: NavKey) -> usize {
        self.keys.iter().filter(|k| **k == key).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<PageState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matches(self, selector: Selector, sources: &[&str]) -> Self {
        self.state()
            .matches
            .insert(selector.to_string(), sources.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_frames(self, selector: Selector, frames: &[&[&str]]) -> Self {
        let frames = frames
            .iter()
            .map(|frame| frame.iter().map(|s| s.to_string()).collect())
            .collect();
        self.state().frames.insert(selector.to_string(), frames);
        self
    }

    pub fn with_offsets(self, offsets: &[f64]) -> Self {
        self.state().offsets = offsets.iter().copied().collect();
        self
    }

    pub fn with_click_failures(self, failures: usize) -> Self {
        self.state().click_failures = failures;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap()
    }

    fn lookup(&self, selector: &Selector) -> Vec<String> {
        let state = self.state();
        let key = selector.to_string();
        if let Some(frames) = state.frames.get(&key) {
            let position = state.presses(NavKey::ArrowRight).min(frames.len().saturating_sub(1));
            return frames.get(position).cloned().unwrap_or_default();
        }
        state.matches.get(&key).cloned().unwrap_or_default()
    }
}

impl BrowserDriver for FakeDriver {
    type Element = String;

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.state().visited.push(url.to_string());
        Ok(())
    }

    async fn find_elements(&self, selector: &Selector) -> DriverResult<Vec<String>> {
        Ok(self.lookup(selector))
    }

    async fn attribute(&self, element: &String, name: &str) -> DriverResult<Option<String>> {
        if element.starts_with(STALE_PREFIX) {
            return Err(DriverError::StaleElement);
        }
        if name != "src" || element == NO_SRC {
            return Ok(None);
        }
        Ok(Some(element.clone()))
    }

    async fn send_key(&self, key: NavKey) -> DriverResult<()> {
        self.state().keys.push(key);
        Ok(())
    }

    async fn scroll_offset(&self) -> DriverResult<f64> {
        let mut state = self.state();
        if let Some(offset) = state.offsets.pop_front() {
            state.last_offset = offset;
        }
        Ok(state.last_offset)
    }

    async fn click(&self, selector: &Selector, _wait: Duration) -> DriverResult<String> {
        {
            let mut state = self.state();
            if state.click_failures > 0 {
                state.click_failures -= 1;
                return Err(DriverError::NotFound(selector.to_string()));
            }
        }
        let element = self
            .lookup(selector)
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NotFound(selector.to_string()))?;
        self.state().clicks += 1;
        Ok(element)
    }

    async fn highlight(&self, _element: &String) -> DriverResult<()> {
        Ok(())
    }

    async fn refresh(&self) -> DriverResult<()> {
        self.state().refreshes += 1;
        Ok(())
    }

    async fn close(self) -> DriverResult<()> {
        self.state().closed = true;
        Ok(())
    }
}

/// Hands out clones of one fake browser, or none at all.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    template: Option<FakeDriver>,
    proxies: Arc<Mutex<Vec<Option<String>>>>,
}

impl FakeLauncher {
    pub fn ready(driver: FakeDriver) -> Self {
        Self { template: Some(driver), proxies: Arc::default() }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Proxy requested by every launch so far.
    pub fn proxies(&self) -> Vec<Option<String>> {
        self.proxies.lock().unwrap().clone()
    }
}

impl SessionLauncher for FakeLauncher {
    type Driver = FakeDriver;

    async fn launch(&self, proxy: Option<&str>) -> Browser<FakeDriver> {
        self.proxies.lock().unwrap().push(proxy.map(String::from));
        match &self.template {
            Some(driver) => Browser::Ready(driver.clone()),
            None => Browser::Unavailable,
        }
    }
}
