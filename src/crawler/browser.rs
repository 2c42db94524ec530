//! Browser automation for link extraction
//!
//! This module provides:
//! 1. The `BrowserDriver` seam the link extractor is written against
//! 2. `Browser`, a session that is either ready or failed to initialize
//! 3. A WebDriver-backed implementation driving Chrome through fantoccini
//! 4. `SessionLauncher`, so every task can open its own session

use std::future::Future;
use std::time::Duration;

use fantoccini::error::{CmdError, ErrorStatus, NewSessionError};
use fantoccini::key::Key;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::crawler::config_loader::BrowserSettings;
use crate::crawler::selectors::Selector;

/// Error types for browser operations
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Browser is not initialized")]
    Unavailable,

    #[error("Failed to start browser session: {0}")]
    Launch(String),

    #[error("Element is no longer attached to the page")]
    StaleElement,

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Browser session lost: {0}")]
    SessionLost(String),

    #[error("WebDriver command failed: {0}")]
    Command(String),

    #[error("Script error: {0}")]
    Script(#[from] serde_json::Error),
}

impl DriverError {
    /// Expected while lazy rendering mutates the DOM; callers retry next iteration.
    pub fn is_stale(&self) -> bool {
        matches!(self, DriverError::StaleElement)
    }

    /// Nothing further can be done with this session.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, DriverError::Unavailable | DriverError::SessionLost(_))
    }
}

impl From<CmdError> for DriverError {
    fn from(err: CmdError) -> Self {
        match &err {
            CmdError::Standard(wd) => match wd.error {
                ErrorStatus::StaleElementReference => DriverError::StaleElement,
                ErrorStatus::NoSuchElement => DriverError::NotFound(wd.message.to_string()),
                ErrorStatus::InvalidSessionId => DriverError::SessionLost(wd.message.to_string()),
                _ => DriverError::Command(err.to_string()),
            },
            CmdError::Lost(_) => DriverError::SessionLost(err.to_string()),
            _ => DriverError::Command(err.to_string()),
        }
    }
}

impl From<NewSessionError> for DriverError {
    fn from(err: NewSessionError) -> Self {
        DriverError::Launch(err.to_string())
    }
}

/// Result type for browser operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Keyboard signals sent to the page body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    PageDown,
    ArrowRight,
}

/// The operations link extraction needs from a live browser.
pub trait BrowserDriver: Send + Sync {
    type Element: Clone + Send + Sync;

    fn navigate(&self, url: &str) -> impl Future<Output = DriverResult<()>> + Send;

    /// All elements matching the selector, in document order.
    fn find_elements(&self, selector: &Selector) -> impl Future<Output = DriverResult<Vec<Self::Element>>> + Send;

    fn attribute(&self, element: &Self::Element, name: &str) -> impl Future<Output = DriverResult<Option<String>>> + Send;

    fn send_key(&self, key: NavKey) -> impl Future<Output = DriverResult<()>> + Send;

    /// Current vertical scroll offset of the window.
    fn scroll_offset(&self) -> impl Future<Output = DriverResult<f64>> + Send;

    /// Waits up to `wait` for the selector to appear, then clicks it.
    fn click(&self, selector: &Selector, wait: Duration) -> impl Future<Output = DriverResult<Self::Element>> + Send;

    /// Outlines an element on screen. Cosmetic only.
    fn highlight(&self, element: &Self::Element) -> impl Future<Output = DriverResult<()>> + Send;

    fn refresh(&self) -> impl Future<Output = DriverResult<()>> + Send;

    fn close(self) -> impl Future<Output = DriverResult<()>> + Send;
}

/// A browser session that may have failed to start.
pub enum Browser<D> {
    Ready(D),
    Unavailable,
}

impl<D: BrowserDriver> Browser<D> {
    pub fn driver(&self) -> DriverResult<&D> {
        match self {
            Browser::Ready(driver) => Ok(driver),
            Browser::Unavailable => Err(DriverError::Unavailable),
        }
    }

    /// Ends the session; a no-op when it never started.
    pub async fn close(self) {
        match self {
            Browser::Ready(driver) => {
                if let Err(e) = driver.close().await {
                    warn!("Failed to close browser session: {}", e);
                }
            }
            Browser::Unavailable => debug!("No browser session to close"),
        }
    }
}

/// Opens a fresh browser session for a task.
pub trait SessionLauncher: Send + Sync + 'static {
    type Driver: BrowserDriver + 'static;

    /// Never fails: an unusable browser comes back as `Browser::Unavailable`.
    fn launch(&self, proxy: Option<&str>) -> impl Future<Output = Browser<Self::Driver>> + Send;
}

const HIGHLIGHT_SCRIPT: &str = "arguments[0].setAttribute('style', arguments[1]);";
const HIGHLIGHT_STYLE: &str = "background: yellow; border: 2px solid red;";

/// A Chrome session behind a WebDriver endpoint.
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    /// Connects to the WebDriver server and opens a Chrome session.
    pub async fn connect(settings: &BrowserSettings, headless: bool, proxy: Option<&str>) -> DriverResult<Self> {
        let mut builder = ClientBuilder::rustls().map_err(|e| DriverError::Launch(e.to_string()))?;
        builder.capabilities(chrome_capabilities(settings, headless, proxy));

        let client = builder.connect(&settings.webdriver_url).await?;
        Ok(Self { client })
    }

    fn locator(selector: &Selector) -> Locator<'_> {
        match selector {
            Selector::XPath(path) => Locator::XPath(path),
            Selector::Css(css) => Locator::Css(css),
        }
    }
}

/// Chrome capabilities for a session.
fn chrome_capabilities(settings: &BrowserSettings, headless: bool, proxy: Option<&str>) -> Map<String, Value> {
    let mut args = settings.chrome_args.clone();
    if headless {
        args.push("--headless=new".to_string());
    }
    if let Some(proxy) = proxy {
        args.push(format!("--proxy-server={}", proxy));
    }

    let mut caps = Map::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
    caps
}

impl BrowserDriver for WebDriverSession {
    type Element = fantoccini::elements::Element;

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.client.goto(url).await?;
        Ok(())
    }

    async fn find_elements(&self, selector: &Selector) -> DriverResult<Vec<Self::Element>> {
        Ok(self.client.find_all(Self::locator(selector)).await?)
    }

    async fn attribute(&self, element: &Self::Element, name: &str) -> DriverResult<Option<String>> {
        Ok(element.attr(name).await?)
    }

    async fn send_key(&self, key: NavKey) -> DriverResult<()> {
        let key = match key {
            NavKey::PageDown => Key::PageDown,
            NavKey::ArrowRight => Key::Right,
        };
        let body = self.client.find(Locator::Css("body")).await?;
        body.send_keys(&char::from(key).to_string()).await?;
        Ok(())
    }

    async fn scroll_offset(&self) -> DriverResult<f64> {
        let offset = self.client.execute("return window.pageYOffset;", Vec::new()).await?;
        Ok(offset.as_f64().unwrap_or(0.0))
    }

    async fn click(&self, selector: &Selector, wait: Duration) -> DriverResult<Self::Element> {
        let element = self
            .client
            .wait()
            .at_most(wait)
            .for_element(Self::locator(selector))
            .await?;
        element.click().await?;
        Ok(element)
    }

    async fn highlight(&self, element: &Self::Element) -> DriverResult<()> {
        let args = vec![serde_json::to_value(element)?, json!(HIGHLIGHT_STYLE)];
        self.client.execute(HIGHLIGHT_SCRIPT, args).await?;
        Ok(())
    }

    async fn refresh(&self) -> DriverResult<()> {
        self.client.refresh().await?;
        Ok(())
    }

    async fn close(self) -> DriverResult<()> {
        self.client.close().await?;
        Ok(())
    }
}

/// Launches WebDriver-backed Chrome sessions.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    settings: BrowserSettings,
    headless: bool,
}

impl WebDriverLauncher {
    pub fn new(settings: BrowserSettings, headless: bool) -> Self {
        Self { settings, headless }
    }
}

impl SessionLauncher for WebDriverLauncher {
    type Driver = WebDriverSession;

    async fn launch(&self, proxy: Option<&str>) -> Browser<WebDriverSession> {
        info!(
            webdriver = %self.settings.webdriver_url,
            headless = self.headless,
            proxy = proxy.unwrap_or("none"),
            "Starting browser session"
        );
        match WebDriverSession::connect(&self.settings, self.headless, proxy).await {
            Ok(session) => Browser::Ready(session),
            Err(e) => {
                error!("Browser initialization failed: {}", e);
                error!(
                    "Make sure a WebDriver server (e.g. chromedriver) is listening on {}",
                    self.settings.webdriver_url
                );
                Browser::Unavailable
            }
        }
    }
}
