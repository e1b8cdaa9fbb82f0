//! Browser automation through WebDriver
//!
//! Flows talk to the browser through the [`Page`] trait, which exposes the
//! current observable state of the page: elements by [`Locator`], windows,
//! frames and JavaScript dialogs. [`WebDriverPage`] implements it on top of a
//! `thirtyfour` session.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thirtyfour::components::SelectElement;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::error::{E2eError, E2eResult};

/// How to find an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    Xpath(String),
    Css(String),
    Id(String),
    Tag(String),
}

impl Locator {
    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::Xpath(expr.into())
    }

    pub fn css(expr: impl Into<String>) -> Self {
        Locator::Css(expr.into())
    }

    pub fn id(expr: impl Into<String>) -> Self {
        Locator::Id(expr.into())
    }

    pub fn tag(expr: impl Into<String>) -> Self {
        Locator::Tag(expr.into())
    }

    fn to_by(&self) -> By {
        match self {
            Locator::Xpath(expr) => By::XPath(expr.clone()),
            Locator::Css(expr) => By::Css(expr.clone()),
            Locator::Id(expr) => By::Id(expr.clone()),
            Locator::Tag(expr) => By::Tag(expr.clone()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Xpath(expr) => write!(f, "xpath={}", expr),
            Locator::Css(expr) => write!(f, "css={}", expr),
            Locator::Id(expr) => write!(f, "id={}", expr),
            Locator::Tag(expr) => write!(f, "tag={}", expr),
        }
    }
}

/// Snapshot of one element at probe time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementState {
    pub displayed: bool,
    pub enabled: bool,
    pub text: String,
}

impl ElementState {
    /// Visible and enabled
    pub fn is_interactable(&self) -> bool {
        self.displayed && self.enabled
    }
}

/// Observable browser state and the actions flows perform on it.
///
/// Query methods must not change page state; the waiter calls them
/// repeatedly.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> E2eResult<()>;

    /// State of the first match, `None` when nothing matches
    async fn probe(&self, locator: &Locator) -> E2eResult<Option<ElementState>>;

    async fn count(&self, locator: &Locator) -> E2eResult<usize>;

    async fn click(&self, locator: &Locator) -> E2eResult<()>;

    async fn attribute(&self, locator: &Locator, name: &str) -> E2eResult<Option<String>>;

    async fn select_by_text(&self, locator: &Locator, text: &str) -> E2eResult<()>;

    async fn window_count(&self) -> E2eResult<usize>;

    /// Switch to the most recently opened window or tab
    async fn switch_to_newest_window(&self) -> E2eResult<()>;

    /// Make the frame element matched by `locator` the browsing context
    async fn enter_frame(&self, locator: &Locator) -> E2eResult<()>;

    /// Whether a JavaScript dialog is open
    async fn dialog_present(&self) -> E2eResult<bool>;

    /// Type `text` (if any) into the open dialog and accept it
    async fn accept_dialog(&self, text: Option<&str>) -> E2eResult<()>;

    async fn execute_script(&self, script: &str) -> E2eResult<()>;

    async fn screenshot(&self, path: &Path) -> E2eResult<()>;
}

/// `thirtyfour` session exposed as a [`Page`]
pub struct WebDriverPage {
    driver: WebDriver,
}

impl WebDriverPage {
    /// Start a Chrome session on the WebDriver server at `server_url`
    pub async fn launch(server_url: &str, config: &BrowserConfig) -> E2eResult<Self> {
        info!("Starting Chrome session via {} (headless: {})", server_url, config.headless);

        let mut caps = DesiredCapabilities::chrome();
        if config.headless {
            caps.set_headless()?;
        }
        let driver = WebDriver::new(server_url, caps).await?;

        if config.maximize {
            if let Err(e) = driver.maximize_window().await {
                warn!("Could not maximize window: {}", e);
            }
        }

        Ok(Self { driver })
    }

    /// End the session. Call on every exit path.
    pub async fn quit(self) -> E2eResult<()> {
        debug!("Closing browser session");
        self.driver.quit().await?;
        Ok(())
    }

    async fn first(&self, locator: &Locator) -> E2eResult<Option<WebElement>> {
        let mut found = self.driver.find_all(locator.to_by()).await?;
        Ok(if found.is_empty() { None } else { Some(found.swap_remove(0)) })
    }

    async fn require(&self, locator: &Locator) -> E2eResult<WebElement> {
        self.first(locator)
            .await?
            .ok_or_else(|| E2eError::AssertionFailed(format!("no element matches {}", locator)))
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        debug!("Navigating to {}", url);
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn probe(&self, locator: &Locator) -> E2eResult<Option<ElementState>> {
        let Some(element) = self.first(locator).await? else {
            return Ok(None);
        };
        Ok(Some(ElementState {
            displayed: element.is_displayed().await?,
            enabled: element.is_enabled().await?,
            text: element.text().await?,
        }))
    }

    async fn count(&self, locator: &Locator) -> E2eResult<usize> {
        Ok(self.driver.find_all(locator.to_by()).await?.len())
    }

    async fn click(&self, locator: &Locator) -> E2eResult<()> {
        self.require(locator).await?.click().await?;
        Ok(())
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> E2eResult<Option<String>> {
        let element = self.require(locator).await?;
        // `value` reflects user input; the attribute keeps the initial markup
        if name == "value" {
            return Ok(element.value().await?);
        }
        Ok(element.attr(name).await?)
    }

    async fn select_by_text(&self, locator: &Locator, text: &str) -> E2eResult<()> {
        let element = self.require(locator).await?;
        let select = SelectElement::new(&element).await?;
        select.select_by_visible_text(text).await?;
        Ok(())
    }

    async fn window_count(&self) -> E2eResult<usize> {
        Ok(self.driver.windows().await?.len())
    }

    async fn switch_to_newest_window(&self) -> E2eResult<()> {
        let handle = self
            .driver
            .windows()
            .await?
            .pop()
            .ok_or_else(|| E2eError::AssertionFailed("browser has no windows".to_string()))?;
        self.driver.switch_to_window(handle).await?;
        Ok(())
    }

    async fn enter_frame(&self, locator: &Locator) -> E2eResult<()> {
        self.require(locator).await?.enter_frame().await?;
        Ok(())
    }

    async fn dialog_present(&self) -> E2eResult<bool> {
        // No open dialog is reported as a "no such alert" error
        match self.driver.get_alert_text().await {
            Ok(_) => Ok(true),
            Err(e) if is_no_such_alert(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn accept_dialog(&self, text: Option<&str>) -> E2eResult<()> {
        if let Some(text) = text {
            self.driver.send_alert_text(text).await?;
        }
        self.driver.accept_alert().await?;
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> E2eResult<()> {
        self.driver.execute(script, Vec::new()).await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        self.driver.screenshot(path).await?;
        Ok(())
    }
}

fn is_no_such_alert(error: &WebDriverError) -> bool {
    reports_no_such_alert(&error.to_string())
}

/// W3C error code `no such alert`, as it appears in driver messages
fn reports_no_such_alert(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("no such alert") || message.contains("nosuchalert")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn locators_parse_from_yaml() {
        let locator: Locator = serde_yaml::from_str("xpath: //button[contains(text(),'Input box.')]").unwrap();
        assert_eq!(locator, Locator::xpath("//button[contains(text(),'Input box.')]"));

        let locator: Locator = serde_yaml::from_str("id: demo").unwrap();
        assert_eq!(locator.to_string(), "id=demo");
    }

    #[test_case("no such alert: no such alert" => true ; "w3c code")]
    #[test_case("The WebDriver server returned NoSuchAlert" => true ; "variant name")]
    #[test_case("invalid session id: session deleted" => false ; "dead session")]
    #[test_case("chrome not reachable" => false ; "browser gone")]
    fn only_missing_alert_means_no_dialog(message: &str) -> bool {
        reports_no_such_alert(message)
    }

    #[test]
    fn interactable_needs_both_flags() {
        let hidden = ElementState {
            displayed: false,
            enabled: true,
            ..Default::default()
        };
        assert!(!hidden.is_interactable());
        let ready = ElementState {
            displayed: true,
            enabled: true,
            ..Default::default()
        };
        assert!(ready.is_interactable());
    }
}
