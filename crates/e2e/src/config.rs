//! Suite configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::E2eResult;
use crate::driver::DriverConfig;

/// Top-level configuration for the suite runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// REST API targets and thresholds
    pub api: ApiConfig,

    /// Browser session settings for UI flows
    pub browser: BrowserConfig,

    /// chromedriver process settings
    pub driver: DriverConfig,

    /// Extra UI flow definitions (YAML) loaded next to the built-in ones
    pub flows_dir: Option<PathBuf>,

    /// Scenarios carrying any of these tags are reported as skipped
    pub exclude_tags: Vec<String>,

    /// Output directory for results
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            browser: BrowserConfig::default(),
            driver: DriverConfig::default(),
            flows_dir: None,
            exclude_tags: Vec::new(),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

impl RunnerConfig {
    /// Parse a configuration from TOML. Missing keys keep their defaults.
    pub fn from_toml(content: &str) -> E2eResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

/// REST API targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the users/posts placeholder API
    pub placeholder_base_url: String,

    /// Base URL of the album collection service
    pub albums_base_url: String,

    /// Ceiling for the posts response-time check
    pub response_time_threshold_ms: u64,

    /// Per-request timeout
    pub request_timeout_ms: u64,

    /// Username expected in the users listing
    pub expected_username: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            placeholder_base_url: "https://jsonplaceholder.typicode.com".to_string(),
            albums_base_url: "https://albums-collection-service.herokuapp.com".to_string(),
            response_time_threshold_ms: 500,
            request_timeout_ms: 30_000,
            expected_username: "Samantha".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn response_time_threshold(&self) -> Duration {
        Duration::from_millis(self.response_time_threshold_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Browser session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// WebDriver endpoint. When unset, a chromedriver is spawned.
    pub webdriver_url: Option<String>,

    /// Run Chrome headless
    pub headless: bool,

    /// Maximize the window after the session starts
    pub maximize: bool,

    /// Default wait for UI conditions
    pub wait_timeout_ms: u64,

    /// Default poll interval for UI conditions
    pub poll_interval_ms: u64,

    /// Where failure screenshots are written
    pub screenshot_dir: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: None,
            headless: true,
            maximize: true,
            wait_timeout_ms: 10_000,
            poll_interval_ms: 500,
            screenshot_dir: PathBuf::from("test-results/screenshots"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_literal_targets() {
        let config = RunnerConfig::default();
        assert_eq!(config.api.response_time_threshold(), Duration::from_millis(500));
        assert_eq!(config.browser.wait_timeout_ms, 10_000);
        assert!(config.api.albums_base_url.starts_with("https://albums-collection"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml = r#"
output_dir = "out"
exclude_tags = ["ui"]

[api]
albums_base_url = "http://127.0.0.1:3000"

[browser]
webdriver_url = "http://localhost:4444"
headless = false
"#;
        let config = RunnerConfig::from_toml(toml).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.exclude_tags, vec!["ui".to_string()]);
        assert_eq!(config.api.albums_base_url, "http://127.0.0.1:3000");
        assert_eq!(config.api.placeholder_base_url, "https://jsonplaceholder.typicode.com");
        assert_eq!(config.browser.webdriver_url.as_deref(), Some("http://localhost:4444"));
        assert!(!config.browser.headless);
        assert_eq!(config.browser.poll_interval_ms, 500);
    }
}
