//! Suite runner: catalogs scenarios, runs them and aggregates results

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::api;
use crate::browser::WebDriverPage;
use crate::config::RunnerConfig;
use crate::driver::DriverHandle;
use crate::error::{E2eError, E2eResult};
use crate::flow::{flow_passed, FlowExecutor, StepResult, UiFlow};
use crate::http::ApiClient;
use crate::lifecycle::{run_album_lifecycle, Checkpoint, ResourceEndpoint};
use crate::poll::Waiter;

/// What a scenario exercises
#[derive(Debug, Clone)]
pub enum ScenarioKind {
    UserLookup,
    CreatePost,
    ResponseTime,
    AlbumLifecycle,
    Ui(UiFlow),
}

/// A runnable test case
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub tags: Vec<String>,
    pub kind: ScenarioKind,
}

impl Scenario {
    fn new(name: &str, tags: &[&str], kind: ScenarioKind) -> Self {
        Self {
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            kind,
        }
    }

    /// API scenarios followed by one scenario per flow
    pub fn catalog(flows: Vec<UiFlow>) -> Vec<Self> {
        let mut scenarios = vec![
            Self::new("users-username-exists", &["api", "users"], ScenarioKind::UserLookup),
            Self::new("posts-create", &["api", "posts"], ScenarioKind::CreatePost),
            Self::new("posts-response-time", &["api", "posts", "performance"], ScenarioKind::ResponseTime),
            Self::new("album-lifecycle", &["api", "albums", "lifecycle"], ScenarioKind::AlbumLifecycle),
        ];
        scenarios.extend(flows.into_iter().map(|flow| Self {
            name: flow.name.clone(),
            tags: flow.tags.clone(),
            kind: ScenarioKind::Ui(flow),
        }));
        scenarios
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_ui(&self) -> bool {
        matches!(self.kind, ScenarioKind::Ui(_))
    }
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    /// UI flow steps
    pub steps: Vec<StepResult>,
    /// Lifecycle states reached
    pub checkpoints: Vec<Checkpoint>,
    pub error: Option<String>,
}

impl TestResult {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            skipped: false,
            duration_ms: 0,
            steps: vec![],
            checkpoints: vec![],
            error: None,
        }
    }

    fn skipped(name: &str) -> Self {
        Self {
            success: true,
            skipped: true,
            ..Self::new(name)
        }
    }

    fn failed(name: &str, error: &E2eError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(name)
        }
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(results: Vec<TestResult>, duration_ms: u64) -> Self {
        let skipped = results.iter().filter(|r| r.skipped).count();
        let passed = results.iter().filter(|r| r.success && !r.skipped).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed - skipped,
            skipped,
            duration_ms,
            results,
        }
    }
}

/// Main suite runner
pub struct SuiteRunner {
    config: RunnerConfig,

    /// Spawned chromedriver (if any)
    driver: Option<DriverHandle>,
}

impl SuiteRunner {
    /// Create a new runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config, driver: None }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Built-in scenarios plus flows from `flows_dir`
    pub fn scenarios(&self) -> E2eResult<Vec<Scenario>> {
        let mut flows = UiFlow::builtin()?;
        if let Some(dir) = &self.config.flows_dir {
            flows.extend(UiFlow::load_all(dir)?);
        }
        Ok(Scenario::catalog(flows))
    }

    /// WebDriver URL for UI scenarios, spawning chromedriver on first use
    pub async fn webdriver_url(&mut self) -> E2eResult<String> {
        if let Some(url) = &self.config.browser.webdriver_url {
            return Ok(url.clone());
        }
        if self.driver.is_none() {
            self.driver = Some(DriverHandle::spawn(self.config.driver.clone()).await?);
        }
        match &self.driver {
            Some(driver) => Ok(driver.server_url().to_string()),
            None => Err(E2eError::DriverStartup("driver not running".to_string())),
        }
    }

    /// Stop the spawned driver
    pub fn stop_driver(&mut self) -> E2eResult<()> {
        if let Some(mut driver) = self.driver.take() {
            driver.stop()?;
        }
        Ok(())
    }

    /// Run every scenario
    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let scenarios = self.scenarios()?;
        Ok(self.run_scenarios(&scenarios).await)
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let scenarios: Vec<Scenario> = self
            .scenarios()?
            .into_iter()
            .filter(|s| s.has_tag(tag))
            .collect();
        Ok(self.run_scenarios(&scenarios).await)
    }

    /// Run a specific scenario by name
    pub async fn run_test(&mut self, name: &str) -> E2eResult<TestResult> {
        let scenario = self
            .scenarios()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::Config(format!("Scenario not found: {}", name)))?;

        Ok(self.run_scenario(&scenario).await)
    }

    /// Run a list of scenarios one after another
    pub async fn run_scenarios(&mut self, scenarios: &[Scenario]) -> TestSuiteResult {
        let start = Instant::now();
        let mut results = Vec::new();

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run_scenario(scenario).await;
            if result.skipped {
                info!("- {} (skipped)", result.name);
            } else if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error"));
            }
            results.push(result);
        }

        let suite = TestSuiteResult::from_results(results, start.elapsed().as_millis() as u64);

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );

        suite
    }

    /// Run one scenario. Failures are captured in the result.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> TestResult {
        if let Some(tag) = self.config.exclude_tags.iter().find(|t| scenario.has_tag(t)) {
            debug!("Skipping {} (excluded tag '{}')", scenario.name, tag);
            return TestResult::skipped(&scenario.name);
        }

        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        let mut result = match self.execute(scenario).await {
            Ok(result) => result,
            Err(e) => TestResult::failed(&scenario.name, &e),
        };
        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    async fn execute(&mut self, scenario: &Scenario) -> E2eResult<TestResult> {
        let api = self.config.api.clone();
        let mut result = TestResult::new(&scenario.name);

        match &scenario.kind {
            ScenarioKind::UserLookup => {
                let client = ApiClient::new(&api.placeholder_base_url, api.request_timeout())?;
                api::verify_username_exists(&client, &api.expected_username).await?;
            }
            ScenarioKind::CreatePost => {
                let client = ApiClient::new(&api.placeholder_base_url, api.request_timeout())?;
                api::create_post(&client).await?;
            }
            ScenarioKind::ResponseTime => {
                let client = ApiClient::new(&api.placeholder_base_url, api.request_timeout())?;
                api::check_response_time(&client, api.response_time_threshold()).await?;
            }
            ScenarioKind::AlbumLifecycle => {
                let client = ApiClient::new(&api.albums_base_url, api.request_timeout())?;
                result.checkpoints = run_album_lifecycle(&client, ResourceEndpoint::albums()).await?;
            }
            ScenarioKind::Ui(flow) => {
                result.steps = self.run_flow(flow).await?;
                if !flow_passed(&result.steps) {
                    result.error = result.steps.iter().find_map(|s| s.error.clone());
                    return Ok(result);
                }
            }
        }

        result.success = true;
        Ok(result)
    }

    /// One browser session per flow, closed whatever the outcome
    async fn run_flow(&mut self, flow: &UiFlow) -> E2eResult<Vec<StepResult>> {
        let server_url = self.webdriver_url().await?;
        let browser = &self.config.browser;
        let page = WebDriverPage::launch(&server_url, browser).await?;

        let waiter = Waiter::from_millis(browser.wait_timeout_ms, browser.poll_interval_ms);
        let steps = FlowExecutor::new(&page, waiter)
            .with_screenshots(browser.screenshot_dir.clone())
            .run(flow)
            .await;

        if let Err(e) = page.quit().await {
            warn!("Browser session did not close cleanly: {}", e);
        }
        Ok(steps)
    }

    /// Write results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for SuiteRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SuiteRunner {
    fn drop(&mut self) {
        let _ = self.stop_driver();
    }
}
