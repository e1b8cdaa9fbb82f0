//! Declarative UI flows
//!
//! A flow is an ordered list of steps parsed from YAML. Every step that
//! depends on the page first waits for its precondition through the
//! [`Waiter`](crate::poll::Waiter), then acts, then asserts.
//!
//! ```yaml
//! name: input-alert
//! start_url: http://way2automation.com/way2auto_jquery/automation-practice-site.html
//! steps:
//!   - action: click
//!     locator: { xpath: "//a[@href='alert.php']/h2[text()='Alert']/parent::a" }
//!   - action: switch_to_new_window
//!   - action: answer_prompt
//!     text: John Doe
//!   - action: assert_text
//!     locator: { id: demo }
//!     expect: { contains: John Doe }
//! ```

use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::browser::{Locator, Page};
use crate::error::{E2eError, E2eResult};
use crate::poll::{Probe, Waiter};

const INPUT_ALERT_FLOW: &str = include_str!("../flows/input_alert.yaml");
const DATE_PICKER_FLOW: &str = include_str!("../flows/date_picker.yaml");

/// A complete UI flow parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiFlow {
    /// Unique name for this flow
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Page opened before the first step
    pub start_url: String,

    /// Wait budget for each step's precondition
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,

    /// Poll interval for preconditions
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// Steps to execute in order
    pub steps: Vec<UiStep>,
}

/// A single step in a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UiStep {
    /// Open a URL in the current window
    Navigate { url: String },

    /// Scroll to the bottom of the document
    ScrollToBottom,

    /// Wait until the element is visible and enabled, then click it
    Click {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait until the element is visible
    Wait {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for a second window or tab and switch to the newest one
    SwitchToNewWindow {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for any iframe, then for the matching one, and enter it
    EnterFrame {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for a JavaScript dialog, type `text` if given, and accept it
    AnswerPrompt {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait until the dropdown is interactable and pick an option by its text
    Select {
        locator: Locator,
        text: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for non-empty element text, then check it
    AssertText {
        locator: Locator,
        expect: TextMatch,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for a non-blank attribute, then check it
    AssertAttribute {
        locator: Locator,
        name: String,
        expect: TextMatch,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Log a message
    Log { message: String },
}

/// Expectation on a piece of page text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMatch {
    Equals(String),
    Contains(String),
    /// Today's local date in the given `chrono` format, e.g. `%Y-%m-%d`
    Today(String),
}

impl TextMatch {
    /// Rejects `today` formats chrono cannot render
    fn validate(&self) -> Result<(), String> {
        if let TextMatch::Today(format) = self {
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return Err(format!("invalid date format '{}'", format));
            }
        }
        Ok(())
    }

    /// Resolve to the literal text being compared against
    fn resolved(&self) -> E2eResult<String> {
        match self {
            TextMatch::Equals(s) | TextMatch::Contains(s) => Ok(s.clone()),
            TextMatch::Today(format) => {
                let mut today = String::new();
                write!(today, "{}", chrono::Local::now().format(format))
                    .map_err(|_| E2eError::AssertionFailed(format!("invalid date format '{}'", format)))?;
                Ok(today)
            }
        }
    }

    pub fn check(&self, subject: &str, actual: &str) -> E2eResult<()> {
        let expected = self.resolved()?;
        let ok = match self {
            TextMatch::Contains(_) => actual.contains(&expected),
            TextMatch::Equals(_) | TextMatch::Today(_) => actual == expected,
        };
        if ok {
            info!("{} is '{}' as expected", subject, actual);
            return Ok(());
        }
        let relation = match self {
            TextMatch::Contains(_) => "to contain",
            _ => "to equal",
        };
        Err(E2eError::AssertionFailed(format!(
            "expected {} '{}' {} '{}'",
            subject, actual, relation, expected
        )))
    }
}

impl UiFlow {
    /// Parse a flow from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let flow: Self = serde_yaml::from_str(yaml)?;
        if flow.steps.is_empty() {
            return Err(E2eError::FlowParse(format!("flow '{}' has no steps", flow.name)));
        }
        for step in &flow.steps {
            if let Some(expect) = step.expectation() {
                expect
                    .validate()
                    .map_err(|reason| E2eError::FlowParse(format!("flow '{}', step {}: {}", flow.name, step.name(), reason)))?;
            }
        }
        Ok(flow)
    }

    /// Parse a flow from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| E2eError::FlowParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all flows from a directory
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut flows = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            flows.push(Self::from_file(entry.path())?);
        }

        Ok(flows)
    }

    /// Flows shipped with the suite
    pub fn builtin() -> E2eResult<Vec<Self>> {
        [INPUT_ALERT_FLOW, DATE_PICKER_FLOW]
            .into_iter()
            .map(Self::from_yaml)
            .collect()
    }

    /// Waiter for this flow, falling back to `default`
    pub fn waiter(&self, default: Waiter) -> Waiter {
        Waiter::new(
            self.wait_timeout_ms.map(Duration::from_millis).unwrap_or(default.timeout()),
            self.poll_interval_ms.map(Duration::from_millis).unwrap_or(default.interval()),
        )
    }
}

impl UiStep {
    /// Short label used in logs and results
    pub fn name(&self) -> String {
        match self {
            UiStep::Navigate { url } => format!("navigate:{}", url),
            UiStep::ScrollToBottom => "scroll_to_bottom".to_string(),
            UiStep::Click { locator, .. } => format!("click:{}", locator),
            UiStep::Wait { locator, .. } => format!("wait:{}", locator),
            UiStep::SwitchToNewWindow { .. } => "switch_to_new_window".to_string(),
            UiStep::EnterFrame { locator, .. } => format!("enter_frame:{}", locator),
            UiStep::AnswerPrompt { .. } => "answer_prompt".to_string(),
            UiStep::Select { locator, text, .. } => format!("select:{}={}", locator, text),
            UiStep::AssertText { locator, .. } => format!("assert_text:{}", locator),
            UiStep::AssertAttribute { locator, name, .. } => format!("assert_attribute:{}@{}", locator, name),
            UiStep::Log { message } => format!("log:{}", message.chars().take(30).collect::<String>()),
        }
    }

    fn expectation(&self) -> Option<&TextMatch> {
        match self {
            UiStep::AssertText { expect, .. } | UiStep::AssertAttribute { expect, .. } => Some(expect),
            _ => None,
        }
    }

    fn timeout_override(&self) -> Option<u64> {
        match self {
            UiStep::Click { timeout_ms, .. }
            | UiStep::Wait { timeout_ms, .. }
            | UiStep::SwitchToNewWindow { timeout_ms }
            | UiStep::EnterFrame { timeout_ms, .. }
            | UiStep::AnswerPrompt { timeout_ms, .. }
            | UiStep::Select { timeout_ms, .. }
            | UiStep::AssertText { timeout_ms, .. }
            | UiStep::AssertAttribute { timeout_ms, .. } => *timeout_ms,
            UiStep::Navigate { .. } | UiStep::ScrollToBottom | UiStep::Log { .. } => None,
        }
    }
}

/// Result of executing one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

/// Runs flows against a [`Page`]
pub struct FlowExecutor<'a, P: Page + ?Sized> {
    page: &'a P,
    waiter: Waiter,
    screenshot_dir: Option<PathBuf>,
}

impl<'a, P: Page + ?Sized> FlowExecutor<'a, P> {
    pub fn new(page: &'a P, waiter: Waiter) -> Self {
        Self {
            page,
            waiter,
            screenshot_dir: None,
        }
    }

    /// Capture a screenshot into `dir` when a step fails
    pub fn with_screenshots(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    /// Open the start page and execute every step, stopping at the first failure
    pub async fn run(&self, flow: &UiFlow) -> Vec<StepResult> {
        let waiter = flow.waiter(self.waiter);
        let mut results = Vec::new();

        let start_step = UiStep::Navigate { url: flow.start_url.clone() };
        let steps = std::iter::once(&start_step).chain(flow.steps.iter());

        for (index, step) in steps.enumerate() {
            let result = self.run_step(&flow.name, index, step, waiter).await;
            let failed = !result.success;
            results.push(result);
            if failed {
                break; // Stop on first failure
            }
        }

        results
    }

    async fn run_step(&self, flow_name: &str, index: usize, step: &UiStep, waiter: Waiter) -> StepResult {
        let start = Instant::now();
        let step_name = step.name();
        debug!("Executing step: {}", step_name);

        let waiter = match step.timeout_override() {
            Some(ms) => waiter.with_timeout(Duration::from_millis(ms)),
            None => waiter,
        };
        let outcome = self.execute_step(step, waiter).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => StepResult {
                success: true,
                step_name,
                duration_ms,
                error: None,
                screenshot_path: None,
            },
            Err(e) => {
                error!("Step '{}' failed: {}", step_name, e);
                let screenshot_path = self.capture_failure(flow_name, index).await;
                StepResult {
                    success: false,
                    error: Some(
                        E2eError::StepFailed {
                            step: step_name.clone(),
                            reason: e.to_string(),
                        }
                        .to_string(),
                    ),
                    step_name,
                    duration_ms,
                    screenshot_path,
                }
            }
        }
    }

    async fn capture_failure(&self, flow_name: &str, index: usize) -> Option<PathBuf> {
        let dir = self.screenshot_dir.as_ref()?;
        if let Err(e) = std::fs::create_dir_all(dir) {
            error!("Cannot create screenshot dir {}: {}", dir.display(), e);
            return None;
        }
        let path = dir.join(format!("{}-step{}.png", flow_name, index));
        match self.page.screenshot(&path).await {
            Ok(()) => Some(path),
            Err(e) => {
                error!("Failure screenshot not captured: {}", e);
                None
            }
        }
    }

    async fn execute_step(&self, step: &UiStep, waiter: Waiter) -> E2eResult<()> {
        let page = self.page;
        match step {
            UiStep::Navigate { url } => page.goto(url).await,
            UiStep::ScrollToBottom => {
                page.execute_script("window.scrollTo(0, document.body.scrollHeight);").await
            }
            UiStep::Click { locator, .. } => {
                waiter
                    .until(&format!("{} to be visible and enabled", locator), || interactable(page, locator))
                    .await?;
                page.click(locator).await
            }
            UiStep::Wait { locator, .. } => {
                waiter
                    .until(&format!("{} to be visible", locator), || visible(page, locator))
                    .await
            }
            UiStep::SwitchToNewWindow { .. } => {
                let count = waiter
                    .until("a second window to open", || extra_window(page))
                    .await?;
                debug!("{} windows open, switching to the newest", count);
                page.switch_to_newest_window().await
            }
            UiStep::EnterFrame { locator, .. } => {
                let any_frame = Locator::tag("iframe");
                waiter
                    .until("any iframe to load", || attached(page, &any_frame))
                    .await?;
                waiter
                    .until(&format!("frame {}", locator), || attached(page, locator))
                    .await?;
                page.enter_frame(locator).await
            }
            UiStep::AnswerPrompt { text, .. } => {
                waiter
                    .until("dialog to be present", || dialog_open(page))
                    .await?;
                page.accept_dialog(text.as_deref()).await
            }
            UiStep::Select { locator, text, .. } => {
                waiter
                    .until(&format!("{} to be visible and enabled", locator), || interactable(page, locator))
                    .await?;
                page.select_by_text(locator, text).await
            }
            UiStep::AssertText { locator, expect, .. } => {
                let subject = format!("text of {}", locator);
                let text = waiter
                    .until(&subject, || populated_text(page, locator))
                    .await?;
                info!("The {} is '{}'", subject, text);
                expect.check(&subject, &text)
            }
            UiStep::AssertAttribute { locator, name, expect, .. } => {
                let subject = format!("{} of {}", name, locator);
                let value = waiter
                    .until(&subject, || populated_attribute(page, locator, name))
                    .await?;
                expect.check(&subject, &value)
            }
            UiStep::Log { message } => {
                info!("[FLOW LOG] {}", message);
                Ok(())
            }
        }
    }
}

// Probes. Each reads page state without changing it.

async fn attached<P: Page + ?Sized>(page: &P, locator: &Locator) -> Probe<()> {
    Ok((page.count(locator).await? > 0).then_some(()))
}

async fn visible<P: Page + ?Sized>(page: &P, locator: &Locator) -> Probe<()> {
    Ok(page.probe(locator).await?.filter(|s| s.displayed).map(|_| ()))
}

async fn interactable<P: Page + ?Sized>(page: &P, locator: &Locator) -> Probe<()> {
    Ok(page
        .probe(locator)
        .await?
        .filter(|s| s.is_interactable())
        .map(|_| ()))
}

async fn extra_window<P: Page + ?Sized>(page: &P) -> Probe<usize> {
    let count = page.window_count().await?;
    Ok((count > 1).then_some(count))
}

async fn dialog_open<P: Page + ?Sized>(page: &P) -> Probe<()> {
    Ok(page.dialog_present().await?.then_some(()))
}

async fn populated_text<P: Page + ?Sized>(page: &P, locator: &Locator) -> Probe<String> {
    Ok(page
        .probe(locator)
        .await?
        .map(|s| s.text)
        .filter(|t| !t.is_empty()))
}

async fn populated_attribute<P: Page + ?Sized>(page: &P, locator: &Locator, name: &str) -> Probe<String> {
    Ok(page
        .attribute(locator, name)
        .await?
        .filter(|v| !v.trim().is_empty()))
}

/// Whether every step of a flow run succeeded
pub fn flow_passed(results: &[StepResult]) -> bool {
    results.iter().all(|r| r.success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn builtin_flows_parse() {
        let flows = UiFlow::builtin().unwrap();
        let names: Vec<&str> = flows.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["input-alert", "date-picker-format"]);

        let alert = &flows[0];
        assert!(alert.steps.contains(&UiStep::AnswerPrompt {
            text: Some("John Doe".to_string()),
            timeout_ms: None,
        }));
        assert!(matches!(
            alert.steps.last(),
            Some(UiStep::AssertText { expect: TextMatch::Contains(name), .. }) if name == "John Doe"
        ));

        let picker = &flows[1];
        assert!(matches!(
            picker.steps.last(),
            Some(UiStep::AssertAttribute { expect: TextMatch::Today(format), .. }) if format == "%Y-%m-%d"
        ));
    }

    #[test]
    fn empty_flow_is_rejected() {
        let yaml = "name: empty\nstart_url: http://localhost\nsteps: []\n";
        assert!(matches!(UiFlow::from_yaml(yaml), Err(E2eError::FlowParse(_))));
    }

    #[test]
    fn flow_waiter_overrides() {
        let yaml = r#"
name: quick
start_url: http://localhost
wait_timeout_ms: 2000
steps:
  - action: scroll_to_bottom
"#;
        let flow = UiFlow::from_yaml(yaml).unwrap();
        let waiter = flow.waiter(Waiter::from_millis(10_000, 500));
        assert_eq!(waiter.timeout(), Duration::from_millis(2000));
        assert_eq!(waiter.interval(), Duration::from_millis(500));
    }

    #[test_case(TextMatch::Contains("John Doe".into()), "You entered: John Doe", true ; "contains")]
    #[test_case(TextMatch::Contains("Silver Star".into()), "You entered: John Doe", false ; "missing name")]
    #[test_case(TextMatch::Equals("2024-01-01".into()), "2024-01-01", true ; "equals")]
    #[test_case(TextMatch::Equals("2024-01-01".into()), "01/01/2024", false ; "wrong format")]
    fn text_matching(expect: TextMatch, actual: &str, passes: bool) {
        assert_eq!(expect.check("subject", actual).is_ok(), passes);
    }

    #[test]
    fn today_resolves_with_format() {
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        assert!(TextMatch::Today("%Y-%m-%d".into()).check("date", &today).is_ok());
    }

    #[test_case("%Q" ; "unknown specifier")]
    #[test_case("%Y-%" ; "dangling percent")]
    fn bad_date_format_is_rejected_at_load(format: &str) {
        let yaml = format!(
            "name: bad-date\nstart_url: http://localhost\nsteps:\n  - action: assert_attribute\n    locator: {{ id: datepicker }}\n    name: value\n    expect: {{ today: \"{}\" }}\n",
            format
        );
        match UiFlow::from_yaml(&yaml) {
            Err(E2eError::FlowParse(message)) => assert!(message.contains(format), "{}", message),
            other => panic!("expected flow parse error, got {:?}", other.map(|f| f.name)),
        }
    }

    #[test]
    fn bad_date_format_fails_the_check_instead_of_panicking() {
        let err = TextMatch::Today("%Q".into()).check("date", "2024-01-01").unwrap_err();
        assert!(matches!(err, E2eError::AssertionFailed(_)));
    }

    #[test]
    fn load_all_reads_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "name: b\nstart_url: http://localhost\nsteps:\n  - action: log\n    message: hi\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "name: a\nstart_url: http://localhost\nsteps:\n  - action: scroll_to_bottom\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let flows = UiFlow::load_all(dir.path()).unwrap();
        let names: Vec<&str> = flows.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
