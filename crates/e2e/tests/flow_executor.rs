//! Flow execution against a scripted in-memory page
//!
//! `ScriptedPage` mimics the practice site: elements show up after a few
//! probes, links open a second window, the input button raises a prompt and
//! the confirmation text appears once the prompt is answered.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use autosuite_e2e::browser::ElementState;
use autosuite_e2e::flow::{flow_passed, FlowExecutor, UiFlow};
use autosuite_e2e::{E2eError, E2eResult, Locator, Page, Waiter};

#[derive(Default)]
struct PageState {
    element_probes: HashMap<String, usize>,
    windows: usize,
    prompt_open: bool,
    dialog_probes: usize,
    typed: Option<String>,
    selected_format: Option<String>,
    actions: Vec<String>,
    screenshots: Vec<PathBuf>,
}

struct ScriptedPage {
    /// Probes an element stays missing before it appears
    element_delay: usize,
    /// Probes the prompt stays hidden after the input button is clicked
    dialog_delay: usize,
    /// Locators (by display form) that never appear
    missing: Vec<String>,
    /// Name the page greets instead of the typed one
    greeting_override: Option<String>,
    /// Error raised by every dialog check
    dialog_error: Option<String>,
    state: Mutex<PageState>,
}

impl ScriptedPage {
    fn new() -> Self {
        Self {
            element_delay: 2,
            dialog_delay: 3,
            missing: Vec::new(),
            greeting_override: None,
            dialog_error: None,
            state: Mutex::new(PageState {
                windows: 1,
                ..Default::default()
            }),
        }
    }

    fn without(mut self, locator: &str) -> Self {
        self.missing.push(locator.to_string());
        self
    }

    fn greeting(mut self, name: &str) -> Self {
        self.greeting_override = Some(name.to_string());
        self
    }

    fn failing_dialog_checks(mut self, message: &str) -> Self {
        self.dialog_error = Some(message.to_string());
        self
    }

    fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().screenshots.clone()
    }

    /// Counts a probe and reports whether the element is present yet
    fn present(&self, locator: &Locator) -> bool {
        let key = locator.to_string();
        if self.missing.contains(&key) {
            return false;
        }
        let mut state = self.state.lock().unwrap();
        let probes = state.element_probes.entry(key).or_insert(0);
        *probes += 1;
        *probes > self.element_delay
    }
}

#[async_trait]
impl Page for ScriptedPage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.state.lock().unwrap().actions.push(format!("goto {}", url));
        Ok(())
    }

    async fn probe(&self, locator: &Locator) -> E2eResult<Option<ElementState>> {
        if !self.present(locator) {
            return Ok(None);
        }
        let state = self.state.lock().unwrap();
        let text = match (locator, &state.typed) {
            (Locator::Id(id), Some(typed)) if id == "demo" => {
                let name = self.greeting_override.as_ref().unwrap_or(typed);
                format!("Hello {}! How are you today?", name)
            }
            _ => String::new(),
        };
        Ok(Some(ElementState {
            displayed: true,
            enabled: true,
            text,
        }))
    }

    async fn count(&self, locator: &Locator) -> E2eResult<usize> {
        Ok(usize::from(self.present(locator)))
    }

    async fn click(&self, locator: &Locator) -> E2eResult<()> {
        let key = locator.to_string();
        let mut state = self.state.lock().unwrap();
        if key.contains("alert.php") || key.contains("datepicker.php") {
            state.windows = 2;
        }
        if key.contains("Input box.") {
            state.prompt_open = true;
        }
        state.actions.push(format!("click {}", key));
        Ok(())
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> E2eResult<Option<String>> {
        if name != "value" || *locator != Locator::id("datepicker") {
            return Ok(None);
        }
        let state = self.state.lock().unwrap();
        let value = match state.selected_format.as_deref() {
            Some("ISO 8601 - yy-mm-dd") => chrono::Local::now().format("%Y-%m-%d").to_string(),
            Some(_) => chrono::Local::now().format("%m/%d/%Y").to_string(),
            None => String::new(),
        };
        Ok(Some(value))
    }

    async fn select_by_text(&self, locator: &Locator, text: &str) -> E2eResult<()> {
        let mut state = self.state.lock().unwrap();
        state.selected_format = Some(text.to_string());
        state.actions.push(format!("select {} {}", locator, text));
        Ok(())
    }

    async fn window_count(&self) -> E2eResult<usize> {
        Ok(self.state.lock().unwrap().windows)
    }

    async fn switch_to_newest_window(&self) -> E2eResult<()> {
        self.state.lock().unwrap().actions.push("switch window".to_string());
        Ok(())
    }

    async fn enter_frame(&self, locator: &Locator) -> E2eResult<()> {
        self.state.lock().unwrap().actions.push(format!("enter frame {}", locator));
        Ok(())
    }

    async fn dialog_present(&self) -> E2eResult<bool> {
        if let Some(message) = &self.dialog_error {
            return Err(E2eError::AssertionFailed(message.clone()));
        }
        let mut state = self.state.lock().unwrap();
        if !state.prompt_open {
            return Ok(false);
        }
        state.dialog_probes += 1;
        Ok(state.dialog_probes > self.dialog_delay)
    }

    async fn accept_dialog(&self, text: Option<&str>) -> E2eResult<()> {
        let mut state = self.state.lock().unwrap();
        state.prompt_open = false;
        state.typed = text.map(String::from);
        state.actions.push(format!("accept dialog {:?}", text));
        Ok(())
    }

    async fn execute_script(&self, _script: &str) -> E2eResult<()> {
        self.state.lock().unwrap().actions.push("script".to_string());
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        std::fs::write(path, b"\x89PNG")?;
        self.state.lock().unwrap().screenshots.push(path.to_path_buf());
        Ok(())
    }
}

/// Built-in flow with the waiter left to the executor
fn builtin(name: &str) -> UiFlow {
    let mut flow = UiFlow::builtin()
        .unwrap()
        .into_iter()
        .find(|f| f.name == name)
        .unwrap();
    flow.wait_timeout_ms = None;
    flow.poll_interval_ms = None;
    flow
}

fn quick() -> Waiter {
    Waiter::from_millis(400, 5)
}

#[tokio::test]
async fn input_alert_flow_waits_for_each_precondition() {
    let page = ScriptedPage::new();
    let flow = builtin("input-alert");

    let results = FlowExecutor::new(&page, quick()).run(&flow).await;

    assert!(flow_passed(&results), "{:?}", results);
    assert_eq!(results.len(), flow.steps.len() + 1);

    let actions = page.actions();
    assert!(actions.contains(&"switch window".to_string()));
    assert!(actions.contains(&"accept dialog Some(\"John Doe\")".to_string()));
    let prompt_answered = actions.iter().position(|a| a.starts_with("accept dialog")).unwrap();
    let button_clicked = actions.iter().position(|a| a.contains("Input box.")).unwrap();
    assert!(button_clicked < prompt_answered);
}

#[tokio::test]
async fn date_picker_flow_checks_iso_format() {
    let page = ScriptedPage::new();
    let flow = builtin("date-picker-format");

    let results = FlowExecutor::new(&page, quick()).run(&flow).await;

    assert!(flow_passed(&results), "{:?}", results);
    assert!(page
        .actions()
        .iter()
        .any(|a| a.ends_with("ISO 8601 - yy-mm-dd")));
}

#[tokio::test]
async fn wrong_greeting_fails_the_final_assertion() {
    let page = ScriptedPage::new().greeting("Jane Roe");
    let flow = builtin("input-alert");

    let results = FlowExecutor::new(&page, quick()).run(&flow).await;

    assert!(!flow_passed(&results));
    let last = results.last().unwrap();
    assert!(last.step_name.starts_with("assert_text"));
    let error = last.error.as_deref().unwrap();
    assert!(error.contains("to contain 'John Doe'"), "{}", error);
}

#[tokio::test]
async fn missing_element_times_out_and_stops_the_flow() {
    let frame = "xpath=//iframe[contains(@src,'input-alert')]";
    let page = ScriptedPage::new().without(frame);
    let flow = builtin("input-alert");
    let dir = tempfile::tempdir().unwrap();

    let results = FlowExecutor::new(&page, quick())
        .with_screenshots(dir.path())
        .run(&flow)
        .await;

    let failed = results.last().unwrap();
    assert!(!failed.success);
    assert!(failed.step_name.starts_with("enter_frame"));
    let error = failed.error.as_deref().unwrap();
    assert!(error.contains("Timed out"), "{}", error);
    assert!(error.contains(frame), "{}", error);
    assert!(failed.duration_ms >= 400);

    // Nothing after the failing step ran
    assert!(!page.actions().iter().any(|a| a.contains("Input box.")));

    let shot = failed.screenshot_path.clone().unwrap();
    assert!(shot.starts_with(dir.path()));
    assert!(shot.exists());
    assert_eq!(page.screenshots(), vec![shot]);
}

#[tokio::test]
async fn step_timeout_overrides_the_flow_budget() {
    let yaml = r#"
name: prompt-never-opens
start_url: http://localhost/
steps:
  - action: answer_prompt
    text: John Doe
    timeout_ms: 50
"#;
    let flow = UiFlow::from_yaml(yaml).unwrap();
    let page = ScriptedPage::new();
    let started = std::time::Instant::now();

    let results = FlowExecutor::new(&page, Waiter::from_millis(5_000, 5)).run(&flow).await;

    assert!(started.elapsed() < std::time::Duration::from_millis(2_000));
    let error = results[1].error.as_deref().unwrap();
    assert!(error.contains("dialog to be present"), "{}", error);
    assert!(results[1].screenshot_path.is_none());
}

#[tokio::test]
async fn dialog_check_errors_surface_in_the_timeout() {
    let yaml = r#"
name: session-lost
start_url: http://localhost/
steps:
  - action: answer_prompt
    text: John Doe
    timeout_ms: 60
"#;
    let flow = UiFlow::from_yaml(yaml).unwrap();
    let page = ScriptedPage::new().failing_dialog_checks("invalid session id");

    let results = FlowExecutor::new(&page, quick()).run(&flow).await;

    let error = results[1].error.as_deref().unwrap();
    assert!(error.contains("dialog to be present"), "{}", error);
    assert!(error.contains("last error: "), "{}", error);
    assert!(error.contains("invalid session id"), "{}", error);
    assert!(!error.contains("last error: none"), "{}", error);
}
