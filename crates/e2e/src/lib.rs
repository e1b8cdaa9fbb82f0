//! AutoSuite E2E Test Framework
//!
//! This crate drives end-to-end checks against two kinds of targets:
//! - REST resource services, walked through a create/read/update/delete lifecycle
//! - Browser UIs, driven over WebDriver by declarative YAML flows
//!
//! Every wait goes through [`poll::Waiter`], which polls a condition until it
//! holds or a timeout elapses instead of sleeping for a fixed time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SuiteRunner (Rust)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  API scenarios                                              │
//! │    ├── Transport (ApiClient over reqwest)                   │
//! │    ├── ResourceLifecycle                                    │
//! │    │     create -> verify -> update -> verify               │
//! │    │     -> delete_fields -> verify -> destroy              │
//! │    │     -> verify_destroyed                                │
//! │    └── api checks (user lookup, post echo, response time)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UI scenarios                                               │
//! │    ├── DriverHandle (spawned chromedriver)                  │
//! │    ├── Page (WebDriverPage over thirtyfour)                 │
//! │    └── FlowExecutor runs UiFlow (YAML)                      │
//! │          navigate, click, switch_to_new_window,             │
//! │          enter_frame, answer_prompt, select, assert_*       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod browser;
pub mod config;
pub mod driver;
pub mod error;
pub mod flow;
pub mod http;
pub mod lifecycle;
pub mod poll;
pub mod runner;
pub mod snapshot;

pub use browser::{Locator, Page, WebDriverPage};
pub use config::RunnerConfig;
pub use error::{E2eError, E2eResult, FieldMismatch};
pub use flow::{FlowExecutor, UiFlow, UiStep};
pub use http::{ApiClient, ApiRequest, ApiResponse, Transport};
pub use lifecycle::{ResourceEndpoint, ResourceId, ResourceLifecycle};
pub use poll::Waiter;
pub use runner::SuiteRunner;
pub use snapshot::{Expected, FieldSet, Snapshot};
