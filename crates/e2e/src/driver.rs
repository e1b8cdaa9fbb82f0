//! WebDriver management - spawning and health checking chromedriver

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::poll::Waiter;

/// Handle to a running chromedriver process
pub struct DriverHandle {
    child: Child,
    pub server_url: String,
    pub port: u16,
}

impl DriverHandle {
    /// Spawn chromedriver and wait until it reports ready
    pub async fn spawn(config: DriverConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let server_url = format!("http://127.0.0.1:{}", port);

        info!("Spawning {} on port {}", config.binary_path.display(), port);

        let child = Command::new(&config.binary_path)
            .arg(format!("--port={}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                E2eError::DriverStartup(format!(
                    "Failed to spawn {}: {}",
                    config.binary_path.display(),
                    e
                ))
            })?;

        let handle = DriverHandle {
            child,
            server_url: server_url.clone(),
            port,
        };

        // Dropping the handle on failure kills the process
        handle.wait_until_ready(config.startup_timeout()).await?;

        info!("WebDriver is ready at {}", server_url);
        Ok(handle)
    }

    /// Poll `/status` until the driver accepts sessions
    async fn wait_until_ready(&self, timeout: Duration) -> E2eResult<()> {
        let status_url = format!("{}/status", self.server_url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let mut attempts = 0;
        let waiter = Waiter::new(timeout, Duration::from_millis(100));
        let outcome = waiter
            .until("chromedriver /status to report ready", || {
                attempts += 1;
                probe_status(&client, &status_url)
            })
            .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("{}", e);
                Err(E2eError::DriverHealthCheck(attempts))
            }
        }
    }

    /// Base URL for WebDriver sessions
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Stop the driver
    pub fn stop(&mut self) -> E2eResult<()> {
        info!("Stopping chromedriver (pid: {})", self.child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(200));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

async fn probe_status(client: &reqwest::Client, url: &str) -> E2eResult<Option<()>> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        debug!("Status check returned {}", response.status());
        return Ok(None);
    }
    let body: serde_json::Value = response.json().await?;
    Ok(status_ready(&body).then_some(()))
}

/// W3C status payload: `{"value": {"ready": true, ...}}`
fn status_ready(body: &serde_json::Value) -> bool {
    body.pointer("/value/ready")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

/// Configuration for spawning chromedriver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Path to the chromedriver binary
    pub binary_path: PathBuf,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Timeout for driver startup
    pub startup_timeout_ms: u64,
}

impl DriverConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("chromedriver"),
            port: None,
            startup_timeout_ms: 30_000,
        }
    }
}

/// Find a free port to use
fn find_free_port() -> E2eResult<u16> {
    use std::net::TcpListener;

    let port = TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert!(port > 1024);
    }

    #[test]
    fn ready_flag_is_read_from_value() {
        assert!(status_ready(&json!({ "value": { "ready": true, "message": "ChromeDriver ready" } })));
        assert!(!status_ready(&json!({ "value": { "ready": false } })));
        assert!(!status_ready(&json!({ "status": 0 })));
    }

    #[tokio::test]
    async fn missing_binary_fails_to_start() {
        let config = DriverConfig {
            binary_path: PathBuf::from("/nonexistent/chromedriver"),
            ..Default::default()
        };
        let err = DriverHandle::spawn(config).await.err().unwrap();
        assert!(matches!(err, E2eError::DriverStartup(_)));
    }
}
