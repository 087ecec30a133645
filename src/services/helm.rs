use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::config::helm::HelmConfig;
use crate::error::{AppError, Result};
use crate::services::registry::ComponentConfig;

/// Extra time granted on top of Helm's own `--timeout` before the process is killed
const KILL_GRACE: Duration = Duration::from_secs(30);

/// Runs the Helm CLI as an async subprocess with a hard timeout
#[derive(Debug, Clone)]
pub struct HelmRunner {
    binary: String,
    timeout: Duration,
    kill_grace: Duration,
}

impl HelmRunner {
    pub fn new(binary: &str, timeout: Duration) -> Self {
        Self {
            binary: binary.to_string(),
            timeout,
            kill_grace: KILL_GRACE,
        }
    }

    pub fn from_config(config: &HelmConfig) -> Self {
        Self::new(&config.binary, config.timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run Helm, optionally feeding `stdin`, and return its stdout.
    ///
    /// A non-zero exit becomes `AppError::Deployer` carrying stderr.
    pub async fn run(&self, args: &[String], stdin: Option<&[u8]>) -> Result<String> {
        tracing::debug!(binary = %self.binary, ?args, "Running helm");

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Deployer(format!("Failed to run {}: {}", self.binary, e)))?;

        let mut stdin_handle = child.stdin.take();
        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();
        let limit = self.timeout + self.kill_grace;

        let outcome = tokio::time::timeout(limit, async {
            let (status, _, stdout, stderr) = tokio::join!(
                child.wait(),
                async {
                    if let (Some(input), Some(mut handle)) = (stdin, stdin_handle.take()) {
                        if let Err(e) = handle.write_all(input).await {
                            tracing::debug!("Failed to write helm stdin: {}", e);
                        }
                        // Dropping the handle closes stdin so helm sees EOF on `--values -`
                    }
                },
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stdout_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stderr_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
            );
            (status, stdout, stderr)
        })
        .await;

        let (status, stdout, stderr) = match outcome {
            Ok(result) => result,
            Err(_) => {
                let _ = child.kill().await;
                return Err(AppError::Timeout(format!(
                    "{} timed out after {}s",
                    self.binary,
                    limit.as_secs()
                )));
            }
        };

        let status = status?;
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(AppError::Deployer(format!(
                "Helm command failed: {}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&stdout).to_string())
    }
}

/// `helm repo add --force-update` for the component's chart repository
pub fn repo_add_args(component: &ComponentConfig) -> Vec<String> {
    vec![
        "repo".to_string(),
        "add".to_string(),
        component.chart.repo_name.clone(),
        component.chart.repo_url.clone(),
        "--force-update".to_string(),
    ]
}

/// `helm upgrade --install` reading values from stdin and waiting for readiness
pub fn upgrade_args(component: &ComponentConfig, timeout: Duration) -> Vec<String> {
    vec![
        "upgrade".to_string(),
        "--install".to_string(),
        component.release_name.clone(),
        component.chart.reference(),
        "--version".to_string(),
        component.chart.version.clone(),
        "--namespace".to_string(),
        component.namespace.clone(),
        "--values".to_string(),
        "-".to_string(),
        "--wait".to_string(),
        "--timeout".to_string(),
        format!("{}s", timeout.as_secs()),
    ]
}

pub fn uninstall_args(component: &ComponentConfig) -> Vec<String> {
    vec![
        "uninstall".to_string(),
        component.release_name.clone(),
        "--namespace".to_string(),
        component.namespace.clone(),
    ]
}
