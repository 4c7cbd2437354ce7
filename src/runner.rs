//! Client side of the remote code-execution sandbox.
//!
//! The sandbox takes source text (plus an optional expected output) and
//! answers with stdout/stderr and a success flag. Transport faults and
//! timeouts surface as `RunnerError`; the stage machine turns those into a
//! retryable "runner unavailable" outcome.
//!
//! We never log submitted source, only its length.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::RunnerSettings;
use crate::util::{outputs_match, trunc_for_log};

/// What the sandbox reports for one run.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunVerdict {
  pub success: bool,
  #[serde(default)]
  pub output: String,
  #[serde(default)]
  pub error: String,
  #[serde(default)]
  pub matches_expected: bool,
}

impl RunVerdict {
  /// A run solves a stage when it succeeded without a runtime error and, if an
  /// expected output is set, produced it.
  pub fn solves(&self, expected: Option<&str>) -> bool {
    if !self.success || !self.error.trim().is_empty() {
      return false;
    }
    match expected {
      None => true,
      Some(exp) => self.matches_expected || outputs_match(&self.output, exp),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
  #[error("no code runner configured")]
  NotConfigured,

  #[error("code runner timed out after {0:?}")]
  Timeout(Duration),

  #[error("code runner transport error: {0}")]
  Transport(String),

  #[error("code runner HTTP {status}: {body}")]
  Http { status: u16, body: String },

  #[error("code runner response could not be decoded: {0}")]
  Decode(String),
}

#[async_trait]
pub trait CodeRunner: Send + Sync {
  async fn execute(&self, code: &str, expected_output: Option<&str>) -> Result<RunVerdict, RunnerError>;
}

/// Bounds any runner call. An elapsed timer is reported like a transport fault.
pub async fn run_with_timeout(
  runner: &dyn CodeRunner,
  code: &str,
  expected_output: Option<&str>,
  timeout: Duration,
) -> Result<RunVerdict, RunnerError> {
  match tokio::time::timeout(timeout, runner.execute(code, expected_output)).await {
    Ok(result) => result,
    Err(_) => Err(RunnerError::Timeout(timeout)),
  }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest<'a> {
  request_id: String,
  language: &'a str,
  code: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  expected_output: Option<&'a str>,
}

#[derive(Deserialize)]
struct ErrorBody {
  #[serde(default)]
  error: Option<String>,
  #[serde(default)]
  message: Option<String>,
}

fn extract_runner_error(body: &str) -> Option<String> {
  let parsed: ErrorBody = serde_json::from_str(body).ok()?;
  parsed.error.or(parsed.message)
}

/// Sandbox reached over HTTP: `POST {base_url}/execute`.
#[derive(Clone)]
pub struct HttpCodeRunner {
  pub client: reqwest::Client,
  pub base_url: String,
  pub language: String,
}

impl HttpCodeRunner {
  pub fn new(base_url: impl Into<String>, language: impl Into<String>, timeout: Duration) -> Result<Self, RunnerError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| RunnerError::Transport(e.to_string()))?;
    let base_url = base_url.into().trim_end_matches('/').to_string();
    Ok(Self { client, base_url, language: language.into() })
  }

  /// Construct the client if a runner URL is configured; otherwise return None.
  pub fn from_settings(settings: &RunnerSettings) -> Option<Self> {
    let base_url = settings.base_url.clone().filter(|u| !u.trim().is_empty())?;
    match Self::new(base_url, settings.language.clone(), settings.timeout()) {
      Ok(r) => Some(r),
      Err(e) => {
        error!(target: "runner", error = %e, "Failed to build code runner client");
        None
      }
    }
  }
}

#[async_trait]
impl CodeRunner for HttpCodeRunner {
  #[instrument(level = "info", skip(self, code, expected_output), fields(language = %self.language, code_len = code.len(), has_expected = expected_output.is_some()))]
  async fn execute(&self, code: &str, expected_output: Option<&str>) -> Result<RunVerdict, RunnerError> {
    let url = format!("{}/execute", self.base_url);
    let req = ExecuteRequest {
      request_id: Uuid::new_v4().to_string(),
      language: &self.language,
      code,
      expected_output,
    };

    let start = std::time::Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "codequest/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&req).send().await.map_err(|e| RunnerError::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_runner_error(&body).unwrap_or(body);
      error!(target: "runner", status, body = %trunc_for_log(&msg, 200), "Code runner returned an error status");
      return Err(RunnerError::Http { status, body: msg });
    }

    let verdict: RunVerdict = res.json().await.map_err(|e| RunnerError::Decode(e.to_string()))?;
    info!(target: "runner", elapsed = ?start.elapsed(), success = verdict.success, output_len = verdict.output.len(), "Code run finished");
    Ok(verdict)
  }
}
