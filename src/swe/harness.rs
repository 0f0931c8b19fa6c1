//! Client for the remote SWE-bench test harness.
//!
//! The harness runs the designated FAIL_TO_PASS / PASS_TO_PASS tests against a
//! repository directory it can see (usually a Docker mount of the local repos
//! directory) and reports which tests succeeded. Its answer is doubly encoded:
//! the HTTP body is `{"harnessOutput": "<json string>"}` and the inner string
//! is an object keyed by instance id.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::EvalError;

/// Maximum response body echoed back in [`EvalError::Status`].
const MAX_ERROR_BODY: usize = 500;

/// Payload submitted to `POST {base}/test`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub instance_id: String,
    /// Repository path as seen by the harness.
    #[serde(rename = "repoDir")]
    pub repo_dir: String,
    #[serde(rename = "FAIL_TO_PASS")]
    pub fail_to_pass: Vec<String>,
    #[serde(rename = "PASS_TO_PASS")]
    pub pass_to_pass: Vec<String>,
}

/// Success / failure lists of one test category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOutcome {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failure: Vec<String>,
}

impl CategoryOutcome {
    pub fn passed(&self) -> usize {
        self.success.len()
    }

    pub fn total(&self) -> usize {
        self.success.len() + self.failure.len()
    }

    /// `passed/total`, as printed in the result log.
    pub fn ratio(&self) -> String {
        format!("{}/{}", self.passed(), self.total())
    }
}

/// Outcome of one harness evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub instance_id: String,
    pub fail_to_pass: CategoryOutcome,
    pub pass_to_pass: CategoryOutcome,
}

impl EvaluationResult {
    /// True when every designated test passed.
    pub fn is_resolved(&self) -> bool {
        self.fail_to_pass.failure.is_empty()
            && self.pass_to_pass.failure.is_empty()
            && self.fail_to_pass.total() > 0
    }
}

/// Something that can evaluate a prepared repository.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResult, EvalError>;
}

/// HTTP client for the harness service.
#[derive(Debug, Clone)]
pub struct HarnessClient {
    base_url: String,
    http_client: Client,
}

impl HarnessClient {
    /// Create a client. `timeout` of `None` waits indefinitely, which matters
    /// because a harness run can take many minutes.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, EvalError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: builder.build()?,
        })
    }
}

#[async_trait]
impl Evaluator for HarnessClient {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResult, EvalError> {
        let url = format!("{}/test", self.base_url);
        info!(
            instance_id = %request.instance_id,
            repo_dir = %request.repo_dir,
            "Calling SWE-Bench REST service"
        );

        let response = self.http_client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvalError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let body = response.text().await?;
        decode_harness_response(&request.instance_id, &body)
    }
}

#[derive(Debug, Deserialize)]
struct HarnessResponse {
    #[serde(rename = "harnessOutput", default)]
    harness_output: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstanceReport {
    tests_status: TestsStatus,
}

#[derive(Debug, Deserialize)]
struct TestsStatus {
    #[serde(rename = "FAIL_TO_PASS")]
    fail_to_pass: CategoryOutcome,
    #[serde(rename = "PASS_TO_PASS")]
    pass_to_pass: CategoryOutcome,
}

/// Decode the outer harness response body.
pub fn decode_harness_response(
    instance_id: &str,
    body: &str,
) -> Result<EvaluationResult, EvalError> {
    let response: HarnessResponse = serde_json::from_str(body)
        .map_err(|e| EvalError::Data(format!("harness response is not JSON: {e}")))?;
    let output = response.harness_output.unwrap_or_default();
    decode_harness_output(instance_id, &output)
}

/// Decode the inner `harnessOutput` string.
///
/// The entry is looked up by instance id. When that key is missing but the
/// output holds exactly one entry, that entry is used instead.
pub fn decode_harness_output(
    instance_id: &str,
    output: &str,
) -> Result<EvaluationResult, EvalError> {
    if output.trim().is_empty() {
        return Err(EvalError::Data(
            "No data in harnessOutput (possible evaluation error or empty result)".to_string(),
        ));
    }

    let mut reports: BTreeMap<String, InstanceReport> = serde_json::from_str(output)
        .map_err(|e| EvalError::Data(format!("malformed harnessOutput: {e}")))?;

    if reports.is_empty() {
        return Err(EvalError::Data(
            "No data in harnessOutput (possible evaluation error or empty result)".to_string(),
        ));
    }

    let (key, report) = match reports.remove_entry(instance_id) {
        Some(entry) => entry,
        None if reports.len() == 1 => {
            let entry = reports.pop_first().ok_or_else(|| {
                EvalError::Data("harnessOutput lost its only entry".to_string())
            })?;
            warn!(
                expected = %instance_id,
                found = %entry.0,
                "Instance id not in harness output, using its only entry"
            );
            entry
        }
        None => {
            return Err(EvalError::Data(format!(
                "instance '{instance_id}' not found in harnessOutput ({} entries)",
                reports.len()
            )))
        }
    };

    Ok(EvaluationResult {
        instance_id: key,
        fail_to_pass: report.tests_status.fail_to_pass,
        pass_to_pass: report.tests_status.pass_to_pass,
    })
}
