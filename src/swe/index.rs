//! Client for the task index service.
//!
//! `GET {base}/task/index/{n}` returns the descriptor of benchmark task `n`.
//! The two test lists arrive as JSON-encoded strings (`"[\"a\", \"b\"]"`);
//! they are decoded here so the rest of the crate only sees `Vec<String>`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::TaskDescriptor;
use crate::error::FetchError;

/// Source of task descriptors.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Fetch the descriptor for one task index.
    async fn fetch(&self, index: u32) -> Result<TaskDescriptor, FetchError>;
}

/// HTTP client for the index service.
#[derive(Debug, Clone)]
pub struct IndexClient {
    base_url: String,
    http_client: Client,
}

impl IndexClient {
    /// Create a client. `timeout` of `None` waits indefinitely.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: builder.build()?,
        })
    }

    /// URL of the descriptor for `index`.
    pub fn task_url(&self, index: u32) -> String {
        format!("{}/task/index/{}", self.base_url, index)
    }
}

#[async_trait]
impl TaskSource for IndexClient {
    async fn fetch(&self, index: u32) -> Result<TaskDescriptor, FetchError> {
        let url = self.task_url(index);
        info!(index, url = %url, "Fetching test case");

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let descriptor = decode_descriptor(index, &body)?;
        debug!(
            index,
            instance_id = %descriptor.instance_id,
            fail_to_pass = descriptor.fail_to_pass.len(),
            pass_to_pass = descriptor.pass_to_pass.len(),
            "Decoded task descriptor"
        );
        Ok(descriptor)
    }
}

/// Wire shape of the index response.
#[derive(Debug, Deserialize)]
struct RawDescriptor {
    #[serde(rename = "Problem_statement")]
    problem_statement: Option<String>,
    git_clone: Option<String>,
    #[serde(rename = "FAIL_TO_PASS", default)]
    fail_to_pass: Option<EncodedList>,
    #[serde(rename = "PASS_TO_PASS", default)]
    pass_to_pass: Option<EncodedList>,
    instance_id: Option<String>,
}

/// A test list, either JSON-encoded inside a string or a plain array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EncodedList {
    Encoded(String),
    Plain(Vec<String>),
}

impl EncodedList {
    fn decode(self, field: &str) -> Result<Vec<String>, FetchError> {
        match self {
            Self::Plain(items) => Ok(items),
            Self::Encoded(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Self::Encoded(raw) => serde_json::from_str(&raw)
                .map_err(|e| FetchError::Decode(format!("{field} is not a JSON string list: {e}"))),
        }
    }
}

/// Decode an index response body into a typed descriptor.
pub fn decode_descriptor(index: u32, body: &str) -> Result<TaskDescriptor, FetchError> {
    let raw: RawDescriptor =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    let fail_to_pass = match raw.fail_to_pass {
        Some(list) => list.decode("FAIL_TO_PASS")?,
        None => Vec::new(),
    };
    let pass_to_pass = match raw.pass_to_pass {
        Some(list) => list.decode("PASS_TO_PASS")?,
        None => Vec::new(),
    };

    Ok(TaskDescriptor {
        index,
        problem_statement: raw
            .problem_statement
            .ok_or(FetchError::MissingField("Problem_statement"))?,
        git_clone: raw.git_clone.ok_or(FetchError::MissingField("git_clone"))?,
        fail_to_pass,
        pass_to_pass,
        instance_id: raw
            .instance_id
            .ok_or(FetchError::MissingField("instance_id"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_body() -> serde_json::Value {
        serde_json::json!({
            "Problem_statement": "Division by zero in foo()",
            "git_clone": "git clone https://github.com/o/r.git && git checkout abc123",
            "FAIL_TO_PASS": "[\"tests/test_foo.py::test_zero\"]",
            "PASS_TO_PASS": "[\"tests/test_foo.py::test_one\", \"tests/test_foo.py::test_two\"]",
            "instance_id": "o__r-42"
        })
    }

    #[test]
    fn decodes_encoded_lists() {
        let task = decode_descriptor(3, &sample_body().to_string()).unwrap();
        assert_eq!(task.index, 3);
        assert_eq!(task.instance_id, "o__r-42");
        assert_eq!(task.fail_to_pass, vec!["tests/test_foo.py::test_zero"]);
        assert_eq!(task.pass_to_pass.len(), 2);
    }

    #[test]
    fn absent_lists_default_to_empty() {
        let body = serde_json::json!({
            "Problem_statement": "p",
            "git_clone": "git clone https://x/y.git",
            "instance_id": "id"
        });
        let task = decode_descriptor(1, &body.to_string()).unwrap();
        assert!(task.fail_to_pass.is_empty());
        assert!(task.pass_to_pass.is_empty());
    }

    #[test]
    fn plain_arrays_are_accepted() {
        let body = serde_json::json!({
            "Problem_statement": "p",
            "git_clone": "git clone https://x/y.git",
            "FAIL_TO_PASS": ["a"],
            "instance_id": "id"
        });
        let task = decode_descriptor(1, &body.to_string()).unwrap();
        assert_eq!(task.fail_to_pass, vec!["a"]);
    }

    #[test]
    fn malformed_list_is_a_decode_error() {
        let body = serde_json::json!({
            "Problem_statement": "p",
            "git_clone": "git clone https://x/y.git",
            "FAIL_TO_PASS": "not a list",
            "instance_id": "id"
        });
        let err = decode_descriptor(1, &body.to_string()).unwrap_err();
        assert!(matches!(err, FetchError::Decode(ref m) if m.contains("FAIL_TO_PASS")));
    }

    #[test]
    fn missing_instance_id_is_reported() {
        let body = serde_json::json!({
            "Problem_statement": "p",
            "git_clone": "git clone https://x/y.git"
        });
        let err = decode_descriptor(1, &body.to_string()).unwrap_err();
        assert!(matches!(err, FetchError::MissingField("instance_id")));
    }

    #[tokio::test]
    async fn fetch_hits_task_index_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/index/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = IndexClient::new(server.uri(), None).unwrap();
        let task = client.fetch(42).await.unwrap();
        assert_eq!(task.index, 42);
        assert_eq!(task.problem_statement, "Division by zero in foo()");
    }

    #[tokio::test]
    async fn fetch_non_success_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/index/9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = IndexClient::new(server.uri(), Some(Duration::from_secs(5))).unwrap();
        let err = client.fetch(9).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404 }));
    }

    #[test]
    fn task_url_strips_trailing_slash() {
        let client = IndexClient::new("http://localhost:8081/", None).unwrap();
        assert_eq!(client.task_url(5), "http://localhost:8081/task/index/5");
    }
}
