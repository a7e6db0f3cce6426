//! Armada API client
//!
//! The submit driver only talks to [`ArmadaClient`]; [`RestArmadaClient`] is
//! the production implementation against Armada's REST gateway.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tracing::debug;

use super::types::{EventStreamMessage, JobSubmitRequest, JobSubmitResponse};
use crate::config::ClientConfig;
use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the submit driver needs from Armada
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArmadaClient: Send + Sync {
    /// Submit a batch of jobs
    async fn submit_jobs(&self, request: &JobSubmitRequest) -> Result<JobSubmitResponse>;

    /// Fetch the job set events recorded after `from_message_id`
    /// (from the start when `None`). Returns immediately with what is
    /// available; an empty list means nothing new yet.
    async fn job_set_events(
        &self,
        queue: &str,
        job_set_id: &str,
        from_message_id: Option<String>,
    ) -> Result<Vec<EventStreamMessage>>;
}

/// Client for the Armada REST gateway
pub struct RestArmadaClient {
    http: reqwest::Client,
    base_url: String,
}

/// One line of the event stream body
#[derive(Deserialize)]
struct StreamLine {
    #[serde(default)]
    result: Option<EventStreamMessage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl RestArmadaClient {
    /// Create a client for the configured gateway
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::client(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url(),
        })
    }

    async fn post_json(&self, path: &str, body: &impl serde::Serialize) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "armada request");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::client(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::client(format!("failed to read response from {}: {}", url, e)))?;

        if !status.is_success() {
            return Err(Error::client(format!("{} returned {}: {}", url, status, text)));
        }
        Ok(text)
    }
}

#[async_trait]
impl ArmadaClient for RestArmadaClient {
    async fn submit_jobs(&self, request: &JobSubmitRequest) -> Result<JobSubmitResponse> {
        let body = self.post_json("/v1/job/submit", request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn job_set_events(
        &self,
        queue: &str,
        job_set_id: &str,
        from_message_id: Option<String>,
    ) -> Result<Vec<EventStreamMessage>> {
        let path = format!("/v1/job-set/{}/{}", queue, job_set_id);
        let request = serde_json::json!({
            "watch": false,
            "from_message_id": from_message_id.unwrap_or_default(),
        });
        let body = self.post_json(&path, &request).await?;
        parse_event_stream(&body)
    }
}

/// Parse a newline-delimited event stream body
fn parse_event_stream(body: &str) -> Result<Vec<EventStreamMessage>> {
    let mut messages = Vec::new();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let line: StreamLine = serde_json::from_str(line)?;
        if let Some(error) = line.error {
            return Err(Error::client(format!("event stream error: {}", error)));
        }
        if let Some(message) = line.result {
            messages.push(message);
        }
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armada::JobState;

    #[test]
    fn parses_multi_line_stream() {
        let body = concat!(
            r#"{"result": {"id": "1", "message": {"queued": {"job_id": "a"}}}}"#,
            "\n\n",
            r#"{"result": {"id": "2", "message": {"running": {"job_id": "a"}}}}"#,
            "\n",
        );
        let messages = parse_event_stream(body).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, "2");
        assert_eq!(messages[1].message.state().unwrap().0, JobState::Running);
    }

    #[test]
    fn stream_error_line_fails() {
        let body = r#"{"error": {"code": 5, "message": "job set not found"}}"#;
        let err = parse_event_stream(body).unwrap_err();
        assert!(err.to_string().contains("job set not found"));
    }

    #[test]
    fn empty_body_is_no_events() {
        assert!(parse_event_stream("").unwrap().is_empty());
    }

    #[test]
    fn client_builds_from_config() {
        let config = ClientConfig {
            host: "localhost".to_string(),
            port: 8080,
            disable_ssl: true,
        };
        let client = RestArmadaClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
