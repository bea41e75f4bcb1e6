use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::ExecutorError;
use crate::executor::{BlockExecutor, ExecuteRequest, ExecuteResponse, NodeLogger};

/// Where the remote executor lives and how long a call may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpExecutorConfig {
  pub base_url: String,
  pub request_timeout: Duration,
}

impl HttpExecutorConfig {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into(),
      request_timeout: Duration::from_secs(30),
    }
  }

  pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
    self.request_timeout = request_timeout;
    self
  }

  fn endpoint(&self) -> String {
    format!("{}/execute", self.base_url.trim_end_matches('/'))
  }
}

/// Sends each block to `{base_url}/execute` as JSON.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
  client: reqwest::Client,
  endpoint: String,
}

impl HttpExecutor {
  pub fn new(config: &HttpExecutorConfig) -> Result<Self, ExecutorError> {
    let client = reqwest::Client::builder()
      .timeout(config.request_timeout)
      .build()?;
    Ok(Self {
      client,
      endpoint: config.endpoint(),
    })
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }
}

#[async_trait]
impl BlockExecutor for HttpExecutor {
  #[instrument(name = "http_execute", skip_all, fields(node_id = %request.node_id, block_type = %request.block_type))]
  async fn execute(&self, request: ExecuteRequest, logger: NodeLogger) -> Result<ExecuteResponse, ExecutorError> {
    debug!(endpoint = %self.endpoint, "dispatching block");
    let response = self.client.post(&self.endpoint).json(&request).send().await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      logger.warn(format!("executor answered {status}"));
      return Err(ExecutorError::Transport {
        message: format!("HTTP {status}: {}", body.trim()),
      });
    }

    response.json::<ExecuteResponse>().await.map_err(|e| ExecutorError::InvalidResponse {
      message: e.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_endpoint_joins_base_url() {
    assert_eq!(HttpExecutorConfig::new("http://exec:9000").endpoint(), "http://exec:9000/execute");
    assert_eq!(HttpExecutorConfig::new("http://exec:9000/api/").endpoint(), "http://exec:9000/api/execute");
  }

  #[test]
  fn test_client_builds_with_timeout() {
    let config = HttpExecutorConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_millis(250));
    let executor = HttpExecutor::new(&config).unwrap();
    assert_eq!(executor.endpoint(), "http://127.0.0.1:1/execute");
  }
}
