use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use tracing::{instrument, trace};
use url::Url;

use crate::error::FetchError;
use crate::executors::common::SubgraphExecutor;
use crate::response::{ExecutionResult, SubgraphRequest};

/// Talks GraphQL-over-HTTP to one subgraph endpoint.
#[derive(Debug, Clone)]
pub struct HttpSubgraphExecutor {
    pub subgraph_name: String,
    pub endpoint: Url,
    client: reqwest::Client,
    header_map: HeaderMap,
    timeout: Duration,
}

impl HttpSubgraphExecutor {
    pub fn new(
        subgraph_name: impl Into<String>,
        endpoint: Url,
        client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        let mut header_map = HeaderMap::new();
        header_map.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        HttpSubgraphExecutor {
            subgraph_name: subgraph_name.into(),
            endpoint,
            client,
            header_map,
            timeout,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        // Timeouts, connection failures and mid-body drops are all worth a
        // retry against a healthy replica.
        if err.is_timeout() || err.is_connect() || err.is_body() || err.is_request() {
            FetchError::Transient {
                subgraph: self.subgraph_name.clone(),
                message: err.to_string(),
            }
        } else {
            FetchError::Application {
                subgraph: self.subgraph_name.clone(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl SubgraphExecutor for HttpSubgraphExecutor {
    #[instrument(level = "trace", skip_all, fields(subgraph = %self.subgraph_name))]
    async fn execute(&self, request: SubgraphRequest) -> Result<ExecutionResult, FetchError> {
        trace!(endpoint = %self.endpoint, "sending subgraph request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.header_map.clone())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FetchError::Transient {
                subgraph: self.subgraph_name.clone(),
                message: format!("subgraph responded with status {}", status),
            });
        }
        if status.is_client_error() {
            return Err(FetchError::Application {
                subgraph: self.subgraph_name.clone(),
                message: format!("subgraph responded with status {}", status),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;
        serde_json::from_slice(&bytes).map_err(|err| FetchError::Application {
            subgraph: self.subgraph_name.clone(),
            message: format!("failed to parse subgraph response: {}", err),
        })
    }
}
