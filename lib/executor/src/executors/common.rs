use async_trait::async_trait;

use crate::error::FetchError;
use crate::response::{ExecutionResult, SubgraphRequest};

/// One subgraph as the executor sees it. Implementations decide the
/// transport; the engine only cares about the GraphQL request/response
/// contract and the transient/application error split.
#[async_trait]
pub trait SubgraphExecutor: Send + Sync {
    async fn execute(&self, request: SubgraphRequest) -> Result<ExecutionResult, FetchError>;
}
