mod ast_value;
pub mod deep_merge;
pub mod error;
pub mod execution;
pub mod executors;
pub mod projection;
pub mod representations;
pub mod response;
pub mod traverse;
pub mod variables;

pub use error::{FetchError, StitchError};
pub use execution::{execute_query_plan, ExecutionOptions};
pub use executors::common::SubgraphExecutor;
pub use executors::http::HttpSubgraphExecutor;
pub use executors::map::SubgraphExecutorMap;
pub use response::{ExecutionResult, GraphQLError, SubgraphRequest};
