pub mod ast;
pub mod error;
pub mod plan_nodes;
pub mod planner;

pub use ast::hash::shape_hash;
pub use ast::normalize::normalize_operation;
pub use ast::operation::{OperationDefinition, OperationKind};
pub use error::PlanError;
pub use plan_nodes::{FetchNode, NodeId, PathSegment, QueryPlan};
pub use planner::{OwnershipPolicy, Planner};
