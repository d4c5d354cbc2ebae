use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueryPlannerConfig {
    /// Maximum number of query plans kept in the shape-keyed plan cache.
    #[serde(default = "plan_cache_size_default")]
    pub plan_cache_size: u64,

    /// Policy for picking the owning subgraph when more than one subgraph
    /// declares the same field.
    #[serde(default)]
    pub ownership_policy: OwnershipPolicy,
}

impl Default for QueryPlannerConfig {
    fn default() -> Self {
        Self {
            plan_cache_size: plan_cache_size_default(),
            ownership_policy: OwnershipPolicy::default(),
        }
    }
}

fn plan_cache_size_default() -> u64 {
    1000
}

/// Tie-break policy for fields declared by multiple subgraphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum OwnershipPolicy {
    /// Prefer the subgraph that also owns the parent type's key fields,
    /// minimizing cross-subgraph hops. Ties fall back to declaration order.
    #[default]
    #[serde(rename = "key-locality")]
    KeyLocality,

    /// Always pick the first subgraph in composed declaration order.
    #[serde(rename = "declaration-order")]
    DeclarationOrder,
}
