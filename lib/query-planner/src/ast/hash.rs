use xxhash_rust::xxh3::xxh3_64;

use super::operation::OperationDefinition;

/// Hashes the shape of a normalized operation. Formatting and fragment
/// factoring of the source text do not matter, only the rendered structure
/// does, so equivalent requests share a plan-cache entry. Variable values
/// live outside the document and never affect the hash.
pub fn shape_hash(operation: &OperationDefinition) -> u64 {
    xxh3_64(operation.to_string().as_bytes())
}
