//! Bulk request accumulation and error attribution.

mod builder;
mod path;

pub use builder::BulkBuilder;
pub use path::{failed_index, lookup, parse_path, PathSegment};

use crate::client::{ApiError, HasuraError};
use serde_json::Value;

/// A server error traced back to the operation that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributedError {
    /// File the failing operation was appended for
    pub file: Option<String>,
    /// Index of the failing operation in the bulk
    pub index: Option<usize>,
    /// Pretty-printed JSON of the request fragment the error path points at
    pub query: Option<String>,
    pub error: HasuraError,
}

/// Map a server error for `request` (the serialized bulk built by `bulk`)
/// back to the failing operation. Returns `None` when the error carries no
/// server body.
pub fn attribute_error(
    error: &ApiError,
    request: &Value,
    bulk: &BulkBuilder,
) -> Option<AttributedError> {
    let server = error.as_server_error()?;
    let index = failed_index(&server.path);
    let query = lookup(request, &server.path)
        .and_then(|fragment| serde_json::to_string_pretty(fragment).ok());

    Some(AttributedError {
        file: index.and_then(|i| bulk.file_for(i)).map(str::to_string),
        index,
        query,
        error: server.clone(),
    })
}
