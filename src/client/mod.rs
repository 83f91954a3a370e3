//! Remote transport for the engine's HTTP API.
//!
//! One [`Transport`] serves all endpoint families; the request builders in
//! [`request`] decide the body shape for each of them.

mod error;
pub mod request;
mod transport;

pub use error::{ApiError, HasuraError, TransportError};
pub use request::{
    is_sql, metadata_request_no_prefix, query_request, v2_query_request, BulkRequest, Operation,
    RunSqlArgs, RunSqlStyle, SqlResponse,
};
pub use transport::{
    post, HttpTransport, RawResponse, Transport, ACCESS_KEY_HEADER, ADMIN_SECRET_HEADER,
};
