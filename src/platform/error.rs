//! Crate-wide error type and result alias.

use thiserror::Error;

pub type DroverResult<T> = Result<T, DroverError>;

#[derive(Error, Debug)]
pub enum DroverError {
    /// The spec document could not be decoded at all.
    #[error("spec parse error: {0}")]
    Parse(String),

    /// The spec decoded but is missing a required section or has the wrong
    /// shape (e.g. `paths` is not an object).
    #[error("spec shape error: {0}")]
    SchemaShape(String),

    /// A `$ref` chain re-entered a definition that is still being resolved.
    #[error("cyclic schema reference through definition {0:?}")]
    CyclicSchema(String),

    #[error("unsupported schema type {0:?}")]
    UnsupportedSchemaType(String),

    /// Transport-level failure: connect, timeout, TLS. A response with a
    /// non-2xx status is not a `RequestFailed`.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// A call that had to yield a correlation value came back non-2xx.
    #[error("unexpected status {status} for {method} {path}")]
    UnexpectedStatus {
        method: String,
        path: String,
        status: u16,
    },

    #[error("coverage unavailable: {0}")]
    CoverageUnavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
