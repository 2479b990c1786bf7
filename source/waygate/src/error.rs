//! The gateway's error taxonomy (see the filter contract in
//! [`crate::engine::filters`] and the pipeline in [`crate::engine::pipeline`]).
//!
//! Three kinds of failure exist:
//! - [`GatewayError`]: a user-visible failure raised by a filter. Carries a
//!   status code, a short cause token, and a message.
//! - [`ConfigError`]: a filter script failed to compile. Swallowed by the
//!   loader after logging; never reaches a request.
//! - an "uncaught exception" is not its own type -- it's any non-`GatewayError`
//!   panic/error surfacing from inside a filter, which [`GatewayError::uncaught`]
//!   wraps into a 500 before it escapes the processor.

use thiserror::Error;

/// A user-visible gateway failure, raised by a filter during PRE, ROUTE, or
/// POST and handled by the ERROR stage.
#[derive(Debug, Error)]
#[error("gateway error {status}: {message}")]
pub struct GatewayError {
    pub status: u16,
    pub error_cause: String,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GatewayError {
    pub fn new(status: u16, error_cause: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_cause: error_cause.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Wrap a filter panic or non-gateway error caught mid-stage. The cause
    /// token embeds the stage and, where known, the filter's name, matching
    /// `UNCAUGHT_EXCEPTION_IN_<STAGE>_FILTER[_<name>]`.
    pub fn uncaught(stage: &str, filter_name: Option<&str>) -> Self {
        let cause = match filter_name {
            Some(name) => format!("UNCAUGHT_EXCEPTION_IN_{stage}_FILTER_{name}"),
            None => format!("UNCAUGHT_EXCEPTION_IN_{stage}_FILTER"),
        };
        Self::new(500, cause, "an unexpected error occurred while processing the request")
    }

    /// The token clients see in the error-cause header: `UNKNOWN` when empty.
    pub fn display_cause(&self) -> &str {
        if self.error_cause.is_empty() {
            "UNKNOWN"
        } else {
            &self.error_cause
        }
    }
}

/// Compiling a filter script failed. The loader logs this and keeps serving
/// whatever instance (if any) previously compiled from the same path.
#[derive(Debug, Error)]
#[error("failed to compile filter {path}: {message}")]
pub struct ConfigError {
    pub path: String,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConfigError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}
