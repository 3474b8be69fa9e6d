//! Outcome classification for a request.
//!
//! A request ends in exactly one of four ways:
//!
//! | Outcome | Cause | Reported as |
//! |---|---|---|
//! | [`Outcome::Image`] | pipeline built an image | engine response, unchanged |
//! | [`Outcome::Passthrough`] | engine handed back a ready response (e.g. upstream 404) | that response, unchanged |
//! | [`Outcome::Invalid`] | bad grammar, arity, value, origin, op budget | `400`, the literal message |
//! | [`Outcome::Internal`] | engine fault, panic | `500`, generic or with detail |
//!
//! Inside the pipeline the three abort reasons travel as [`Halt`] so they can
//! be propagated with `?`. Only [`Halt::Fault`] is an actual failure.

use crate::engine::{EngineError, Response};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as _;
use thiserror::Error;

/// A client-fixable problem with the request. The message is shown verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Why a pipeline stopped before producing an image.
#[derive(Debug)]
pub enum Halt {
    Invalid(ValidationError),
    /// Not an error: a response that must reach the client as-is.
    Respond(Response),
    Fault(EngineError),
}

impl From<ValidationError> for Halt {
    fn from(err: ValidationError) -> Self {
        Halt::Invalid(err)
    }
}

impl From<EngineError> for Halt {
    fn from(err: EngineError) -> Self {
        match err {
            // The engine rejected a value the client supplied (e.g. a color).
            EngineError::InvalidArgument(msg) => Halt::Invalid(ValidationError::new(msg)),
            other => Halt::Fault(other),
        }
    }
}

/// An unexpected failure with its diagnostic detail.
#[derive(Debug)]
pub struct InternalError {
    message: String,
    detail: String,
}

impl InternalError {
    pub fn from_engine(err: &EngineError) -> Self {
        let mut detail = String::new();
        let mut source = err.source();
        while let Some(cause) = source {
            detail.push_str(&format!("caused by: {cause}\n"));
            source = cause.source();
        }
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            detail.push_str(&backtrace.to_string());
        }
        Self {
            message: err.to_string(),
            detail,
        }
    }

    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self {
            message: format!("panic: {message}"),
            detail: String::new(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// How one request ended.
#[derive(Debug)]
pub enum Outcome {
    Image(Response),
    Passthrough(Response),
    Invalid(ValidationError),
    Internal(InternalError),
}

impl Outcome {
    pub fn status(&self) -> u16 {
        match self {
            Outcome::Image(r) | Outcome::Passthrough(r) => r.status,
            Outcome::Invalid(_) => 400,
            Outcome::Internal(_) => 500,
        }
    }

    /// Turn the outcome into what the client receives.
    ///
    /// With `show_detail` off, internal failures carry a generic body.
    pub fn into_response(self, show_detail: bool) -> Response {
        match self {
            Outcome::Image(r) | Outcome::Passthrough(r) => r,
            Outcome::Invalid(err) => Response::text(400, err.message()),
            Outcome::Internal(err) if show_detail => {
                let mut body = format!("Error: {}", err.message());
                if !err.detail().is_empty() {
                    body.push('\n');
                    body.push_str(err.detail());
                }
                Response::text(500, body)
            }
            Outcome::Internal(_) => Response::text(500, "Internal server error"),
        }
    }
}
