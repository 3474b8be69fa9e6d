//! Image engine trait and shared types.
//!
//! The [`ImageEngine`] trait is the whole contract between the query-string
//! core and whatever does the pixel work: load, blank canvas, transform,
//! composite, build, release, and the two name lookups.
//!
//! Images are referred to by [`ImageHandle`], an opaque id into engine-owned
//! storage. A handle is move-only: every call that takes one by value consumes
//! it, whether the call succeeds or not, so a stale handle cannot be reused.
//!
//! The production implementation is
//! [`RustEngine`](super::rust_engine::RustEngine).

use super::params::{Canvas, OutputFormat, Placement, ResizeFilter, Transform};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Fetch failed: {0}")]
    Fetch(String),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Unknown image handle {0}")]
    UnknownHandle(u64),
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

/// Opaque, move-only reference to an image held by an engine.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ImageHandle(u64);

impl ImageHandle {
    /// Only engines mint handles.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A complete HTTP-style response: the build artifact, a passed-through
/// upstream response, or an error report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// Plain-text response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![(
                "Content-Type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: body.into().into_bytes(),
        }
    }

    /// Case-insensitive header lookup, first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of loading a remote source.
#[derive(Debug)]
pub enum Loaded {
    Image(ImageHandle),
    /// The engine produced a response that must reach the client unchanged.
    Response(Response),
}

/// Trait for image engines.
///
/// Every method taking an [`ImageHandle`] by value consumes it, on success and
/// on failure alike. Handles that are never consumed must be given back
/// through [`release`](ImageEngine::release).
pub trait ImageEngine: Sync {
    /// Fetch and decode a remote image.
    fn load_url(&self, url: &Url) -> Result<Loaded, EngineError>;

    /// Create a blank canvas.
    fn blank(&self, canvas: &Canvas) -> Result<ImageHandle, EngineError>;

    /// Apply one single-image operation.
    fn transform(&self, image: ImageHandle, op: &Transform) -> Result<ImageHandle, EngineError>;

    /// Draw `overlay` onto `base`.
    fn composite(
        &self,
        base: ImageHandle,
        overlay: ImageHandle,
        placement: &Placement,
    ) -> Result<ImageHandle, EngineError>;

    /// Encode the image. `None` keeps the source format.
    fn build(
        &self,
        image: ImageHandle,
        format: Option<OutputFormat>,
    ) -> Result<Response, EngineError>;

    /// Free an image that will not be consumed otherwise.
    fn release(&self, image: ImageHandle) -> Result<(), EngineError>;

    fn format_by_name(&self, name: &str) -> Option<OutputFormat> {
        name.parse().ok()
    }

    fn filter_by_name(&self, name: &str) -> Option<ResizeFilter> {
        name.parse().ok()
    }
}
