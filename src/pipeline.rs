//! Request pipeline.
//!
//! One request URL becomes one image:
//!
//! ```text
//! url= / empty=      →  source image (maybe resolved recursively)
//! op keys, in order  →  registry → engine transform, one by one
//! format=            →  engine build
//! ```
//!
//! ## Same-origin recursion
//!
//! When `url=` or an overlay points back at this endpoint (same origin and
//! same path as the request), the target is not fetched. Its own query string
//! is run through the pipeline instead, sharing the request's
//! [`RequestContext`], so nested operations draw from the same `max_ops`
//! budget. Nesting is also capped at `max_depth`.
//!
//! ## Handle ownership
//!
//! [`WorkingImage`] owns exactly one engine handle. Each step moves it into the
//! engine and wraps the returned handle; if a step is never reached (an error,
//! a panic), dropping the `WorkingImage` releases the handle. Release failures
//! are logged and otherwise ignored so they never replace the real outcome.

use crate::config::ServiceConfig;
use crate::engine::{
    EngineError, ImageEngine, ImageHandle, Loaded, OutputFormat, Placement, Response, Transform,
};
use crate::error::{Halt, InternalError, Outcome, ValidationError};
use crate::operations::{self, Step};
use log::{debug, error, info, warn};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use url::Url;

/// Per-request state shared by the whole resolution tree.
pub struct RequestContext<'a> {
    origin_url: Url,
    config: &'a ServiceConfig,
    engine: &'a dyn ImageEngine,
    op_count: Cell<u32>,
}

impl<'a> RequestContext<'a> {
    pub fn new(origin_url: Url, config: &'a ServiceConfig, engine: &'a dyn ImageEngine) -> Self {
        Self {
            origin_url,
            config,
            engine,
            op_count: Cell::new(0),
        }
    }

    pub fn origin_url(&self) -> &Url {
        &self.origin_url
    }

    /// Operations counted so far, nested images included.
    pub fn op_count(&self) -> u32 {
        self.op_count.get()
    }

    /// Count one operation before it is applied.
    fn count_operation(&self) -> Result<(), ValidationError> {
        let count = self.op_count.get() + 1;
        self.op_count.set(count);
        if count > self.config.max_ops {
            return Err(ValidationError::new(format!(
                "Exceeded maximum of {} operations",
                self.config.max_ops
            )));
        }
        Ok(())
    }

    fn is_self_reference(&self, target: &Url) -> bool {
        target.origin() == self.origin_url.origin() && target.path() == self.origin_url.path()
    }
}

/// The single owner of one engine image.
pub struct WorkingImage<'e> {
    engine: &'e dyn ImageEngine,
    handle: Option<ImageHandle>,
}

impl<'e> WorkingImage<'e> {
    pub fn new(engine: &'e dyn ImageEngine, handle: ImageHandle) -> Self {
        Self {
            engine,
            handle: Some(handle),
        }
    }

    /// Give up ownership of the handle so the engine can consume it.
    fn into_handle(mut self) -> Result<ImageHandle, EngineError> {
        self.handle
            .take()
            .ok_or_else(|| EngineError::Unavailable("working image has no handle".into()))
    }

    pub fn apply(self, op: &Transform) -> Result<Self, Halt> {
        let engine = self.engine;
        let handle = engine.transform(self.into_handle()?, op)?;
        Ok(Self::new(engine, handle))
    }

    pub fn composite(self, overlay: WorkingImage<'_>, placement: &Placement) -> Result<Self, Halt> {
        let engine = self.engine;
        let base = self.into_handle()?;
        let overlay = match overlay.into_handle() {
            Ok(handle) => handle,
            Err(e) => {
                drop(WorkingImage::new(engine, base));
                return Err(e.into());
            }
        };
        let handle = engine.composite(base, overlay, placement)?;
        Ok(Self::new(engine, handle))
    }

    pub fn build(self, format: Option<OutputFormat>) -> Result<Response, Halt> {
        let engine = self.engine;
        Ok(engine.build(self.into_handle()?, format)?)
    }
}

impl Drop for WorkingImage<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let id = handle.id();
            if let Err(e) = self.engine.release(handle) {
                warn!("Failed to release image {id}: {e}");
            }
        }
    }
}

/// Run one request URL through the pipeline and classify the result.
pub fn process_request(request_url: &str, config: &ServiceConfig, engine: &dyn ImageEngine) -> Outcome {
    let origin_url = match Url::parse(request_url) {
        Ok(url) => url,
        Err(e) => {
            return Outcome::Invalid(ValidationError::new(format!("Invalid request URL: {e}")));
        }
    };
    let ctx = RequestContext::new(origin_url, config, engine);

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| render(&ctx))) {
        Ok(Ok(response)) => Outcome::Image(response),
        Ok(Err(Halt::Invalid(err))) => Outcome::Invalid(err),
        Ok(Err(Halt::Respond(response))) => Outcome::Passthrough(response),
        Ok(Err(Halt::Fault(err))) => {
            error!("Request {request_url} failed: {err}");
            Outcome::Internal(InternalError::from_engine(&err))
        }
        Err(payload) => {
            let err = InternalError::from_panic(payload.as_ref());
            error!("Request {request_url} panicked: {}", err.message());
            Outcome::Internal(err)
        }
    };
    info!(
        "{} {request_url} ({} ops)",
        outcome.status(),
        ctx.op_count()
    );
    outcome
}

/// Build the top-level image and encode it.
fn render(ctx: &RequestContext<'_>) -> Result<Response, Halt> {
    let format = match query_value(&ctx.origin_url, "format") {
        Some(name) => Some(
            ctx.engine
                .format_by_name(&name)
                .ok_or_else(|| ValidationError::new(format!("Unknown format: {name}")))?,
        ),
        None => None,
    };
    let image = build_image(ctx, &ctx.origin_url, 0)?;
    image.build(format)
}

/// Source image plus every registered operation in `url`'s query, in order.
fn build_image<'c>(ctx: &RequestContext<'c>, url: &Url, depth: u32) -> Result<WorkingImage<'c>, Halt> {
    let mut image = source_image(ctx, url, depth)?;
    for (key, value) in url.query_pairs() {
        let Some(def) = operations::lookup(&key) else {
            continue;
        };
        ctx.count_operation()?;
        debug!("Applying {key}={value} (depth {depth}, op {})", ctx.op_count());
        image = match def.plan(&value, ctx.engine)? {
            Step::Transform(op) => image.apply(&op)?,
            Step::Overlay { url, placement } => {
                let overlay = resolve(ctx, &url, depth)?;
                image.composite(overlay, &placement)?
            }
        };
    }
    Ok(image)
}

fn source_image<'c>(ctx: &RequestContext<'c>, url: &Url, depth: u32) -> Result<WorkingImage<'c>, Halt> {
    match (query_value(url, "url"), query_value(url, "empty")) {
        (Some(_), Some(_)) => Err(ValidationError::new("url and empty are mutually exclusive").into()),
        (Some(source), None) => resolve(ctx, &source, depth),
        (None, Some(raw)) => {
            let canvas = operations::parse_canvas(&raw)?;
            let handle = ctx.engine.blank(&canvas)?;
            Ok(WorkingImage::new(ctx.engine, handle))
        }
        (None, None) => Err(ValidationError::new("Missing url or empty parameter").into()),
    }
}

/// Turn an image URL into a working image: recurse for references back to
/// this endpoint, delegate to the engine otherwise.
fn resolve<'c>(ctx: &RequestContext<'c>, raw: &str, depth: u32) -> Result<WorkingImage<'c>, Halt> {
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return Err(ValidationError::new(format!(
            "Image URL must start with http:// or https://: {raw}"
        ))
        .into());
    }
    let target = Url::parse(raw)
        .map_err(|e| ValidationError::new(format!("Invalid image URL {raw}: {e}")))?;

    if ctx.config.same_origin && target.origin() != ctx.origin_url.origin() {
        return Err(ValidationError::new(format!(
            "Image URL {raw} is not on origin {}",
            ctx.origin_url.origin().ascii_serialization()
        ))
        .into());
    }

    if ctx.is_self_reference(&target) {
        let nested = depth + 1;
        if nested > ctx.config.max_depth {
            return Err(ValidationError::new(format!(
                "Exceeded maximum nesting depth of {}",
                ctx.config.max_depth
            ))
            .into());
        }
        debug!("Resolving {target} in-process (depth {nested})");
        return build_image(ctx, &target, nested);
    }

    match ctx.engine.load_url(&target)? {
        Loaded::Image(handle) => Ok(WorkingImage::new(ctx.engine, handle)),
        Loaded::Response(response) => Err(Halt::Respond(response)),
    }
}

/// First value of a query parameter, percent-decoded.
fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
