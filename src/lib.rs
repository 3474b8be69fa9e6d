//! # imgq
//!
//! Image operations driven by URL query parameters. A request names a source
//! image and a list of operations; the result is the transformed, re-encoded
//! image:
//!
//! ```text
//! http://svc/img?url=https://cdn/photo.jpg&resize=800&blur=1.5&format=WEBP
//! ```
//!
//! # Architecture
//!
//! ```text
//! query pairs ──► grammar ──► operations ──► pipeline ──► engine
//!                 (split)     (validate)     (order,      (pixels)
//!                                             budget,
//!                                             recursion)
//! ```
//!
//! The query-string language is the only part with real parsing logic. All
//! pixel work sits behind the [`engine::ImageEngine`] trait, which exposes
//! opaque move-only handles. Everything above that seam is testable with a
//! recording mock engine.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`values`] | Scalar value parsers: numbers, percentages, colors, enums |
//! | [`grammar`] | `args(flags)` micro-grammar, the overlay `(flags)url` variant |
//! | [`operations`] | Static operation registry and per-operation validators |
//! | [`pipeline`] | Request context, ordered application, op budget, same-origin recursion |
//! | [`error`] | Validation / passthrough / internal outcome taxonomy |
//! | [`engine`] | Engine trait, validated parameters, the `image`-crate implementation |
//! | [`config`] | Deployment config (`imgq.toml` + `IMGQ_*` environment) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Query Order Is Operation Order
//!
//! Operations apply in the order their keys appear in the query string, and a
//! key may repeat. Keys the registry doesn't know (`url`, `empty`, `format`,
//! cache busters) are skipped, so callers can add their own parameters freely.
//!
//! ## Self-References Never Hit the Network
//!
//! An overlay or source URL that points back at this endpoint (same origin,
//! same path) is rendered in-process from its own query string. It shares the
//! outer request's operation budget, so nesting can't multiply the work a
//! single request is allowed to do.
//!
//! ## Handles Are Owned, Not Shared
//!
//! An engine image handle is not `Clone`. The pipeline holds it in a
//! [`pipeline::WorkingImage`] that releases it on drop, so every exit path
//! (validation failure, engine fault, panic) frees engine memory.

pub mod config;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod operations;
pub mod output;
pub mod pipeline;
pub mod values;

pub use config::ServiceConfig;
pub use engine::{ImageEngine, Response, RustEngine, shared_engine};
pub use error::{Outcome, ValidationError};
pub use pipeline::process_request;
