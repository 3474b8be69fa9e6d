//! The image engine: everything that touches pixels.
//!
//! The query-string core never decodes, transforms or encodes anything
//! itself. It hands validated parameters to an [`ImageEngine`] and gets opaque
//! [`ImageHandle`]s back.
//!
//! The module is split into:
//! - **Backend**: [`ImageEngine`] trait, handles, [`Response`], [`EngineError`]
//! - **Parameters**: validated operation descriptions ([`Transform`], [`Placement`], …)
//! - **Calculations**: pure geometry helpers (unit testable)
//! - **RustEngine**: the `image`-crate implementation and its process-wide instance

pub mod backend;
pub mod calculations;
pub mod params;
pub mod rust_engine;

pub use backend::{EngineError, ImageEngine, ImageHandle, Loaded, Response};
pub use params::{
    Anchor, Canvas, Extent, FlipAxis, OutputFormat, Placement, ResizeFilter, Rotation, Sides,
    Transform,
};
pub use rust_engine::{RustEngine, shared_engine};
