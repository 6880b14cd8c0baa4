//! Document viewer controller
//!
//! Owns the loaded document, the view state and the rendered page surfaces.
//! UI events go through the pure reducer in `folio-viewer-core`; the
//! controller carries out the resulting renders with per-page supersession
//! and debounced zoom, and hands presentation effects back to the caller.

mod controller;
mod error;
mod surface;

pub use controller::DocumentViewer;
pub use error::{LoadError, RenderError};
pub use surface::{Dispatch, DocumentInfo, PageRender, RenderStats, RenderedSurface};
