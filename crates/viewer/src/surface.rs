use crate::RenderError;
use folio_pdf_engine::{DocumentKind, RgbaImage};
use folio_viewer_core::{Effect, PageSize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Committed raster for one page
#[derive(Debug, Clone)]
pub struct RenderedSurface {
    pub page_number: u32,
    pub scale: f32,
    /// CSS size: natural size times scale
    pub logical_width: f32,
    pub logical_height: f32,
    pub image: Arc<RgbaImage>,
}

impl RenderedSurface {
    pub fn pixel_width(&self) -> u32 {
        self.image.width()
    }

    pub fn pixel_height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentInfo {
    pub kind: DocumentKind,
    pub page_count: u32,
    pub first_page: PageSize,
    pub initial_scale: f32,
}

/// Outcome of one page render issued by the controller
#[derive(Debug)]
pub struct PageRender {
    pub page: u32,
    pub result: Result<RenderedSurface, RenderError>,
}

impl PageRender {
    pub fn is_completed(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&self.result, Err(err) if err.is_cancelled())
    }
}

/// What happened while dispatching one UI event
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Presentation effects left for the UI adapter
    pub effects: Vec<Effect>,
    pub renders: Vec<PageRender>,
    /// A debounced zoom lost to a newer request
    pub coalesced: bool,
}

impl Dispatch {
    pub fn completed(&self) -> impl Iterator<Item = &RenderedSurface> {
        self.renders.iter().filter_map(|render| render.result.as_ref().ok())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct RenderCounters {
    completed: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
}

impl RenderCounters {
    pub(crate) fn record(&self, result: &Result<RenderedSurface, RenderError>) {
        let counter = match result {
            Ok(_) => &self.completed,
            Err(err) if err.is_cancelled() => &self.cancelled,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RenderStats {
        RenderStats {
            completed: self.completed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
