//! Document collaborator for the viewers
//!
//! Opens a paginated document from a path, bytes, a `data:` URI or a URL and
//! rasterizes its pages at a requested scale. PDFs are parsed with `lopdf`;
//! single-image documents (certificates) are decoded with `image`. Rendering
//! checks a [`CancellationToken`] between drawing bands and yields to the
//! runtime so that superseded renders stop early.

use async_trait::async_trait;
use folio_scheduler::CancellationToken;
use image::{ImageBuffer, Rgba};
use std::sync::Arc;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod image_backend;
mod lopdf_backend;
mod source;

pub use image_backend::ImageDocument;
pub use lopdf_backend::LopdfDocument;
pub use source::OpenSource;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Largest raster edge the engine will allocate
pub const MAX_SURFACE_EDGE_PX: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
}

/// One raster request
///
/// `scale` is the logical zoom against the page's natural size;
/// `output_scale` is the device pixel ratio applied only when sizing the
/// raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_number: u32,
    pub scale: f32,
    pub output_scale: f32,
}

impl RenderRequest {
    pub fn new(page_number: u32, scale: f32) -> Self {
        Self { page_number, scale, output_scale: 1.0 }
    }

    pub fn with_output_scale(mut self, output_scale: f32) -> Self {
        self.output_scale = output_scale;
        self
    }

    /// Raster dimensions for a page of `size`
    pub fn pixel_size(&self, size: PageSize) -> Result<(u32, u32), PdfEngineError> {
        let scale = if self.scale > 0.0 && self.scale.is_finite() { self.scale } else { 1.0 };
        let output = if self.output_scale > 0.0 && self.output_scale.is_finite() {
            self.output_scale
        } else {
            1.0
        };

        let width = (size.width_pt * scale * output).floor().max(1.0);
        let height = (size.height_pt * scale * output).floor().max(1.0);

        if width > MAX_SURFACE_EDGE_PX as f32 || height > MAX_SURFACE_EDGE_PX as f32 {
            return Err(PdfEngineError::SurfaceTooLarge { width, height });
        }

        Ok((width as u32, height as u32))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),
    #[error("unsupported document format")]
    UnsupportedFormat,
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    Empty,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("surface of {width}x{height} px exceeds the raster limit")]
    SurfaceTooLarge { width: f32, height: f32 },
    #[error("render cancelled")]
    Cancelled,
}

impl PdfEngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// An opened, immutable document
#[async_trait]
pub trait LoadedDocument: Send + Sync {
    fn kind(&self) -> DocumentKind;

    fn page_count(&self) -> u32;

    /// Natural size of a 1-based page
    async fn page_size(&self, page_number: u32) -> Result<PageSize, PdfEngineError>;

    /// Rasterize one page, giving up with [`PdfEngineError::Cancelled`] once
    /// `cancel` fires
    async fn render_page(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError>;
}

#[async_trait]
pub trait PdfEngine: Send + Sync {
    async fn open(&self, source: OpenSource) -> Result<Arc<dyn LoadedDocument>, PdfEngineError>;
}

/// Engine that sniffs the payload and picks the PDF or image backend
#[derive(Debug, Clone)]
pub struct DefaultEngine {
    band_rows: u32,
}

impl DefaultEngine {
    pub fn new() -> Self {
        Self { band_rows: 64 }
    }

    /// Rows drawn between cancellation checks
    pub fn with_band_rows(mut self, rows: u32) -> Self {
        self.band_rows = rows.max(1);
        self
    }
}

impl Default for DefaultEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PdfEngine for DefaultEngine {
    async fn open(&self, source: OpenSource) -> Result<Arc<dyn LoadedDocument>, PdfEngineError> {
        let description = source.describe();
        let bytes = source.read().await?;

        let document: Arc<dyn LoadedDocument> = if bytes.starts_with(b"%PDF") {
            Arc::new(LopdfDocument::parse(&bytes, self.band_rows)?)
        } else if image::guess_format(&bytes).is_ok() {
            Arc::new(ImageDocument::decode(&bytes)?)
        } else {
            return Err(PdfEngineError::UnsupportedFormat);
        };

        tracing::debug!(
            source = %description,
            kind = ?document.kind(),
            pages = document.page_count(),
            "opened document"
        );

        Ok(document)
    }
}

pub fn default_engine() -> DefaultEngine {
    DefaultEngine::new()
}

pub(crate) fn check_page(page_number: u32, page_count: u32) -> Result<(), PdfEngineError> {
    if page_number == 0 || page_number > page_count {
        return Err(PdfEngineError::PageOutOfRange { page: page_number, page_count });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_pdf_and_reads_page_count() {
        let bytes = fixtures::pdf_with_pages(&[(612.0, 792.0), (612.0, 792.0)]);

        let document = default_engine().open(OpenSource::Bytes(bytes)).await.expect("open");

        assert_eq!(document.kind(), DocumentKind::Pdf);
        assert_eq!(document.page_count(), 2);
    }

    #[tokio::test]
    async fn opens_image_as_single_page_document() {
        let bytes = fixtures::png_bytes(300, 200);

        let document = default_engine().open(OpenSource::Bytes(bytes)).await.expect("open");

        assert_eq!(document.kind(), DocumentKind::Image);
        assert_eq!(document.page_count(), 1);
        assert_eq!(
            document.page_size(1).await.expect("size"),
            PageSize { width_pt: 300.0, height_pt: 200.0 }
        );
    }

    #[tokio::test]
    async fn rejects_unknown_payload() {
        let err = default_engine()
            .open(OpenSource::Bytes(b"definitely not a document".to_vec()))
            .await
            .err()
            .expect("unknown bytes should fail");

        assert!(matches!(err, PdfEngineError::UnsupportedFormat));
    }

    #[test]
    fn pixel_size_applies_output_scale_separately() {
        let size = PageSize { width_pt: 100.0, height_pt: 50.0 };

        let request = RenderRequest::new(1, 1.5).with_output_scale(2.0);
        assert_eq!(request.pixel_size(size).expect("fits"), (300, 150));

        let invalid = RenderRequest::new(1, 0.0).with_output_scale(f32::NAN);
        assert_eq!(invalid.pixel_size(size).expect("fits"), (100, 50));
    }

    #[test]
    fn pixel_size_rejects_oversized_surface() {
        let size = PageSize { width_pt: 10_000.0, height_pt: 10_000.0 };

        let err = RenderRequest::new(1, 4.0).pixel_size(size).expect_err("too large");
        assert!(matches!(err, PdfEngineError::SurfaceTooLarge { .. }));
    }
}
