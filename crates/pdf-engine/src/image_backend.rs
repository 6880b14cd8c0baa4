use crate::{check_page, DocumentKind, LoadedDocument, PageSize, PdfEngineError, RenderRequest};
use crate::RgbaImage;
use async_trait::async_trait;
use folio_scheduler::CancellationToken;
use image::imageops::{self, FilterType};
use std::sync::Arc;

/// Raster image shown as a one-page document (certificates)
///
/// The natural size is the pixel size of the decoded image.
#[derive(Debug, Clone)]
pub struct ImageDocument {
    pixels: Arc<RgbaImage>,
}

impl ImageDocument {
    pub fn decode(bytes: &[u8]) -> Result<Self, PdfEngineError> {
        let decoded = image::load_from_memory(bytes)?.to_rgba8();

        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(PdfEngineError::Empty);
        }

        Ok(Self { pixels: Arc::new(decoded) })
    }
}

#[async_trait]
impl LoadedDocument for ImageDocument {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Image
    }

    fn page_count(&self) -> u32 {
        1
    }

    async fn page_size(&self, page_number: u32) -> Result<PageSize, PdfEngineError> {
        check_page(page_number, 1)?;

        Ok(PageSize { width_pt: self.pixels.width() as f32, height_pt: self.pixels.height() as f32 })
    }

    async fn render_page(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError> {
        let size = self.page_size(request.page_number).await?;
        let (width, height) = request.pixel_size(size)?;

        if cancel.is_cancelled() {
            return Err(PdfEngineError::Cancelled);
        }

        let scaled = if (width, height) == self.pixels.dimensions() {
            (*self.pixels).clone()
        } else {
            imageops::resize(&*self.pixels, width, height, FilterType::Triangle)
        };

        tokio::task::yield_now().await;

        if cancel.is_cancelled() {
            return Err(PdfEngineError::Cancelled);
        }

        Ok(scaled)
    }
}
