use crate::{check_page, DocumentKind, LoadedDocument, PageSize, PdfEngineError, RenderRequest};
use crate::RgbaImage;
use async_trait::async_trait;
use folio_scheduler::CancellationToken;
use image::Rgba;
use lopdf::{Document, Object, ObjectId};

/// US Letter, used when a page carries no usable MediaBox
const DEFAULT_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

/// MediaBox may be inherited through the page tree
const MAX_INHERITANCE_DEPTH: usize = 32;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const FRAME: Rgba<u8> = Rgba([220, 220, 220, 255]);

/// PDF parsed with `lopdf`
///
/// Page geometry comes from the parsed page tree. Content streams are not
/// interpreted: pages rasterize as a blank sheet with a frame.
#[derive(Debug, Clone)]
pub struct LopdfDocument {
    page_sizes: Vec<PageSize>,
    band_rows: u32,
}

impl LopdfDocument {
    pub fn parse(bytes: &[u8], band_rows: u32) -> Result<Self, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let page_sizes: Vec<PageSize> = doc
            .get_pages()
            .into_values()
            .map(|page_id| media_box(&doc, page_id).unwrap_or(DEFAULT_PAGE_SIZE))
            .collect();

        if page_sizes.is_empty() {
            return Err(PdfEngineError::Empty);
        }

        Ok(Self { page_sizes, band_rows: band_rows.max(1) })
    }
}

fn media_box(doc: &Document, page_id: ObjectId) -> Option<PageSize> {
    let mut node = doc.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Some(size) = node.get(b"MediaBox").ok().and_then(|obj| rectangle(doc, obj)) {
            return Some(size);
        }

        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }

    None
}

fn rectangle(doc: &Document, obj: &Object) -> Option<PageSize> {
    let array = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
        other => other.as_array().ok()?,
    };

    if array.len() != 4 {
        return None;
    }

    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;

    let size = PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() };
    (size.width_pt > 0.0 && size.height_pt > 0.0).then_some(size)
}

#[async_trait]
impl LoadedDocument for LopdfDocument {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Pdf
    }

    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    async fn page_size(&self, page_number: u32) -> Result<PageSize, PdfEngineError> {
        check_page(page_number, self.page_count())?;
        Ok(self.page_sizes[page_number as usize - 1])
    }

    async fn render_page(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError> {
        let size = self.page_size(request.page_number).await?;
        let (width, height) = request.pixel_size(size)?;

        let mut image = RgbaImage::new(width, height);
        let framed = width >= 4 && height >= 4;

        let mut row = 0;
        while row < height {
            if cancel.is_cancelled() {
                return Err(PdfEngineError::Cancelled);
            }

            let band_end = (row + self.band_rows).min(height);
            for y in row..band_end {
                let edge_row = framed && (y == 0 || y == height - 1);
                for x in 0..width {
                    let edge = edge_row || (framed && (x == 0 || x == width - 1));
                    image.put_pixel(x, y, if edge { FRAME } else { PAPER });
                }
            }
            row = band_end;

            tokio::task::yield_now().await;
        }

        if cancel.is_cancelled() {
            return Err(PdfEngineError::Cancelled);
        }

        Ok(image)
    }
}
