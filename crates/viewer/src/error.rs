use folio_pdf_engine::PdfEngineError;

/// The document could not be shown at all
///
/// Fatal for the viewer instance; the viewer is left empty.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to load document {locator}")]
    Engine {
        locator: String,
        #[source]
        source: PdfEngineError,
    },
    #[error("no certificate id in query")]
    MissingCertificateId,
    #[error("unknown certificate id '{0}'")]
    UnknownCertificate(String),
}

/// A single page could not be rendered
///
/// `Cancelled` is the expected outcome of supersession and is never shown
/// to the user.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render of page {page} was superseded")]
    Cancelled { page: u32 },
    #[error("no document loaded")]
    NoDocument,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("failed to render page {page}")]
    Failed {
        page: u32,
        #[source]
        source: PdfEngineError,
    },
}

impl RenderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
