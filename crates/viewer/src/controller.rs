use crate::surface::RenderCounters;
use crate::{Dispatch, DocumentInfo, LoadError, PageRender, RenderError, RenderStats, RenderedSurface};
use folio_pdf_engine::{LoadedDocument, OpenSource, PdfEngine, PdfEngineError, RenderRequest};
use folio_scheduler::{Debouncer, RenderGuard, RenderTaskRegistry};
use folio_viewer_core::{
    fit_scale, query_param, reduce, CertificateCatalog, Effect, NavControls, PageSize,
    PageVisibility, Transition, UiEvent, ViewState, ViewerConfig, Viewport,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct ViewerInner {
    document: Option<Arc<dyn LoadedDocument>>,
    state: ViewState,
    surfaces: BTreeMap<u32, RenderedSurface>,
    /// Bumped whenever the document changes; renders of an older session
    /// never commit
    session: u64,
}

/// Stateful viewer for one document
///
/// All state lives behind a short-lived lock that is never held across an
/// await point. Renders are keyed by page number: issuing a render for a
/// page cancels the one still in flight for that page, and only the most
/// recent render may commit its surface.
pub struct DocumentViewer {
    engine: Arc<dyn PdfEngine>,
    inner: Mutex<ViewerInner>,
    renders: RenderTaskRegistry<u32>,
    zoom: Debouncer,
    counters: RenderCounters,
}

impl DocumentViewer {
    pub fn new(engine: Arc<dyn PdfEngine>, config: ViewerConfig) -> Self {
        let zoom = Debouncer::new(config.zoom_debounce);

        Self {
            engine,
            inner: Mutex::new(ViewerInner {
                document: None,
                state: ViewState::new(config),
                surfaces: BTreeMap::new(),
                session: 0,
            }),
            renders: RenderTaskRegistry::new(),
            zoom,
            counters: RenderCounters::default(),
        }
    }

    pub fn with_viewport(self, viewport: Viewport) -> Self {
        self.set_viewport(viewport);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ViewerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a document and size it with the configured initial fit
    ///
    /// Any previous document is closed first. On failure the viewer stays
    /// empty.
    pub async fn load(&self, source: OpenSource) -> Result<DocumentInfo, LoadError> {
        self.close();

        let locator = source.describe();
        let opened = async {
            let document = self.engine.open(source).await?;
            let first = document.page_size(1).await?;
            Ok::<_, PdfEngineError>((document, first))
        }
        .await;

        let (document, first) = match opened {
            Ok(opened) => opened,
            Err(source) => {
                tracing::error!(source = %locator, error = %source, "failed to load document");
                return Err(LoadError::Engine { locator, source });
            }
        };

        let first_page = PageSize::new(first.width_pt, first.height_pt);
        let info = {
            let mut inner = self.lock();
            let config = inner.state.config.clone();
            let viewport = inner.state.viewport;

            let mut state = ViewState::for_document(config, viewport, document.page_count());
            state.page_sizes.insert(1, first_page);
            let initial = fit_scale(state.config.initial_fit, &viewport, first_page, &state.config);
            let initial_scale = state.set_scale(initial);

            let info = DocumentInfo {
                kind: document.kind(),
                page_count: document.page_count(),
                first_page,
                initial_scale,
            };

            inner.session += 1;
            inner.state = state;
            inner.document = Some(document);
            info
        };

        tracing::info!(
            source = %locator,
            pages = info.page_count,
            scale = info.initial_scale,
            "document loaded"
        );

        Ok(info)
    }

    /// Load the certificate selected by the `id` query parameter
    pub async fn load_certificate(
        &self,
        catalog: &CertificateCatalog,
        query: &str,
    ) -> Result<DocumentInfo, LoadError> {
        self.close();

        let id = query_param(query, "id").ok_or(LoadError::MissingCertificateId)?;
        let entry = catalog.get(&id).ok_or_else(|| LoadError::UnknownCertificate(id.clone()))?;

        self.load(OpenSource::parse(&entry.source)).await
    }

    /// Render one page, superseding any render of that page still in flight
    pub async fn render_page(&self, page: u32, scale: f32) -> Result<RenderedSurface, RenderError> {
        let result = self.render_inner(page, scale).await;
        self.counters.record(&result);
        result
    }

    async fn render_inner(&self, page: u32, scale: f32) -> Result<RenderedSurface, RenderError> {
        let (document, session, scale, output_scale) = {
            let inner = self.lock();
            let document = inner.document.clone().ok_or(RenderError::NoDocument)?;
            let page_count = document.page_count();
            if page == 0 || page > page_count {
                return Err(RenderError::PageOutOfRange { page, page_count });
            }

            let scale = inner.state.config.bounds.clamp(scale);
            (document, inner.session, scale, inner.state.viewport.output_scale())
        };

        let guard = self.renders.guard(page);

        let natural = match self.natural_size(&document, page).await {
            Ok(size) => size,
            Err(source) => return Err(self.render_failed(page, &guard, session, source)),
        };

        if !guard.is_current() {
            tracing::debug!(page, "render superseded before drawing");
            return Err(RenderError::Cancelled { page });
        }

        let request = RenderRequest::new(page, scale).with_output_scale(output_scale);
        match document.render_page(request, guard.ticket().token()).await {
            Ok(image) => {
                let mut inner = self.lock();
                if !guard.is_current() || inner.session != session {
                    tracing::debug!(page, "discarding stale render");
                    return Err(RenderError::Cancelled { page });
                }

                let logical = natural.scaled(scale);
                let surface = RenderedSurface {
                    page_number: page,
                    scale,
                    logical_width: logical.width,
                    logical_height: logical.height,
                    image: Arc::new(image),
                };
                inner.surfaces.insert(page, surface.clone());

                tracing::trace!(page, scale, width = surface.pixel_width(), "page rendered");
                Ok(surface)
            }
            Err(err) if err.is_cancelled() => {
                tracing::debug!(page, "render cancelled");
                Err(RenderError::Cancelled { page })
            }
            Err(source) => Err(self.render_failed(page, &guard, session, source)),
        }
    }

    /// Log a failed render and blank the page, unless a newer render or
    /// document already owns it
    fn render_failed(
        &self,
        page: u32,
        guard: &RenderGuard<'_, u32>,
        session: u64,
        source: PdfEngineError,
    ) -> RenderError {
        tracing::error!(page, error = %source, "failed to render page");

        let mut inner = self.lock();
        if guard.is_current() && inner.session == session {
            inner.surfaces.remove(&page);
        }

        RenderError::Failed { page, source }
    }

    /// Pages without a committed surface at `scale`
    fn stale_pages(&self, pages: &[u32], scale: f32) -> Vec<u32> {
        let inner = self.lock();
        let scale = inner.state.config.bounds.clamp(scale);

        pages
            .iter()
            .copied()
            .filter(|page| inner.surfaces.get(page).map_or(true, |surface| surface.scale != scale))
            .collect()
    }

    async fn natural_size(
        &self,
        document: &Arc<dyn LoadedDocument>,
        page: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let cached = self.lock().state.page_sizes.get(&page).copied();
        if let Some(size) = cached {
            return Ok(size);
        }

        let size = document.page_size(page).await?;
        let size = PageSize::new(size.width_pt, size.height_pt);
        self.lock().state.page_sizes.insert(page, size);
        Ok(size)
    }

    /// Render several pages concurrently; one page failing never affects
    /// the others
    pub async fn render_pages(&self, pages: &[u32], scale: f32) -> Vec<PageRender> {
        let renders = pages.iter().map(|&page| async move {
            PageRender { page, result: self.render_page(page, scale).await }
        });

        futures::future::join_all(renders).await
    }

    /// Apply one UI event and carry out its render effects
    ///
    /// Immediate renders run right away; scheduled renders wait for the
    /// zoom burst to settle and re-read the scale at that point. Everything
    /// else is handed back for the presentation layer.
    pub async fn dispatch(&self, event: UiEvent) -> Dispatch {
        let effects = {
            let mut inner = self.lock();
            let Transition { state, effects } = reduce(&inner.state, event);
            inner.state = state;
            effects
        };

        let (renders, effects): (Vec<Effect>, Vec<Effect>) =
            effects.into_iter().partition(Effect::is_render);

        let mut dispatch = Dispatch { effects, ..Dispatch::default() };
        if dispatch.effects.contains(&Effect::Close) {
            self.close();
        }

        for effect in renders {
            match effect {
                Effect::Render { pages, scale } => {
                    dispatch.renders.extend(self.render_pages(&pages, scale).await);
                }
                Effect::EnsureRendered { pages, scale } => {
                    let stale = self.stale_pages(&pages, scale);
                    if !stale.is_empty() {
                        dispatch.renders.extend(self.render_pages(&stale, scale).await);
                    }
                }
                Effect::ScheduleRender { .. } => {
                    if !self.zoom.settle().await {
                        dispatch.coalesced = true;
                        continue;
                    }

                    let (pages, scale) = {
                        let inner = self.lock();
                        (inner.state.render_targets(), inner.state.scale)
                    };
                    dispatch.renders.extend(self.render_pages(&pages, scale).await);
                }
                _ => {}
            }
        }

        dispatch
    }

    /// Debounced zoom to an absolute scale
    pub async fn set_scale(&self, scale: f32) -> Dispatch {
        self.dispatch(UiEvent::SetScale(scale)).await
    }

    pub async fn zoom_in(&self) -> Dispatch {
        self.dispatch(UiEvent::ZoomIn).await
    }

    pub async fn zoom_out(&self) -> Dispatch {
        self.dispatch(UiEvent::ZoomOut).await
    }

    pub async fn reset_zoom(&self) -> Dispatch {
        self.dispatch(UiEvent::ResetZoom).await
    }

    pub async fn fit_to_width(&self) -> Dispatch {
        self.dispatch(UiEvent::FitWidth).await
    }

    pub async fn fit_to_page(&self) -> Dispatch {
        self.dispatch(UiEvent::FitPage).await
    }

    pub async fn go_to_page(&self, page: u32) -> Dispatch {
        self.dispatch(UiEvent::GoToPage(page)).await
    }

    pub async fn prev_page(&self) -> Dispatch {
        self.dispatch(UiEvent::PrevPage).await
    }

    pub async fn next_page(&self) -> Dispatch {
        self.dispatch(UiEvent::NextPage).await
    }

    /// Feed intersection reports from the presentation layer
    pub async fn set_current_page_from_viewport(&self, entries: Vec<PageVisibility>) -> Dispatch {
        self.dispatch(UiEvent::Intersection(entries)).await
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        let mut inner = self.lock();
        inner.state.viewport = viewport;
    }

    /// Drop the document, cancel in-flight renders and pending zooms
    pub fn close(&self) {
        self.zoom.invalidate();
        let cancelled = self.renders.cancel_all();

        let mut inner = self.lock();
        let was_loaded = inner.document.take().is_some();
        inner.session += 1;
        inner.surfaces.clear();

        let mut state = ViewState::new(inner.state.config.clone());
        state.viewport = inner.state.viewport;
        inner.state = state;

        if was_loaded {
            tracing::debug!(cancelled, "viewer closed");
        }
    }

    pub fn nav_controls(&self) -> NavControls {
        NavControls::from_state(&self.lock().state)
    }

    pub fn state(&self) -> ViewState {
        self.lock().state.clone()
    }

    pub fn scale(&self) -> f32 {
        self.lock().state.scale
    }

    pub fn current_page(&self) -> u32 {
        self.lock().state.current_page
    }

    pub fn page_count(&self) -> u32 {
        self.lock().state.total_pages
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().document.is_some()
    }

    /// Last committed surface for `page`, if any
    pub fn surface(&self, page: u32) -> Option<RenderedSurface> {
        self.lock().surfaces.get(&page).cloned()
    }

    pub fn renders_in_flight(&self) -> usize {
        self.renders.len()
    }

    pub fn stats(&self) -> RenderStats {
        self.counters.snapshot()
    }
}

impl std::fmt::Debug for DocumentViewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("DocumentViewer")
            .field("loaded", &inner.document.is_some())
            .field("state", &inner.state)
            .field("surfaces", &inner.surfaces.len())
            .finish_non_exhaustive()
    }
}
