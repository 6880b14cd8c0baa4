use async_trait::async_trait;
use folio_pdf_engine::fixtures;
use folio_pdf_engine::{
    DefaultEngine, DocumentKind, LoadedDocument, OpenSource, PageSize, PdfEngine, PdfEngineError,
    RenderRequest, RgbaImage,
};
use folio_scheduler::CancellationToken;
use folio_viewer::{DocumentViewer, LoadError, RenderError};
use folio_viewer_core::{
    CertificateCatalog, Effect, KeyInput, PageVisibility, UiEvent, ViewerConfig, Viewport,
};
use std::sync::Arc;
use std::time::Duration;

const LETTER: (f32, f32) = (612.0, 792.0);

fn engine() -> Arc<dyn PdfEngine> {
    Arc::new(DefaultEngine::new().with_band_rows(8))
}

fn resume_viewer() -> DocumentViewer {
    DocumentViewer::new(engine(), ViewerConfig::resume()).with_viewport(Viewport::new(800.0, 600.0))
}

async fn loaded_resume(pages: usize) -> DocumentViewer {
    let viewer = resume_viewer();
    viewer
        .load(OpenSource::Bytes(fixtures::pdf_with_pages(&vec![LETTER; pages])))
        .await
        .expect("load should succeed");
    viewer
}

/// Engine whose documents fail to render one page, or to report its size
struct FailingPageEngine {
    inner: DefaultEngine,
    failing_page: u32,
    failing_size: Option<u32>,
}

struct FailingPageDocument {
    inner: Arc<dyn LoadedDocument>,
    failing_page: u32,
    failing_size: Option<u32>,
}

#[async_trait]
impl PdfEngine for FailingPageEngine {
    async fn open(&self, source: OpenSource) -> Result<Arc<dyn LoadedDocument>, PdfEngineError> {
        let inner = self.inner.open(source).await?;
        Ok(Arc::new(FailingPageDocument {
            inner,
            failing_page: self.failing_page,
            failing_size: self.failing_size,
        }))
    }
}

#[async_trait]
impl LoadedDocument for FailingPageDocument {
    fn kind(&self) -> DocumentKind {
        self.inner.kind()
    }

    fn page_count(&self) -> u32 {
        self.inner.page_count()
    }

    async fn page_size(&self, page_number: u32) -> Result<PageSize, PdfEngineError> {
        if self.failing_size == Some(page_number) {
            return Err(PdfEngineError::Fetch("page dictionary unavailable".into()));
        }
        self.inner.page_size(page_number).await
    }

    async fn render_page(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError> {
        if request.page_number == self.failing_page {
            return Err(PdfEngineError::Fetch("page stream unavailable".into()));
        }
        self.inner.render_page(request, cancel).await
    }
}

#[tokio::test]
async fn load_applies_initial_fit_width() {
    let viewer = resume_viewer();

    let info = viewer
        .load(OpenSource::Bytes(fixtures::pdf_with_pages(&[LETTER, LETTER, LETTER])))
        .await
        .expect("load should succeed");

    assert_eq!(info.kind, DocumentKind::Pdf);
    assert_eq!(info.page_count, 3);
    assert!((info.initial_scale - 760.0 / 612.0).abs() < 1e-4);
    assert_eq!(viewer.current_page(), 1);
    assert_eq!(viewer.nav_controls().page_count, 3);
}

#[tokio::test]
async fn load_failure_leaves_viewer_empty() {
    let viewer = resume_viewer();

    let err = viewer
        .load(OpenSource::Bytes(b"definitely not a document".to_vec()))
        .await
        .expect_err("garbage should fail to load");

    assert!(matches!(
        err,
        LoadError::Engine { source: PdfEngineError::UnsupportedFormat, .. }
    ));
    assert!(!viewer.is_loaded());
    assert_eq!(viewer.page_count(), 0);

    let render = viewer.render_page(1, 1.0).await.expect_err("nothing to render");
    assert!(matches!(render, RenderError::NoDocument));
}

#[tokio::test]
async fn superseded_renders_never_commit() {
    let viewer = loaded_resume(1).await;

    let renders = [1.0, 1.5, 2.0].map(|scale| viewer.render_page(1, scale));
    let results = futures::future::join_all(renders).await;

    let completed: Vec<_> = results.iter().filter_map(|result| result.as_ref().ok()).collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].scale, 2.0);
    assert!(results[..2]
        .iter()
        .all(|result| matches!(result, Err(err) if err.is_cancelled())));

    let surface = viewer.surface(1).expect("page 1 should have a surface");
    assert_eq!(surface.scale, 2.0);
    assert_eq!(viewer.stats().completed, 1);
    assert_eq!(viewer.stats().cancelled, 2);
    assert_eq!(viewer.renders_in_flight(), 0);
}

#[tokio::test]
async fn render_failure_is_confined_to_its_page() {
    let engine = Arc::new(FailingPageEngine {
        inner: DefaultEngine::new(),
        failing_page: 2,
        failing_size: None,
    });
    let viewer = DocumentViewer::new(engine, ViewerConfig::resume());
    viewer
        .load(OpenSource::Bytes(fixtures::pdf_with_pages(&[LETTER, LETTER, LETTER])))
        .await
        .expect("load should succeed");

    let renders = viewer.render_pages(&[1, 2, 3], 1.0).await;

    assert!(renders[0].is_completed());
    assert!(matches!(renders[1].result, Err(RenderError::Failed { page: 2, .. })));
    assert!(renders[2].is_completed());
    assert!(viewer.surface(1).is_some());
    assert!(viewer.surface(2).is_none());
    assert!(viewer.surface(3).is_some());
    assert_eq!(viewer.stats().failed, 1);
}

#[tokio::test]
async fn page_size_failure_is_handled_like_a_render_failure() {
    let engine = Arc::new(FailingPageEngine {
        inner: DefaultEngine::new(),
        failing_page: 0,
        failing_size: Some(2),
    });
    let viewer = DocumentViewer::new(engine, ViewerConfig::resume());
    viewer
        .load(OpenSource::Bytes(fixtures::pdf_with_pages(&[LETTER, LETTER, LETTER])))
        .await
        .expect("load should succeed");

    let err = viewer.render_page(2, 1.0).await.expect_err("page 2 has no size");

    assert!(matches!(err, RenderError::Failed { page: 2, .. }));
    assert!(viewer.surface(2).is_none());
    assert_eq!(viewer.stats().failed, 1);
    assert_eq!(viewer.renders_in_flight(), 0);
    viewer.render_page(3, 1.0).await.expect("other pages should still render");
}

#[tokio::test]
async fn out_of_range_render_is_rejected() {
    let viewer = loaded_resume(2).await;

    let err = viewer.render_page(3, 1.0).await.expect_err("page 3 does not exist");

    assert!(matches!(err, RenderError::PageOutOfRange { page: 3, page_count: 2 }));
}

#[tokio::test]
async fn device_pixel_ratio_only_sizes_the_raster() {
    let viewer = DocumentViewer::new(engine(), ViewerConfig::resume())
        .with_viewport(Viewport::new(800.0, 600.0).with_device_pixel_ratio(2.0));
    viewer
        .load(OpenSource::Bytes(fixtures::pdf_with_pages(&[(200.0, 100.0)])))
        .await
        .expect("load should succeed");

    let surface = viewer.render_page(1, 1.0).await.expect("render should succeed");

    assert_eq!((surface.logical_width, surface.logical_height), (200.0, 100.0));
    assert_eq!((surface.pixel_width(), surface.pixel_height()), (400, 200));
}

#[tokio::test]
async fn render_scale_is_clamped_to_bounds() {
    let viewer = loaded_resume(1).await;

    let surface = viewer.render_page(1, 9.0).await.expect("render should succeed");

    assert_eq!(surface.scale, 4.0);
}

#[tokio::test(start_paused = true)]
async fn zoom_burst_renders_once_at_final_scale() {
    let viewer = loaded_resume(2).await;

    let zooms = [1.0, 1.5, 2.0].map(|scale| viewer.set_scale(scale));
    let dispatches = futures::future::join_all(zooms).await;

    assert!(dispatches[0].coalesced);
    assert!(dispatches[1].coalesced);
    assert!(!dispatches[2].coalesced);
    assert!(dispatches[..2].iter().all(|dispatch| dispatch.renders.is_empty()));

    let rendered: Vec<_> = dispatches[2].completed().map(|surface| surface.page_number).collect();
    assert_eq!(rendered, vec![1, 2]);
    assert!(dispatches[2].completed().all(|surface| surface.scale == 2.0));
    assert_eq!(viewer.scale(), 2.0);
}

#[tokio::test(start_paused = true)]
async fn zoom_label_updates_before_render_settles() {
    let viewer = loaded_resume(1).await;

    let dispatch = viewer.set_scale(1.5).await;

    let controls = dispatch
        .effects
        .iter()
        .find_map(|effect| match effect {
            Effect::UpdateControls(controls) => Some(controls.clone()),
            _ => None,
        })
        .expect("controls should be refreshed");
    assert_eq!(controls.zoom_label, "150%");
}

#[tokio::test(start_paused = true)]
async fn go_to_page_then_zoom_renders_target_page_once() {
    let viewer = loaded_resume(3).await;

    let navigation = viewer.go_to_page(3).await;
    assert!(navigation.effects.contains(&Effect::ScrollIntoView(3)));
    assert!(navigation.renders.is_empty());

    let zoom = viewer.set_scale(2.0).await;
    let page_three: Vec<_> = zoom.completed().filter(|surface| surface.page_number == 3).collect();
    assert_eq!(page_three.len(), 1);
    assert_eq!(page_three[0].scale, 2.0);

    let controls = viewer.nav_controls();
    assert_eq!(controls.page_label(), "3");
    assert!(controls.prev_enabled);
    assert!(!controls.next_enabled);
    assert_eq!(controls.zoom_label, "200%");
}

#[tokio::test]
async fn navigation_clamps_to_document() {
    let viewer = loaded_resume(3).await;

    viewer.go_to_page(99).await;
    assert_eq!(viewer.current_page(), 3);

    viewer.next_page().await;
    assert_eq!(viewer.current_page(), 3);

    viewer.go_to_page(0).await;
    assert_eq!(viewer.current_page(), 1);

    viewer.prev_page().await;
    assert_eq!(viewer.current_page(), 1);
}

#[tokio::test]
async fn viewport_reports_track_current_page() {
    let viewer = loaded_resume(3).await;

    let dispatch = viewer
        .set_current_page_from_viewport(vec![
            PageVisibility::new(1, 0.2),
            PageVisibility::new(2, 0.7),
        ])
        .await;

    assert_eq!(viewer.current_page(), 2);
    assert!(matches!(dispatch.effects.as_slice(), [Effect::UpdateControls(_)]));
    assert_eq!(viewer.state().render_targets(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn page_scrolled_into_view_after_zoom_is_rendered() {
    let viewer = loaded_resume(3).await;
    viewer.set_current_page_from_viewport(vec![PageVisibility::new(1, 1.0)]).await;
    viewer.set_scale(2.0).await;
    assert!(viewer.surface(3).is_none());

    let scrolled = viewer
        .set_current_page_from_viewport(vec![
            PageVisibility::new(1, 0.0),
            PageVisibility::new(3, 0.9),
        ])
        .await;

    assert_eq!(viewer.current_page(), 3);
    let rendered: Vec<_> =
        scrolled.completed().map(|surface| (surface.page_number, surface.scale)).collect();
    assert_eq!(rendered, vec![(3, 2.0)]);
    assert_eq!(viewer.surface(3).expect("page 3 should have a surface").scale, 2.0);

    viewer.set_current_page_from_viewport(vec![PageVisibility::new(3, 0.0)]).await;
    let back = viewer.set_current_page_from_viewport(vec![PageVisibility::new(3, 0.8)]).await;
    assert!(back.renders.is_empty(), "surface at the current scale should be reused");
}

#[tokio::test]
async fn ctrl_zero_fits_width_immediately() {
    let viewer = loaded_resume(1).await;
    viewer.reset_zoom().await;
    assert_eq!(viewer.scale(), 1.0);

    let dispatch = viewer.dispatch(UiEvent::Key(KeyInput::with_ctrl("0"))).await;

    assert!(dispatch.effects.contains(&Effect::PreventDefault));
    assert!(!dispatch.coalesced);
    let surface = dispatch.completed().next().expect("fit should render right away");
    assert!((surface.scale - 760.0 / 612.0).abs() < 1e-4);
}

#[tokio::test(start_paused = true)]
async fn close_drops_pending_zoom() {
    let viewer = loaded_resume(1).await;

    let (dispatch, ()) = tokio::join!(viewer.set_scale(2.0), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        viewer.close();
    });

    assert!(dispatch.coalesced);
    assert!(dispatch.renders.is_empty());
    assert!(!viewer.is_loaded());
    assert!(viewer.surface(1).is_none());
}

#[tokio::test]
async fn reloading_discards_previous_surfaces() {
    let viewer = loaded_resume(2).await;
    viewer.render_page(2, 1.0).await.expect("render should succeed");

    let info = viewer
        .load(OpenSource::Bytes(fixtures::pdf_with_pages(&[LETTER])))
        .await
        .expect("reload should succeed");

    assert_eq!(info.page_count, 1);
    assert!(viewer.surface(2).is_none());
    assert_eq!(viewer.current_page(), 1);
}

#[tokio::test]
async fn certificate_fit_never_upscales() {
    let viewer = DocumentViewer::new(engine(), ViewerConfig::certificate())
        .with_viewport(Viewport::new(1280.0, 800.0));

    let info = viewer
        .load(OpenSource::Bytes(fixtures::png_bytes(400, 300)))
        .await
        .expect("load should succeed");

    assert_eq!(info.kind, DocumentKind::Image);
    assert_eq!(info.initial_scale, 1.0);

    viewer.zoom_in().await;
    assert_eq!(viewer.scale(), 1.25);
    viewer.fit_to_page().await;
    assert_eq!(viewer.scale(), 1.0);
}

#[tokio::test]
async fn certificate_is_resolved_from_query() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("aws.png");
    std::fs::write(&path, fixtures::png_bytes(200, 100)).expect("fixture should be written");

    let catalog_json = serde_json::json!([
        { "id": "aws", "title": "AWS Cloud Practitioner", "source": path.to_string_lossy() }
    ])
    .to_string();
    let catalog = CertificateCatalog::from_json(&catalog_json).expect("catalog should parse");
    let viewer = DocumentViewer::new(engine(), ViewerConfig::certificate());

    let info = viewer
        .load_certificate(&catalog, "?id=aws")
        .await
        .expect("certificate should load");
    assert_eq!(info.page_count, 1);

    let missing = viewer
        .load_certificate(&catalog, "?id=gcp")
        .await
        .expect_err("unknown id should fail");
    assert!(matches!(missing, LoadError::UnknownCertificate(id) if id == "gcp"));
    assert!(!viewer.is_loaded());
}
