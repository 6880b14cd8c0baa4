mod events;
mod query;
mod state;

pub use events::{reduce, Effect, KeyInput, Transition, UiEvent};
pub use query::{
    query_param, CatalogError, CertificateCatalog, CertificateEntry, ViewerSelection,
};
pub use state::{FitMode, PageSize, ScaleBounds, ViewMode, ViewState, Viewport, ViewerConfig};

/// One entry of a viewport intersection report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageVisibility {
    pub page: u32,
    pub ratio: f32,
}

impl PageVisibility {
    pub fn new(page: u32, ratio: f32) -> Self {
        Self { page, ratio }
    }

    pub fn is_intersecting(&self) -> bool {
        self.ratio > 0.0
    }
}

/// What the navigation toolbar should display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavControls {
    pub current_page: u32,
    pub page_count: u32,
    pub prev_enabled: bool,
    pub next_enabled: bool,
    pub zoom_label: String,
}

impl NavControls {
    pub fn from_state(state: &ViewState) -> Self {
        Self {
            current_page: state.current_page,
            page_count: state.total_pages,
            prev_enabled: state.current_page > 1,
            next_enabled: state.current_page < state.total_pages,
            zoom_label: zoom_label(state.scale),
        }
    }

    pub fn page_label(&self) -> String {
        self.current_page.to_string()
    }

    pub fn page_count_label(&self) -> String {
        self.page_count.to_string()
    }
}

pub fn zoom_label(scale: f32) -> String {
    format!("{}%", (scale * 100.0).round() as i64)
}

/// Clamp a 1-based page number into `1..=page_count`
pub fn clamp_page(page: u32, page_count: u32) -> u32 {
    if page_count == 0 {
        return 0;
    }

    page.clamp(1, page_count)
}

/// Page with the highest intersection ratio among intersecting entries
///
/// Ties keep the entry reported first.
pub fn most_visible_page(entries: &[PageVisibility]) -> Option<u32> {
    let mut best: Option<PageVisibility> = None;

    for entry in entries.iter().filter(|entry| entry.is_intersecting()) {
        match best {
            Some(current) if entry.ratio <= current.ratio => {}
            _ => best = Some(*entry),
        }
    }

    best.map(|entry| entry.page)
}

fn container_extent(viewport_extent: f32, config: &ViewerConfig) -> f32 {
    (viewport_extent - config.padding_px).max(config.min_container_px)
}

fn finish_fit(raw: f32, config: &ViewerConfig) -> f32 {
    let capped = if config.allow_upscale { raw } else { raw.min(1.0) };
    config.bounds.clamp(capped)
}

/// Scale at which `page` fills the viewport width minus padding
pub fn fit_width_scale(viewport: &Viewport, page: PageSize, config: &ViewerConfig) -> f32 {
    if viewport.width_px <= 0.0 || page.width <= 0.0 {
        return config.bounds.clamp(1.0);
    }

    let width = container_extent(viewport.width_px, config);
    finish_fit(width / page.width, config)
}

/// Scale at which all of `page` fits inside the viewport minus padding
pub fn fit_page_scale(viewport: &Viewport, page: PageSize, config: &ViewerConfig) -> f32 {
    if viewport.width_px <= 0.0
        || viewport.height_px <= 0.0
        || page.width <= 0.0
        || page.height <= 0.0
    {
        return config.bounds.clamp(1.0);
    }

    let width = container_extent(viewport.width_px, config) / page.width;
    let height = container_extent(viewport.height_px, config) / page.height;

    finish_fit(width.min(height), config)
}

/// Fit scale for `mode`
pub fn fit_scale(mode: FitMode, viewport: &Viewport, page: PageSize, config: &ViewerConfig) -> f32 {
    match mode {
        FitMode::Width => fit_width_scale(viewport, page, config),
        FitMode::Page => fit_page_scale(viewport, page, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_width_fills_container_minus_padding() {
        let config = ViewerConfig::resume();
        let viewport = Viewport::new(800.0, 600.0);
        let page = PageSize::new(1000.0, 1400.0);

        let scale = fit_width_scale(&viewport, page, &config);
        let rendered = page.scaled(scale).width;

        assert!((rendered - 760.0).abs() < 0.5, "rendered width was {rendered}");
    }

    #[test]
    fn fit_width_floors_container_for_resume_profile() {
        let config = ViewerConfig::resume();
        let viewport = Viewport::new(200.0, 600.0);
        let page = PageSize::new(640.0, 800.0);

        assert_eq!(fit_width_scale(&viewport, page, &config), 0.5);
    }

    #[test]
    fn certificate_fit_never_upscales() {
        let config = ViewerConfig::certificate();
        let viewport = Viewport::new(2000.0, 1600.0);
        let page = PageSize::new(800.0, 600.0);

        assert_eq!(fit_width_scale(&viewport, page, &config), 1.0);
        assert_eq!(fit_page_scale(&viewport, page, &config), 1.0);
    }

    #[test]
    fn resume_fit_may_upscale() {
        let config = ViewerConfig::resume();
        let viewport = Viewport::new(1240.0, 900.0);
        let page = PageSize::new(600.0, 800.0);

        assert_eq!(fit_width_scale(&viewport, page, &config), 2.0);
    }

    #[test]
    fn fit_page_uses_smallest_dimension_ratio() {
        let config = ViewerConfig::certificate();
        let viewport = Viewport::new(1040.0, 840.0);
        let page = PageSize::new(2000.0, 4000.0);

        assert_eq!(fit_page_scale(&viewport, page, &config), 0.5);

        let wide = PageSize::new(1600.0, 1000.0);
        assert_eq!(fit_page_scale(&viewport, wide, &config), 0.625);
    }

    #[test]
    fn degenerate_fit_falls_back_to_natural_size() {
        let config = ViewerConfig::resume();
        let page = PageSize::new(0.0, 0.0);

        assert_eq!(fit_width_scale(&Viewport::default(), page, &config), 1.0);
        assert_eq!(fit_page_scale(&Viewport::new(0.0, 0.0), page, &config), 1.0);
    }

    #[test]
    fn clamp_page_stays_in_range() {
        assert_eq!(clamp_page(0, 3), 1);
        assert_eq!(clamp_page(2, 3), 2);
        assert_eq!(clamp_page(9, 3), 3);
        assert_eq!(clamp_page(1, 0), 0);
    }

    #[test]
    fn most_visible_prefers_highest_ratio() {
        let entries = [
            PageVisibility::new(1, 0.25),
            PageVisibility::new(2, 0.85),
            PageVisibility::new(3, 0.55),
        ];

        assert_eq!(most_visible_page(&entries), Some(2));
    }

    #[test]
    fn most_visible_ignores_non_intersecting_and_keeps_first_tie() {
        let entries = [
            PageVisibility::new(4, 0.0),
            PageVisibility::new(2, 0.55),
            PageVisibility::new(3, 0.55),
        ];

        assert_eq!(most_visible_page(&entries), Some(2));
        assert_eq!(most_visible_page(&[PageVisibility::new(1, 0.0)]), None);
    }

    #[test]
    fn nav_controls_reflect_page_position() {
        let mut state = ViewState::for_document(ViewerConfig::resume(), Viewport::default(), 3);
        state.set_scale(1.5);

        let first = NavControls::from_state(&state);
        assert!(!first.prev_enabled);
        assert!(first.next_enabled);
        assert_eq!(first.zoom_label, "150%");

        state.set_current_page(3);
        let last = NavControls::from_state(&state);
        assert_eq!(last.page_label(), "3");
        assert_eq!(last.page_count_label(), "3");
        assert!(last.prev_enabled);
        assert!(!last.next_enabled);
    }
}
