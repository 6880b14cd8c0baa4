use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Continuous,
    SinglePage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    Width,
    Page,
}

/// Inclusive zoom range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBounds {
    pub min: f32,
    pub max: f32,
}

impl ScaleBounds {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Nearest in-range value; non-finite input maps to `min`
    pub fn clamp(self, scale: f32) -> f32 {
        if !scale.is_finite() {
            return self.min;
        }

        scale.clamp(self.min, self.max)
    }

    pub fn contains(self, scale: f32) -> bool {
        (self.min..=self.max).contains(&scale)
    }
}

/// Per-viewer tuning
///
/// `resume()` matches the continuous-scroll PDF viewer, `certificate()` the
/// single image viewer that never enlarges past natural size when fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub mode: ViewMode,
    pub bounds: ScaleBounds,
    pub zoom_step: f32,
    pub padding_px: f32,
    /// Lower bound for the container extent used by fit calculations
    pub min_container_px: f32,
    pub allow_upscale: bool,
    pub initial_fit: FitMode,
    pub zoom_debounce: Duration,
}

impl ViewerConfig {
    pub fn resume() -> Self {
        Self {
            mode: ViewMode::Continuous,
            bounds: ScaleBounds::new(0.5, 4.0),
            zoom_step: 0.25,
            padding_px: 40.0,
            min_container_px: 320.0,
            allow_upscale: true,
            initial_fit: FitMode::Width,
            zoom_debounce: Duration::from_millis(80),
        }
    }

    pub fn certificate() -> Self {
        Self {
            mode: ViewMode::SinglePage,
            bounds: ScaleBounds::new(0.5, 3.0),
            zoom_step: 0.25,
            padding_px: 40.0,
            min_container_px: 0.0,
            allow_upscale: false,
            initial_fit: FitMode::Page,
            zoom_debounce: Duration::from_millis(80),
        }
    }

    pub fn with_mode(mut self, mode: ViewMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_bounds(mut self, bounds: ScaleBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_zoom_debounce(mut self, quiet: Duration) -> Self {
        self.zoom_debounce = quiet;
        self
    }

    pub fn with_upscale(mut self, allow: bool) -> Self {
        self.allow_upscale = allow;
        self
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::resume()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width_px: f32,
    pub height_px: f32,
    pub device_pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width_px: f32, height_px: f32) -> Self {
        Self { width_px, height_px, device_pixel_ratio: 1.0 }
    }

    pub fn with_device_pixel_ratio(mut self, dpr: f32) -> Self {
        self.device_pixel_ratio = dpr;
        self
    }

    /// Device pixel ratio used for surface allocation, 1.0 when unusable
    pub fn output_scale(&self) -> f32 {
        if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width_px: 1280.0, height_px: 800.0, device_pixel_ratio: 1.0 }
    }
}

/// Natural page size at scale 1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn scaled(self, scale: f32) -> Self {
        Self { width: self.width * scale, height: self.height * scale }
    }
}

/// Everything the viewer knows about what is on screen
///
/// `current_page` is 1-based and stays within `1..=total_pages` once a
/// document is loaded; an empty viewer has `total_pages == 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub config: ViewerConfig,
    pub viewport: Viewport,
    pub total_pages: u32,
    pub current_page: u32,
    pub scale: f32,
    /// Intersection ratio per page, as last reported by the viewport
    pub visible: BTreeMap<u32, f32>,
    /// Natural sizes fetched so far
    pub page_sizes: BTreeMap<u32, PageSize>,
}

impl ViewState {
    pub fn new(config: ViewerConfig) -> Self {
        let scale = config.bounds.clamp(1.0);

        Self {
            config,
            viewport: Viewport::default(),
            total_pages: 0,
            current_page: 0,
            scale,
            visible: BTreeMap::new(),
            page_sizes: BTreeMap::new(),
        }
    }

    /// Fresh state for a document with `total_pages` pages
    pub fn for_document(config: ViewerConfig, viewport: Viewport, total_pages: u32) -> Self {
        Self {
            viewport,
            total_pages,
            current_page: u32::from(total_pages > 0),
            ..Self::new(config)
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.total_pages > 0
    }

    /// Clamp and store a new scale, returning the stored value
    pub fn set_scale(&mut self, scale: f32) -> f32 {
        self.scale = self.config.bounds.clamp(scale);
        self.scale
    }

    /// Clamp and store a new current page, returning the stored value
    pub fn set_current_page(&mut self, page: u32) -> u32 {
        self.current_page = crate::clamp_page(page, self.total_pages);
        self.current_page
    }

    pub fn reference_page(&self) -> Option<PageSize> {
        self.page_sizes.get(&1).copied()
    }

    /// Pages that must be re-rendered after a scale change
    ///
    /// Continuous mode re-renders what the viewport reported as visible, or
    /// every page while nothing has been reported yet; single-page mode only
    /// the current page.
    pub fn render_targets(&self) -> Vec<u32> {
        if !self.is_loaded() {
            return Vec::new();
        }

        match self.config.mode {
            ViewMode::SinglePage => vec![self.current_page],
            ViewMode::Continuous if self.visible.is_empty() => (1..=self.total_pages).collect(),
            ViewMode::Continuous => self.visible.keys().copied().collect(),
        }
    }
}
