//! UI events reduced to view-state transitions
//!
//! Handlers never touch the state in place: `reduce` maps the current state
//! and one event to the next state plus the side effects the controller and
//! the presentation layer must carry out.

use crate::{fit_scale, most_visible_page, FitMode, NavControls, PageVisibility, ViewMode};
use crate::{ViewState, Viewport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInput {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl KeyInput {
    pub fn plain(key: impl Into<String>) -> Self {
        Self { key: key.into(), ctrl: false, meta: false, shift: false }
    }

    pub fn with_ctrl(key: impl Into<String>) -> Self {
        Self { ctrl: true, ..Self::plain(key) }
    }

    fn has_command_modifier(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    PrevPage,
    NextPage,
    GoToPage(u32),
    ZoomIn,
    ZoomOut,
    SetScale(f32),
    FitWidth,
    FitPage,
    ResetZoom,
    Wheel { ctrl: bool, delta_y: f32 },
    Key(KeyInput),
    Intersection(Vec<PageVisibility>),
    Resize(Viewport),
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Render now
    Render { pages: Vec<u32>, scale: f32 },
    /// Render once the zoom burst settles
    ScheduleRender { pages: Vec<u32>, scale: f32 },
    /// Render only the pages whose committed surface is missing or was
    /// drawn at another scale
    EnsureRendered { pages: Vec<u32>, scale: f32 },
    ScrollIntoView(u32),
    UpdateControls(NavControls),
    PreventDefault,
    Close,
}

impl Effect {
    pub fn is_render(&self) -> bool {
        matches!(
            self,
            Self::Render { .. } | Self::ScheduleRender { .. } | Self::EnsureRendered { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: ViewState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: &ViewState) -> Self {
        Self { state: state.clone(), effects: Vec::new() }
    }
}

pub fn reduce(state: &ViewState, event: UiEvent) -> Transition {
    match event {
        UiEvent::Resize(viewport) => {
            let mut next = state.clone();
            next.viewport = viewport;
            Transition { state: next, effects: Vec::new() }
        }
        UiEvent::Close => Transition { state: state.clone(), effects: vec![Effect::Close] },
        _ if !state.is_loaded() => Transition::unchanged(state),
        UiEvent::PrevPage => go_to(state, state.current_page.saturating_sub(1)),
        UiEvent::NextPage => go_to(state, state.current_page.saturating_add(1)),
        UiEvent::GoToPage(page) => go_to(state, page),
        UiEvent::ZoomIn => zoom_to(state, state.scale + state.config.zoom_step),
        UiEvent::ZoomOut => zoom_to(state, state.scale - state.config.zoom_step),
        UiEvent::SetScale(scale) => zoom_to(state, scale),
        UiEvent::FitWidth => fit(state, FitMode::Width),
        UiEvent::FitPage => fit(state, FitMode::Page),
        UiEvent::ResetZoom => rescale_now(state, 1.0),
        UiEvent::Wheel { ctrl: false, .. } => Transition::unchanged(state),
        UiEvent::Wheel { ctrl: true, delta_y } => {
            let step = if delta_y < 0.0 { UiEvent::ZoomIn } else { UiEvent::ZoomOut };
            prevent_default(reduce(state, step))
        }
        UiEvent::Key(key) => match key_command(&key) {
            Some((command, true)) => prevent_default(reduce(state, command)),
            Some((command, false)) => reduce(state, command),
            None => Transition::unchanged(state),
        },
        UiEvent::Intersection(entries) => intersect(state, &entries),
    }
}

/// Keyboard shortcut table; the flag says whether the browser default
/// must be suppressed
fn key_command(key: &KeyInput) -> Option<(UiEvent, bool)> {
    match key.key.as_str() {
        "ArrowLeft" => Some((UiEvent::PrevPage, false)),
        "ArrowRight" => Some((UiEvent::NextPage, false)),
        "+" | "=" if !key.has_command_modifier() => Some((UiEvent::ZoomIn, true)),
        "-" if !key.has_command_modifier() => Some((UiEvent::ZoomOut, true)),
        "0" if key.has_command_modifier() => Some((UiEvent::FitWidth, true)),
        _ => None,
    }
}

fn prevent_default(mut transition: Transition) -> Transition {
    transition.effects.push(Effect::PreventDefault);
    transition
}

fn go_to(state: &ViewState, page: u32) -> Transition {
    let mut next = state.clone();
    let previous = next.current_page;
    let page = next.set_current_page(page);

    let mut effects = Vec::new();
    match next.config.mode {
        ViewMode::Continuous => effects.push(Effect::ScrollIntoView(page)),
        ViewMode::SinglePage if page != previous => {
            effects.push(Effect::Render { pages: vec![page], scale: next.scale });
        }
        ViewMode::SinglePage => {}
    }
    effects.push(Effect::UpdateControls(NavControls::from_state(&next)));

    Transition { state: next, effects }
}

fn zoom_to(state: &ViewState, scale: f32) -> Transition {
    let mut next = state.clone();
    let previous = next.scale;
    let scale = next.set_scale(scale);

    let mut effects = Vec::new();
    if scale != previous {
        effects.push(Effect::ScheduleRender { pages: next.render_targets(), scale });
    }
    effects.push(Effect::UpdateControls(NavControls::from_state(&next)));

    Transition { state: next, effects }
}

fn rescale_now(state: &ViewState, scale: f32) -> Transition {
    let mut next = state.clone();
    let scale = next.set_scale(scale);

    let effects = vec![
        Effect::Render { pages: next.render_targets(), scale },
        Effect::UpdateControls(NavControls::from_state(&next)),
    ];

    Transition { state: next, effects }
}

fn fit(state: &ViewState, mode: FitMode) -> Transition {
    let Some(reference) = state.reference_page() else {
        return Transition::unchanged(state);
    };

    rescale_now(state, fit_scale(mode, &state.viewport, reference, &state.config))
}

fn intersect(state: &ViewState, entries: &[PageVisibility]) -> Transition {
    let mut next = state.clone();
    let mut appeared = Vec::new();

    for entry in entries {
        if entry.page == 0 || entry.page > next.total_pages {
            continue;
        }

        if entry.is_intersecting() {
            if next.visible.insert(entry.page, entry.ratio).is_none() && !appeared.contains(&entry.page) {
                appeared.push(entry.page);
            }
        } else {
            next.visible.remove(&entry.page);
            appeared.retain(|&page| page != entry.page);
        }
    }

    let mut effects = Vec::new();
    if next.config.mode == ViewMode::Continuous && !appeared.is_empty() {
        appeared.sort_unstable();
        effects.push(Effect::EnsureRendered { pages: appeared, scale: next.scale });
    }
    if let Some(page) = most_visible_page(entries) {
        let previous = next.current_page;
        if next.set_current_page(page) != previous {
            effects.push(Effect::UpdateControls(NavControls::from_state(&next)));
        }
    }

    Transition { state: next, effects }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PageSize, ViewerConfig};

    fn loaded(config: ViewerConfig, pages: u32) -> ViewState {
        let mut state = ViewState::for_document(config, Viewport::new(800.0, 600.0), pages);
        state.page_sizes.insert(1, PageSize::new(1000.0, 1400.0));
        state
    }

    fn controls(transition: &Transition) -> Option<&NavControls> {
        transition.effects.iter().find_map(|effect| match effect {
            Effect::UpdateControls(controls) => Some(controls),
            _ => None,
        })
    }

    #[test]
    fn empty_viewer_ignores_navigation_and_zoom() {
        let state = ViewState::new(ViewerConfig::resume());

        for event in [UiEvent::NextPage, UiEvent::ZoomIn, UiEvent::FitWidth] {
            let transition = reduce(&state, event);
            assert_eq!(transition.state, state);
            assert!(transition.effects.is_empty());
        }
    }

    #[test]
    fn next_page_scrolls_in_continuous_mode() {
        let state = loaded(ViewerConfig::resume(), 3);

        let transition = reduce(&state, UiEvent::NextPage);

        assert_eq!(transition.state.current_page, 2);
        assert_eq!(transition.effects[0], Effect::ScrollIntoView(2));
        assert!(!transition.effects.iter().any(Effect::is_render));
    }

    #[test]
    fn prev_page_clamps_at_first_page() {
        let state = loaded(ViewerConfig::resume(), 3);

        let transition = reduce(&state, UiEvent::PrevPage);

        assert_eq!(transition.state.current_page, 1);
        assert!(!controls(&transition).unwrap().prev_enabled);
    }

    #[test]
    fn single_page_mode_renders_new_page() {
        let config = ViewerConfig::resume().with_mode(ViewMode::SinglePage);
        let state = loaded(config, 3);

        let transition = reduce(&state, UiEvent::GoToPage(3));

        assert_eq!(transition.effects[0], Effect::Render { pages: vec![3], scale: state.scale });
        let controls = controls(&transition).unwrap();
        assert!(controls.prev_enabled);
        assert!(!controls.next_enabled);
    }

    #[test]
    fn zoom_schedules_debounced_render() {
        let state = loaded(ViewerConfig::resume(), 2);

        let transition = reduce(&state, UiEvent::ZoomIn);

        assert_eq!(transition.state.scale, 1.25);
        assert_eq!(
            transition.effects[0],
            Effect::ScheduleRender { pages: vec![1, 2], scale: 1.25 }
        );
        assert_eq!(controls(&transition).unwrap().zoom_label, "125%");
    }

    #[test]
    fn zoom_at_bound_does_not_render() {
        let mut state = loaded(ViewerConfig::resume(), 2);
        state.set_scale(4.0);

        let transition = reduce(&state, UiEvent::ZoomIn);

        assert_eq!(transition.state.scale, 4.0);
        assert!(!transition.effects.iter().any(Effect::is_render));
    }

    #[test]
    fn fit_width_renders_immediately() {
        let state = loaded(ViewerConfig::resume(), 1);

        let transition = reduce(&state, UiEvent::FitWidth);

        assert!((transition.state.scale - 0.76).abs() < 1e-6);
        assert!(matches!(transition.effects[0], Effect::Render { .. }));
    }

    #[test]
    fn fit_without_reference_page_is_ignored() {
        let state = ViewState::for_document(ViewerConfig::resume(), Viewport::default(), 2);

        let transition = reduce(&state, UiEvent::FitPage);

        assert!(transition.effects.is_empty());
    }

    #[test]
    fn ctrl_wheel_zooms_and_prevents_default() {
        let state = loaded(ViewerConfig::resume(), 1);

        let zoom_in = reduce(&state, UiEvent::Wheel { ctrl: true, delta_y: -120.0 });
        assert_eq!(zoom_in.state.scale, 1.25);
        assert_eq!(zoom_in.effects.last(), Some(&Effect::PreventDefault));

        let zoom_out = reduce(&state, UiEvent::Wheel { ctrl: true, delta_y: 120.0 });
        assert_eq!(zoom_out.state.scale, 0.75);

        let scroll = reduce(&state, UiEvent::Wheel { ctrl: false, delta_y: 120.0 });
        assert!(scroll.effects.is_empty());
    }

    #[test]
    fn keyboard_shortcuts_map_to_commands() {
        let state = loaded(ViewerConfig::resume(), 3);

        let right = reduce(&state, UiEvent::Key(KeyInput::plain("ArrowRight")));
        assert_eq!(right.state.current_page, 2);

        let plus = reduce(&state, UiEvent::Key(KeyInput::plain("=")));
        assert_eq!(plus.state.scale, 1.25);
        assert_eq!(plus.effects.last(), Some(&Effect::PreventDefault));

        let fit = reduce(&state, UiEvent::Key(KeyInput::with_ctrl("0")));
        assert!((fit.state.scale - 0.76).abs() < 1e-6);

        let ctrl_plus = reduce(&state, UiEvent::Key(KeyInput::with_ctrl("+")));
        assert!(ctrl_plus.effects.is_empty());

        let other = reduce(&state, UiEvent::Key(KeyInput::plain("x")));
        assert!(other.effects.is_empty());
    }

    #[test]
    fn intersection_tracks_most_visible_page() {
        let state = loaded(ViewerConfig::resume(), 3);

        let transition = reduce(
            &state,
            UiEvent::Intersection(vec![PageVisibility::new(2, 0.85), PageVisibility::new(3, 0.25)]),
        );

        assert_eq!(transition.state.current_page, 2);
        assert_eq!(transition.state.render_targets(), vec![2, 3]);
        assert_eq!(controls(&transition).unwrap().current_page, 2);
        assert_eq!(
            transition.effects[0],
            Effect::EnsureRendered { pages: vec![2, 3], scale: state.scale }
        );

        let scrolled = reduce(
            &transition.state,
            UiEvent::Intersection(vec![PageVisibility::new(2, 0.0), PageVisibility::new(3, 0.9)]),
        );
        assert_eq!(scrolled.state.current_page, 3);
        assert_eq!(scrolled.state.render_targets(), vec![3]);
        assert!(!scrolled.effects.iter().any(Effect::is_render));
    }

    #[test]
    fn page_scrolling_into_view_is_rendered_at_current_scale() {
        let mut state = loaded(ViewerConfig::resume(), 3);
        state.visible.insert(1, 1.0);
        state.set_scale(2.0);

        let transition = reduce(
            &state,
            UiEvent::Intersection(vec![PageVisibility::new(1, 0.0), PageVisibility::new(3, 0.9)]),
        );

        assert_eq!(
            transition.effects[0],
            Effect::EnsureRendered { pages: vec![3], scale: 2.0 }
        );
    }

    #[test]
    fn single_page_mode_ignores_intersection_renders() {
        let config = ViewerConfig::resume().with_mode(ViewMode::SinglePage);
        let state = loaded(config, 3);

        let transition = reduce(&state, UiEvent::Intersection(vec![PageVisibility::new(2, 0.5)]));

        assert!(!transition.effects.iter().any(Effect::is_render));
    }

    #[test]
    fn resize_updates_viewport_without_rendering() {
        let state = loaded(ViewerConfig::resume(), 1);

        let transition = reduce(&state, UiEvent::Resize(Viewport::new(1024.0, 768.0)));

        assert_eq!(transition.state.viewport.width_px, 1024.0);
        assert!(transition.effects.is_empty());
    }
}
