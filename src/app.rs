//! Terminal host state. Owns the map session and turns key presses, mouse
//! gestures and background results into session operations.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use std::future::Future;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{self, AppConfig};
use crate::error::MapError;
use crate::geo::Coordinate;
use crate::map::canvas::{CanvasEvent, MarkerHandle, SurfaceSize};
use crate::map::pin_drop::PinDropMode;
use crate::map::resource::{AcquireResult, SurfaceRegistry};
use crate::map::MapRenderer;
use crate::services::PlaceSelection;
use crate::session::{MapSession, MountStatus};
use crate::venue::{Activity, Setting, Venue, VenueDetails, VenueId};

/// Name the map area is registered under in the surface registry
pub const MAP_CONTAINER: &str = "map";

const NOTICE_TTL: Duration = Duration::from_secs(4);
/// Pixels around a marker that still count as a hit
const MARKER_TOLERANCE: i32 = 3;
/// Keyboard pan step in braille pixels
const PAN_X: i32 = 10;
const PAN_Y: i32 = 6;

/// Everything that reaches the app from outside the current call stack
#[derive(Debug)]
pub enum AppMessage {
    Terminal(Event),
    Mounted(AcquireResult),
    VenuesLoaded(Result<Vec<Venue>, MapError>),
    Located(Result<Coordinate, MapError>),
    Suggestions {
        query: String,
        result: Result<Vec<PlaceSelection>, MapError>,
    },
    PlaceResolved {
        selection: PlaceSelection,
        result: Result<Coordinate, MapError>,
    },
    Saved(Result<Venue, MapError>),
    Deleted {
        id: VenueId,
        result: Result<(), MapError>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient message shown in the status bar
#[derive(Clone, Debug)]
pub struct Notice {
    pub text: String,
    pub level: NoticeLevel,
    expires_at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormField {
    Name,
    Setting,
    Lighting,
    Access,
    Courts(Activity),
}

enum FormOutcome {
    Continue,
    Submit,
    Close,
}

/// Details entered for the pin being added
#[derive(Clone, Debug, Default)]
pub struct VenueForm {
    pub details: VenueDetails,
    pub focus: usize,
}

impl VenueForm {
    pub fn fields() -> Vec<FormField> {
        let mut fields = vec![FormField::Name, FormField::Setting, FormField::Lighting, FormField::Access];
        fields.extend(Activity::ALL.iter().map(|&a| FormField::Courts(a)));
        fields
    }

    pub fn focused(&self) -> FormField {
        Self::fields()[self.focus]
    }

    fn handle_key(&mut self, key: KeyEvent) -> FormOutcome {
        let field_count = Self::fields().len();
        match key.code {
            KeyCode::Esc => return FormOutcome::Close,
            KeyCode::Enter => return FormOutcome::Submit,
            KeyCode::Down | KeyCode::Tab => self.focus = (self.focus + 1) % field_count,
            KeyCode::Up | KeyCode::BackTab => self.focus = (self.focus + field_count - 1) % field_count,
            code => match (self.focused(), code) {
                (FormField::Name, KeyCode::Char(c)) => self.details.name.push(c),
                (FormField::Name, KeyCode::Backspace) => {
                    self.details.name.pop();
                }
                (FormField::Setting, KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')) => {
                    self.details.setting = match self.details.setting {
                        Setting::Indoor => Setting::Outdoor,
                        Setting::Outdoor => Setting::Indoor,
                    };
                }
                (FormField::Lighting, KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')) => {
                    self.details.lighting = !self.details.lighting;
                }
                (FormField::Access, KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')) => {
                    self.details.access = self.details.access.next();
                }
                (FormField::Courts(activity), KeyCode::Right | KeyCode::Char('+')) => {
                    *self.details.courts.entry(activity).or_insert(0) += 1;
                }
                (FormField::Courts(activity), KeyCode::Left | KeyCode::Char('-')) => {
                    if let Some(count) = self.details.courts.get_mut(&activity) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            self.details.courts.remove(&activity);
                        }
                    }
                }
                _ => {}
            },
        }
        FormOutcome::Continue
    }
}

enum SearchOutcome {
    Continue,
    QueryChanged(String),
    Pick(PlaceSelection),
    Close,
}

/// Place search box with autocomplete suggestions
#[derive(Clone, Debug, Default)]
pub struct PlaceSearch {
    pub query: String,
    pub suggestions: Vec<PlaceSelection>,
    pub selected: usize,
}

impl PlaceSearch {
    fn handle_key(&mut self, key: KeyEvent) -> SearchOutcome {
        match key.code {
            KeyCode::Esc => SearchOutcome::Close,
            KeyCode::Enter => match self.suggestions.get(self.selected) {
                Some(selection) => SearchOutcome::Pick(selection.clone()),
                None => SearchOutcome::Continue,
            },
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                SearchOutcome::Continue
            }
            KeyCode::Down => {
                if self.selected + 1 < self.suggestions.len() {
                    self.selected += 1;
                }
                SearchOutcome::Continue
            }
            KeyCode::Backspace => {
                self.query.pop();
                SearchOutcome::QueryChanged(self.query.clone())
            }
            KeyCode::Char(c) => {
                self.query.push(c);
                SearchOutcome::QueryChanged(self.query.clone())
            }
            _ => SearchOutcome::Continue,
        }
    }
}

pub enum InputMode {
    Normal,
    Form(VenueForm),
    Search(PlaceSearch),
}

/// Pointer gesture in progress
#[derive(Clone, Copy, Debug)]
enum Drag {
    /// Pressed on empty map; a pan once the pointer moves, a click otherwise
    Map { last: (u16, u16), moved: bool },
    Marker {
        handle: MarkerHandle,
        draggable: bool,
        moved: bool,
    },
}

/// Application state
pub struct App {
    pub session: MapSession,
    pub renderer: MapRenderer,
    registry: Rc<SurfaceRegistry>,
    config: AppConfig,
    config_path: PathBuf,
    tx: mpsc::Sender<AppMessage>,
    pub mode: InputMode,
    pub notice: Option<Notice>,
    pub should_quit: bool,
    /// Current mouse position for the cursor marker
    pub mouse_pos: Option<(u16, u16)>,
    /// Map area inside the border, as last laid out
    map_area: Rect,
    drag: Option<Drag>,
}

impl App {
    pub fn new(
        session: MapSession,
        renderer: MapRenderer,
        registry: Rc<SurfaceRegistry>,
        config: AppConfig,
        config_path: PathBuf,
        tx: mpsc::Sender<AppMessage>,
    ) -> Self {
        Self {
            session,
            renderer,
            registry,
            config,
            config_path,
            tx,
            mode: InputMode::Normal,
            notice: None,
            should_quit: false,
            mouse_pos: None,
            map_area: Rect::default(),
            drag: None,
        }
    }

    /// Run `work` on the local task set and post its outcome back
    fn spawn<F, T>(&self, work: F, wrap: impl FnOnce(T) -> AppMessage + 'static)
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let tx = self.tx.clone();
        tokio::task::spawn_local(async move {
            let outcome = work.await;
            if tx.send(wrap(outcome)).await.is_err() {
                debug!("App gone before a background result arrived");
            }
        });
    }

    /// Begin mounting the map and loading venues
    pub fn start(&mut self) {
        let pending = self.session.begin_mount(
            MAP_CONTAINER,
            self.config.initial_center,
            self.config.initial_zoom,
        );
        self.spawn(pending, AppMessage::Mounted);
        self.spawn(self.session.fetch_venues(), AppMessage::VenuesLoaded);
    }

    /// Record the laid-out map area; this is what makes the surface ready.
    /// Returns true when the size changed.
    pub fn set_map_area(&mut self, area: Rect) -> bool {
        if area == self.map_area {
            return false;
        }
        self.map_area = area;
        let size = SurfaceSize::new(area.width, area.height);
        self.registry.report(MAP_CONTAINER, size);
        self.session.resize(size);
        true
    }

    pub fn map_area(&self) -> Rect {
        self.map_area
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    // ── notices ─────────────────────────────────────────────────────────

    pub fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.notice = Some(Notice {
            text: text.into(),
            level,
            expires_at: Instant::now() + NOTICE_TTL,
        });
    }

    fn notify_info(&mut self, text: impl Into<String>) {
        self.notify(NoticeLevel::Info, text);
    }

    fn notify_error(&mut self, text: impl Into<String>) {
        self.notify(NoticeLevel::Error, text);
    }

    /// Expire notices; true when the screen changed
    pub fn tick(&mut self) -> bool {
        if self.notice.as_ref().is_some_and(|n| Instant::now() >= n.expires_at) {
            self.notice = None;
            return true;
        }
        false
    }

    // ── messages ────────────────────────────────────────────────────────

    /// Apply one message. Returns true if a redraw is needed.
    pub fn handle_message(&mut self, msg: AppMessage) -> bool {
        match msg {
            AppMessage::Terminal(event) => return self.handle_event(event),
            AppMessage::Mounted(result) => {
                if let MountStatus::Failed(e) = self.session.complete_mount(result) {
                    if e != MapError::Abandoned {
                        self.notify_error(format!("Map unavailable: {e}"));
                    }
                }
            }
            AppMessage::VenuesLoaded(Ok(venues)) => {
                info!(count = venues.len(), "Venues loaded");
                let filter = self.session.filter();
                self.session.update_venues(venues.into(), filter);
            }
            AppMessage::VenuesLoaded(Err(e)) => {
                self.notify_error(format!("Could not load venues: {e}"));
            }
            AppMessage::Located(result) => {
                if let Err(e) = self.session.complete_locate(result) {
                    self.notify_error(e.to_string());
                }
            }
            AppMessage::Suggestions { query, result } => {
                let InputMode::Search(search) = &mut self.mode else {
                    return false;
                };
                if search.query != query {
                    debug!(%query, "Dropping suggestions for an old query");
                    return false;
                }
                match result {
                    Ok(suggestions) => {
                        search.suggestions = suggestions;
                        search.selected = 0;
                    }
                    Err(e) => debug!(error = %e, "Place search failed"),
                }
            }
            AppMessage::PlaceResolved { selection, result } => {
                match self.session.complete_select_place(&selection, result) {
                    Ok(_) => {
                        self.mode = InputMode::Normal;
                        self.notify_info(format!("Showing {}", selection.label));
                    }
                    Err(e) => self.notify_error(e.to_string()),
                }
            }
            AppMessage::Saved(result) => match self.session.complete_finalize(result) {
                Ok(venue) => {
                    if matches!(self.mode, InputMode::Form(_)) {
                        self.mode = InputMode::Normal;
                    }
                    self.notify_info(format!("Added {}", venue.name));
                }
                Err(e) => self.notify_error(format!("Could not save venue: {e}")),
            },
            AppMessage::Deleted { id, result } => match self.session.complete_delete(&id, result) {
                Ok(()) => self.notify_info("Venue deleted"),
                Err(e) => self.notify_error(format!("Could not delete venue: {e}")),
            },
        }
        true
    }

    fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::Resize(..) => true,
            _ => false,
        }
    }

    // ── keyboard ────────────────────────────────────────────────────────

    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match &mut self.mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Form(form) => match form.handle_key(key) {
                FormOutcome::Continue => {}
                FormOutcome::Close => self.mode = InputMode::Normal,
                FormOutcome::Submit => self.submit_form(),
            },
            InputMode::Search(search) => match search.handle_key(key) {
                SearchOutcome::Continue => {}
                SearchOutcome::Close => self.mode = InputMode::Normal,
                SearchOutcome::QueryChanged(query) => self.search(query),
                SearchOutcome::Pick(selection) => {
                    let lookup = self.session.begin_select_place(&selection);
                    self.spawn(lookup, move |result| AppMessage::PlaceResolved { selection, result });
                }
            },
        }
        true
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.quit(),
            KeyCode::Esc => {
                if self.session.pin_drop_mode() != PinDropMode::Inactive {
                    self.session.cancel_pin_drop();
                } else if self.session.selected_venue().is_some() {
                    self.session.select_venue(None);
                } else {
                    self.quit();
                }
            }

            KeyCode::Left | KeyCode::Char('h') => self.pan(-PAN_X, 0),
            KeyCode::Right | KeyCode::Char('l') => self.pan(PAN_X, 0),
            KeyCode::Up | KeyCode::Char('k') => self.pan(0, -PAN_Y),
            KeyCode::Down | KeyCode::Char('j') => self.pan(0, PAN_Y),
            KeyCode::Char('+') | KeyCode::Char('=') => self.zoom(true),
            KeyCode::Char('-') | KeyCode::Char('_') => self.zoom(false),

            KeyCode::Char('f') => self.cycle_filter(),
            KeyCode::Char('t') => self.toggle_tile_layer(),
            KeyCode::Char('a') => self.toggle_pin_drop(),
            KeyCode::Enter => self.open_form(),
            KeyCode::Char('/') => self.mode = InputMode::Search(PlaceSearch::default()),
            KeyCode::Char('g') => {
                self.spawn(self.session.begin_locate(), AppMessage::Located);
            }
            KeyCode::Char('d') => self.delete_selected(),
            KeyCode::Char('r') => self.retry_mount(),
            _ => {}
        }
    }

    pub fn pan(&mut self, dx: i32, dy: i32) {
        if let Some(canvas) = self.session.canvas() {
            canvas.borrow_mut().viewport_mut().pan(dx, dy);
        }
    }

    fn zoom(&mut self, zoom_in: bool) {
        if let Some(canvas) = self.session.canvas() {
            let mut canvas = canvas.borrow_mut();
            if zoom_in {
                canvas.viewport_mut().zoom_in();
            } else {
                canvas.viewport_mut().zoom_out();
            }
        }
    }

    fn cycle_filter(&mut self) {
        let filter = Activity::next_filter(self.session.filter());
        let venues = Rc::clone(self.session.venues());
        self.session.update_venues(venues, filter);
    }

    fn toggle_tile_layer(&mut self) {
        let kind = self.session.tile_layer().toggled();
        self.session.set_tile_layer(kind);
        self.config.tile_layer = kind;
        if let Err(e) = config::save_to(&self.config, &self.config_path) {
            warn!(error = %e, "Could not persist tile layer choice");
            self.notify_error("Could not save settings");
        }
    }

    fn toggle_pin_drop(&mut self) {
        let on = self.session.pin_drop_mode() == PinDropMode::Inactive;
        match self.session.toggle_pin_drop_mode(on) {
            Ok(()) if on => self.notify_info("Click the map to place the new venue"),
            Ok(()) => {}
            Err(e) => self.notify_error(e.to_string()),
        }
    }

    fn open_form(&mut self) {
        if self.session.pending_pin().is_some() {
            self.mode = InputMode::Form(VenueForm::default());
        }
    }

    fn submit_form(&mut self) {
        let InputMode::Form(form) = &self.mode else {
            return;
        };
        if form.details.name.trim().is_empty() {
            self.notify_error("Venue name is required");
            return;
        }
        let details = form.details.clone();
        match self.session.begin_finalize(details) {
            Ok(pending) => self.spawn(pending, AppMessage::Saved),
            Err(e) => self.notify_error(format!("Could not save venue: {e}")),
        }
    }

    fn search(&mut self, query: String) {
        if query.trim().is_empty() {
            if let InputMode::Search(search) = &mut self.mode {
                search.suggestions.clear();
                search.selected = 0;
            }
            return;
        }
        let lookup = self.session.search_places(&query);
        self.spawn(lookup, move |result| AppMessage::Suggestions { query, result });
    }

    fn delete_selected(&mut self) {
        let Some(id) = self.session.selected_venue().map(|v| v.id.clone()) else {
            self.notify_info("Select a venue first");
            return;
        };
        match self.session.begin_delete(&id) {
            Ok(pending) => self.spawn(pending, move |result| AppMessage::Deleted { id, result }),
            Err(MapError::NotPermitted) => self.notify_error("Only the person who added a venue can delete it"),
            Err(e) => self.notify_error(e.to_string()),
        }
    }

    fn retry_mount(&mut self) {
        if let Some(pending) = self.session.retry_mount() {
            self.spawn(pending, AppMessage::Mounted);
        }
    }

    // ── mouse ───────────────────────────────────────────────────────────

    /// Braille pixel under a terminal cell, relative to the map area
    fn pixel_at(&self, col: u16, row: u16) -> (i32, i32) {
        (
            (col as i32 - self.map_area.x as i32) * 2,
            (row as i32 - self.map_area.y as i32) * 4,
        )
    }

    fn in_map(&self, col: u16, row: u16) -> bool {
        let area = self.map_area;
        col >= area.x && col < area.x + area.width && row >= area.y && row < area.y + area.height
    }

    fn coordinate_at(&self, px: i32, py: i32) -> Option<Coordinate> {
        let canvas = self.session.canvas()?.borrow();
        Some(canvas.viewport().unproject(px, py).normalized())
    }

    /// Get mouse position in map cells (for the cursor marker)
    pub fn mouse_cell(&self) -> Option<(u16, u16)> {
        let (col, row) = self.mouse_pos?;
        self.in_map(col, row)
            .then(|| (col - self.map_area.x, row - self.map_area.y))
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) -> bool {
        self.mouse_pos = Some((mouse.column, mouse.row));
        if !matches!(self.mode, InputMode::Normal) {
            return false;
        }

        let (col, row) = (mouse.column, mouse.row);
        let (px, py) = self.pixel_at(col, row);
        let inside = self.in_map(col, row);

        match mouse.kind {
            MouseEventKind::ScrollUp if inside => self.zoom_at(px, py, true),
            MouseEventKind::ScrollDown if inside => self.zoom_at(px, py, false),
            MouseEventKind::ScrollLeft => self.pan(-15, 0),
            MouseEventKind::ScrollRight => self.pan(15, 0),
            MouseEventKind::Down(MouseButton::Left) if inside => self.press(px, py, col, row),
            MouseEventKind::Drag(MouseButton::Left) => self.drag_to(px, py, col, row),
            MouseEventKind::Up(MouseButton::Left) => self.release(px, py),
            _ => {}
        }
        true
    }

    fn zoom_at(&mut self, px: i32, py: i32, zoom_in: bool) {
        if let Some(canvas) = self.session.canvas() {
            let mut canvas = canvas.borrow_mut();
            if zoom_in {
                canvas.viewport_mut().zoom_in_at(px, py);
            } else {
                canvas.viewport_mut().zoom_out_at(px, py);
            }
        }
    }

    fn press(&mut self, px: i32, py: i32, col: u16, row: u16) {
        // While a pin is awaited the click places it, even over a venue
        let awaiting_pin = self.session.pin_drop_mode() == PinDropMode::AwaitingClick;
        let hit = self
            .session
            .canvas()
            .and_then(|canvas| {
                let canvas = canvas.borrow();
                let handle = canvas.marker_at(px, py, MARKER_TOLERANCE)?;
                let draggable = canvas.marker(handle)?.draggable;
                Some((handle, draggable))
            })
            .filter(|&(_, draggable)| draggable || !awaiting_pin);
        self.drag = Some(match hit {
            Some((handle, draggable)) => Drag::Marker {
                handle,
                draggable,
                moved: false,
            },
            None => Drag::Map {
                last: (col, row),
                moved: false,
            },
        });
    }

    fn drag_to(&mut self, px: i32, py: i32, col: u16, row: u16) {
        match self.drag {
            Some(Drag::Map { last, .. }) => {
                let dx = last.0 as i32 - col as i32;
                let dy = last.1 as i32 - row as i32;
                self.drag = Some(Drag::Map {
                    last: (col, row),
                    moved: true,
                });
                self.pan(dx * 2, dy * 4);
            }
            Some(Drag::Marker {
                handle,
                draggable: true,
                ..
            }) => {
                self.drag = Some(Drag::Marker {
                    handle,
                    draggable: true,
                    moved: true,
                });
                if let Some(to) = self.coordinate_at(px, py) {
                    self.session.handle_canvas_event(CanvasEvent::Drag { marker: handle, to });
                }
            }
            _ => {}
        }
    }

    fn release(&mut self, px: i32, py: i32) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        let event = match drag {
            Drag::Map { moved: true, .. } => None,
            Drag::Map { moved: false, .. } => self.coordinate_at(px, py).map(CanvasEvent::Click),
            Drag::Marker {
                handle,
                draggable: true,
                moved: true,
            } => self
                .coordinate_at(px, py)
                .map(|to| CanvasEvent::DragEnd { marker: handle, to }),
            Drag::Marker { handle, .. } => Some(CanvasEvent::MarkerClick(handle)),
        };
        if let Some(event) = event {
            self.session.handle_canvas_event(event);
        }
    }

    // ── status text ─────────────────────────────────────────────────────

    pub fn zoom_level(&self) -> String {
        match self.session.canvas() {
            Some(canvas) => format!("z{:.0}", canvas.borrow().zoom()),
            None => "-".to_string(),
        }
    }

    pub fn center_coords(&self) -> String {
        match self.session.canvas() {
            Some(canvas) => canvas.borrow().center().display(),
            None => String::new(),
        }
    }

    pub fn filter_label(&self) -> &'static str {
        self.session.filter().map_or("all", Activity::label)
    }
}
