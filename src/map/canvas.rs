//! The live map surface: viewport, attached tile layers, markers and event
//! listeners. Only [`MapResourceManager`](super::resource::MapResourceManager)
//! creates and destroys one.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::MapError;
use crate::geo::Coordinate;
use crate::map::projection::{Viewport, MIN_ZOOM};
use crate::map::tiles::{TileLayerDescriptor, TileLayerKind};
use crate::venue::{Activity, VenueId};

/// Smallest map area (in terminal cells) a canvas can be bound to
pub const MIN_SURFACE_WIDTH: u16 = 8;
pub const MIN_SURFACE_HEIGHT: u16 = 4;

/// Size of the host surface in terminal cells
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u16,
    pub height: u16,
}

impl SurfaceSize {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Braille resolution: 2x4 dots per cell
    pub fn pixel_size(&self) -> (usize, usize) {
        (self.width as usize * 2, self.height as usize * 4)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanvasId(pub u64);

/// Identity of one marker object on the canvas. A new handle is minted for
/// every `add_marker`, so an unchanged handle means the marker was never
/// recreated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerIcon {
    Activity(Activity),
    /// Venue without any courts listed
    Venue,
    /// The pin being placed in add-venue mode
    Preview,
}

impl MarkerIcon {
    pub fn glyph(self) -> char {
        match self {
            MarkerIcon::Activity(Activity::Basketball) => '●',
            MarkerIcon::Activity(Activity::Tennis) => '◆',
            MarkerIcon::Activity(Activity::Pickleball) => '▲',
            MarkerIcon::Activity(Activity::Volleyball) => '■',
            MarkerIcon::Activity(Activity::Soccer) => '★',
            MarkerIcon::Venue => '○',
            MarkerIcon::Preview => '✚',
        }
    }
}

/// Action offered inside a marker's info surface
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PopupAction {
    Delete(VenueId),
}

/// Structured info surface bound to a marker
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Popup {
    pub title: String,
    pub subtitle: String,
    /// (label, value) rows
    pub fields: Vec<(String, String)>,
    pub actions: Vec<PopupAction>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub handle: MarkerHandle,
    pub position: Coordinate,
    pub icon: MarkerIcon,
    pub draggable: bool,
    pub popup: Option<Popup>,
}

/// Events the host forwards to the canvas
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CanvasEvent {
    /// Click on empty map
    Click(Coordinate),
    MarkerClick(MarkerHandle),
    /// Intermediate drag frame
    Drag { marker: MarkerHandle, to: Coordinate },
    DragEnd { marker: MarkerHandle, to: Coordinate },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CanvasEventKind {
    Click,
    MarkerClick,
    DragEnd,
}

impl CanvasEvent {
    /// Kind listeners subscribe to; drag frames have no listeners
    pub fn kind(&self) -> Option<CanvasEventKind> {
        match self {
            CanvasEvent::Click(_) => Some(CanvasEventKind::Click),
            CanvasEvent::MarkerClick(_) => Some(CanvasEventKind::MarkerClick),
            CanvasEvent::Drag { .. } => None,
            CanvasEvent::DragEnd { .. } => Some(CanvasEventKind::DragEnd),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Listener {
    id: ListenerId,
    kind: CanvasEventKind,
    once: bool,
}

/// Pointer affordance shown over the map
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Cursor {
    #[default]
    Grab,
    Crosshair,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttachedLayer {
    pub kind: TileLayerKind,
    pub descriptor: TileLayerDescriptor,
}

/// One map rendering surface bound to a host container
#[derive(Debug)]
pub struct MapCanvas {
    id: CanvasId,
    container: String,
    size: SurfaceSize,
    viewport: Viewport,
    layers: Vec<AttachedLayer>,
    markers: BTreeMap<MarkerHandle, Marker>,
    listeners: Vec<Listener>,
    cursor: Cursor,
    next_id: u64,
    destroyed: bool,
}

impl MapCanvas {
    /// Bind a canvas to a measured surface. Fails on an unusable view or a
    /// surface too small to draw into.
    pub fn new(
        id: CanvasId,
        container: &str,
        size: SurfaceSize,
        center: Coordinate,
        zoom: f64,
    ) -> Result<Self, MapError> {
        if !center.is_valid() {
            return Err(MapError::InitializationFailed(format!(
                "invalid center ({}, {})",
                center.lat, center.lng
            )));
        }
        if !zoom.is_finite() || zoom < MIN_ZOOM {
            return Err(MapError::InitializationFailed(format!("invalid zoom {zoom}")));
        }
        if size.width < MIN_SURFACE_WIDTH || size.height < MIN_SURFACE_HEIGHT {
            return Err(MapError::InitializationFailed(format!(
                "surface {}x{} is below the minimum {}x{}",
                size.width, size.height, MIN_SURFACE_WIDTH, MIN_SURFACE_HEIGHT
            )));
        }

        let (width, height) = size.pixel_size();
        Ok(Self {
            id,
            container: container.to_string(),
            size,
            viewport: Viewport::new(center, zoom, width, height),
            layers: Vec::new(),
            markers: BTreeMap::new(),
            listeners: Vec::new(),
            cursor: Cursor::default(),
            next_id: 1,
            destroyed: false,
        })
    }

    fn mint(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn id(&self) -> CanvasId {
        self.id
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn is_ready(&self) -> bool {
        !self.destroyed
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn center(&self) -> Coordinate {
        self.viewport.center
    }

    pub fn zoom(&self) -> f64 {
        self.viewport.zoom
    }

    pub fn set_view(&mut self, center: Coordinate, zoom: f64) {
        self.viewport.set_center(center);
        self.viewport.set_zoom(zoom);
    }

    /// Follow the host surface when the terminal is resized
    pub fn resize(&mut self, size: SurfaceSize) {
        if size.is_empty() || size == self.size {
            return;
        }
        self.size = size;
        let (width, height) = size.pixel_size();
        self.viewport.width = width;
        self.viewport.height = height;
    }

    // ── tile layers ─────────────────────────────────────────────────────

    pub fn attach_layer(&mut self, kind: TileLayerKind, descriptor: &TileLayerDescriptor) {
        self.viewport.set_max_zoom(descriptor.max_zoom as f64);
        self.layers.push(AttachedLayer {
            kind,
            descriptor: descriptor.clone(),
        });
    }

    pub fn detach_layers(&mut self) -> usize {
        let removed = self.layers.len();
        self.layers.clear();
        removed
    }

    pub fn layers(&self) -> &[AttachedLayer] {
        &self.layers
    }

    /// Topmost attached layer
    pub fn tile_layer(&self) -> Option<&AttachedLayer> {
        self.layers.last()
    }

    // ── markers ─────────────────────────────────────────────────────────

    pub fn add_marker(&mut self, position: Coordinate, icon: MarkerIcon, draggable: bool) -> MarkerHandle {
        let handle = MarkerHandle(self.mint());
        self.markers.insert(
            handle,
            Marker {
                handle,
                position,
                icon,
                draggable,
                popup: None,
            },
        );
        handle
    }

    pub fn remove_marker(&mut self, handle: MarkerHandle) -> bool {
        self.markers.remove(&handle).is_some()
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&Marker> {
        self.markers.get(&handle)
    }

    pub fn markers(&self) -> impl Iterator<Item = &Marker> + '_ {
        self.markers.values()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn set_marker_position(&mut self, handle: MarkerHandle, position: Coordinate) {
        if let Some(marker) = self.markers.get_mut(&handle) {
            marker.position = position;
        }
    }

    pub fn set_marker_icon(&mut self, handle: MarkerHandle, icon: MarkerIcon) {
        if let Some(marker) = self.markers.get_mut(&handle) {
            marker.icon = icon;
        }
    }

    pub fn set_marker_popup(&mut self, handle: MarkerHandle, popup: Popup) {
        if let Some(marker) = self.markers.get_mut(&handle) {
            marker.popup = Some(popup);
        }
    }

    /// Marker closest to a pixel position, within `tolerance` pixels.
    /// Preview markers win ties so a pin dropped on a venue stays draggable.
    pub fn marker_at(&self, px: i32, py: i32, tolerance: i32) -> Option<MarkerHandle> {
        self.markers
            .values()
            .filter_map(|marker| {
                let (mx, my) = self.viewport.project(marker.position);
                let dist = (mx - px).abs().max((my - py).abs());
                (dist <= tolerance).then_some((marker, dist))
            })
            .min_by_key(|(marker, dist)| (*dist, marker.icon != MarkerIcon::Preview))
            .map(|(marker, _)| marker.handle)
    }

    // ── events ──────────────────────────────────────────────────────────

    pub fn on(&mut self, kind: CanvasEventKind) -> ListenerId {
        self.subscribe(kind, false)
    }

    /// Listener removed after its first delivery
    pub fn once(&mut self, kind: CanvasEventKind) -> ListenerId {
        self.subscribe(kind, true)
    }

    fn subscribe(&mut self, kind: CanvasEventKind, once: bool) -> ListenerId {
        let id = ListenerId(self.mint());
        self.listeners.push(Listener { id, kind, once });
        id
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self, kind: CanvasEventKind) -> usize {
        self.listeners.iter().filter(|l| l.kind == kind).count()
    }

    /// Apply the event's built-in behaviour and return the listeners that
    /// should be notified. Drag frames move draggable markers.
    pub fn dispatch(&mut self, event: &CanvasEvent) -> Vec<ListenerId> {
        if self.destroyed {
            return Vec::new();
        }

        match *event {
            CanvasEvent::Drag { marker, to } | CanvasEvent::DragEnd { marker, to } => {
                match self.markers.get_mut(&marker) {
                    Some(m) if m.draggable => m.position = to,
                    _ => return Vec::new(),
                }
            }
            CanvasEvent::MarkerClick(marker) if !self.markers.contains_key(&marker) => {
                return Vec::new();
            }
            _ => {}
        }

        let Some(kind) = event.kind() else {
            return Vec::new();
        };

        let fired: Vec<ListenerId> = self
            .listeners
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.id)
            .collect();
        self.listeners.retain(|l| !(l.kind == kind && l.once));
        fired
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    /// Detach listeners, drop layers and markers. Idempotent.
    pub(crate) fn destroy(&mut self) {
        self.listeners.clear();
        self.layers.clear();
        self.markers.clear();
        self.cursor = Cursor::default();
        self.destroyed = true;
    }
}

/// Shared reference to the live canvas
#[derive(Clone, Debug)]
pub struct MapCanvasHandle(Rc<RefCell<MapCanvas>>);

impl MapCanvasHandle {
    pub(crate) fn new(canvas: MapCanvas) -> Self {
        Self(Rc::new(RefCell::new(canvas)))
    }

    pub fn borrow(&self) -> Ref<'_, MapCanvas> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, MapCanvas> {
        self.0.borrow_mut()
    }

    pub fn is_live(&self) -> bool {
        self.0.borrow().is_ready()
    }

    /// Same underlying canvas
    pub fn ptr_eq(&self, other: &MapCanvasHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn destroy(&self) {
        self.0.borrow_mut().destroy();
    }
}
