//! The map session: one canvas, its venue markers and the pin-drop mode,
//! driven by the host through the operations below.
//!
//! Long-running operations come in two halves. `begin_*` starts the work and
//! returns a future that owns everything it needs; `complete_*` applies the
//! outcome. The event loop awaits the future between the two so it never
//! holds the session across a suspension point. The plain `async` forms
//! chain both halves for callers that can.

use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::error::MapError;
use crate::geo::Coordinate;
use crate::map::canvas::{CanvasEvent, CanvasEventKind, ListenerId, MapCanvasHandle, Popup, SurfaceSize};
use crate::map::markers::{MarkerReconciler, SyncReport};
use crate::map::pin_drop::{PendingLocation, PinDropController, PinDropMode};
use crate::map::resource::{AcquireRequest, AcquireResult, MapResourceManager, PendingAcquire};
use crate::map::tiles::TileLayerKind;
use crate::services::{GeocodeGateway, Geolocation, PlaceSelection, ServiceFuture, VenueStore};
use crate::venue::{Activity, Venue, VenueDetails, VenueId, VenueSnapshot};

/// Zoom used when jumping to the viewer or a searched place, unless the map
/// is already closer
const FOCUS_ZOOM: f64 = 14.0;

#[derive(Clone, Debug, PartialEq)]
pub enum SessionStatus {
    Unmounted,
    Mounting,
    Ready,
    Failed(MapError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum MountStatus {
    Ready,
    Failed(MapError),
}

pub type PendingMount = PendingAcquire;

pub struct MapSession {
    resources: Rc<MapResourceManager>,
    store: Rc<dyn VenueStore>,
    geocoder: Rc<dyn GeocodeGateway>,
    geolocation: Rc<dyn Geolocation>,
    reconciler: MarkerReconciler,
    pin_drop: PinDropController,
    status: SessionStatus,
    canvas: Option<MapCanvasHandle>,
    marker_listener: Option<ListenerId>,
    last_request: Option<AcquireRequest>,
    venues: VenueSnapshot,
    filter: Option<Activity>,
    tile_layer: TileLayerKind,
    selected: Option<VenueId>,
    viewer: Option<String>,
    saving: bool,
}

impl MapSession {
    pub fn new(
        resources: Rc<MapResourceManager>,
        store: Rc<dyn VenueStore>,
        geocoder: Rc<dyn GeocodeGateway>,
        geolocation: Rc<dyn Geolocation>,
        viewer: Option<String>,
        tile_layer: TileLayerKind,
    ) -> Self {
        Self {
            resources,
            store,
            pin_drop: PinDropController::new(Rc::clone(&geocoder)),
            geocoder,
            geolocation,
            reconciler: MarkerReconciler::new(),
            status: SessionStatus::Unmounted,
            canvas: None,
            marker_listener: None,
            last_request: None,
            venues: Rc::from(Vec::new()),
            filter: None,
            tile_layer,
            selected: None,
            viewer,
            saving: false,
        }
    }

    // ── mount / unmount ─────────────────────────────────────────────────

    /// Acquire the canvas for `container` and bring it up to date
    pub async fn mount(&mut self, container: &str, center: Coordinate, zoom: f64) -> MountStatus {
        let pending = self.begin_mount(container, center, zoom);
        let result = pending.await;
        self.complete_mount(result)
    }

    pub fn begin_mount(&mut self, container: &str, center: Coordinate, zoom: f64) -> PendingMount {
        let request = AcquireRequest::new(container, center, zoom);
        self.last_request = Some(request.clone());
        if self.status != SessionStatus::Ready {
            self.status = SessionStatus::Mounting;
        }
        info!(container, "Mounting map");
        self.resources.acquire(request)
    }

    /// Re-issue the last mount after a failure
    pub fn retry_mount(&mut self) -> Option<PendingMount> {
        if !matches!(self.status, SessionStatus::Failed(_)) {
            return None;
        }
        let request = self.last_request.clone()?;
        info!(container = %request.container, "Retrying map mount");
        self.status = SessionStatus::Mounting;
        Some(self.resources.acquire(request))
    }

    pub fn complete_mount(&mut self, result: AcquireResult) -> MountStatus {
        match result {
            Ok(handle) if handle.is_live() => {
                self.adopt(handle);
                MountStatus::Ready
            }
            Ok(_) | Err(MapError::Abandoned) => {
                debug!("Mount outcome arrived after unmount; ignored");
                MountStatus::Failed(MapError::Abandoned)
            }
            Err(e) => {
                warn!(error = %e, "Map mount failed");
                self.status = SessionStatus::Failed(e.clone());
                MountStatus::Failed(e)
            }
        }
    }

    fn adopt(&mut self, handle: MapCanvasHandle) {
        if self.canvas.as_ref().is_some_and(|c| c.ptr_eq(&handle)) {
            self.status = SessionStatus::Ready;
            return;
        }

        self.resources.set_tile_layer(self.tile_layer);
        {
            let mut canvas = handle.borrow_mut();
            self.marker_listener = Some(canvas.on(CanvasEventKind::MarkerClick));
            self.reconciler.forget();
            self.reconciler
                .sync(&mut canvas, &self.venues, self.filter, self.viewer.as_deref());
        }
        self.canvas = Some(handle);
        self.status = SessionStatus::Ready;
        info!(venues = self.venues.len(), "Map ready");
    }

    /// Detach everything this session attached, then release the canvas.
    /// Safe to call repeatedly or before mounting.
    pub fn unmount(&mut self) {
        if let Some(handle) = self.canvas.take() {
            let mut canvas = handle.borrow_mut();
            self.pin_drop.teardown(&mut canvas);
            if let Some(listener) = self.marker_listener.take() {
                canvas.off(listener);
            }
            self.reconciler.clear(&mut canvas);
        } else {
            self.pin_drop.forget();
            self.reconciler.forget();
        }

        self.resources.release();
        self.status = SessionStatus::Unmounted;
        self.selected = None;
        debug!("Map unmounted");
    }

    fn ready_canvas(&self) -> Option<MapCanvasHandle> {
        match self.status {
            SessionStatus::Ready => self.canvas.clone(),
            _ => None,
        }
    }

    /// Follow the host surface when the terminal is resized
    pub fn resize(&mut self, size: SurfaceSize) {
        if let Some(handle) = &self.canvas {
            handle.borrow_mut().resize(size);
        }
    }

    // ── venues ──────────────────────────────────────────────────────────

    pub fn fetch_venues(&self) -> ServiceFuture<Vec<Venue>> {
        self.store.list_venues()
    }

    /// Replace the snapshot and filter; markers follow once the map is ready
    pub fn update_venues(&mut self, venues: VenueSnapshot, filter: Option<Activity>) -> Option<SyncReport> {
        self.venues = venues;
        self.filter = filter;
        let report = self.sync_markers();

        if let Some(id) = &self.selected {
            let visible = match report {
                Some(_) => self.reconciler.marker_for(id).is_some(),
                None => self.venues.iter().any(|v| &v.id == id),
            };
            if !visible {
                self.selected = None;
            }
        }
        report
    }

    fn sync_markers(&mut self) -> Option<SyncReport> {
        let handle = self.ready_canvas()?;
        let mut canvas = handle.borrow_mut();
        let report = self
            .reconciler
            .sync(&mut canvas, &self.venues, self.filter, self.viewer.as_deref());
        Some(report)
    }

    /// Start deleting a venue the viewer created
    pub fn begin_delete(&self, id: &VenueId) -> Result<ServiceFuture<()>, MapError> {
        let venue = self
            .venues
            .iter()
            .find(|v| &v.id == id)
            .ok_or_else(|| MapError::PersistenceFailed(format!("unknown venue {id}")))?;
        if !venue.is_created_by(self.viewer.as_deref()) {
            return Err(MapError::NotPermitted);
        }
        Ok(self.store.delete_venue(id))
    }

    pub fn complete_delete(&mut self, id: &VenueId, result: Result<(), MapError>) -> Result<(), MapError> {
        if let Err(e) = result {
            warn!(%id, error = %e, "Venue delete failed");
            return Err(e);
        }
        let remaining: Vec<Venue> = self.venues.iter().filter(|v| &v.id != id).cloned().collect();
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.update_venues(remaining.into(), self.filter);
        Ok(())
    }

    pub async fn delete_venue(&mut self, id: &VenueId) -> Result<(), MapError> {
        let pending = self.begin_delete(id)?;
        let result = pending.await;
        self.complete_delete(id, result)
    }

    // ── tiles & view ────────────────────────────────────────────────────

    /// Remembered across mounts; applied immediately when a canvas is live
    pub fn set_tile_layer(&mut self, kind: TileLayerKind) {
        self.tile_layer = kind;
        self.resources.set_tile_layer(kind);
    }

    pub fn begin_locate(&self) -> ServiceFuture<Coordinate> {
        self.geolocation.current_position()
    }

    /// Recenter on the reported position
    pub fn complete_locate(&mut self, result: Result<Coordinate, MapError>) -> Result<Coordinate, MapError> {
        let at = result.and_then(|at| Coordinate::checked(at.lat, at.lng))?;
        self.focus(at);
        info!(lat = at.lat, lng = at.lng, "Centered on current location");
        Ok(at)
    }

    pub async fn request_current_location(&mut self) -> Result<Coordinate, MapError> {
        let lookup = self.begin_locate();
        let result = lookup.await;
        self.complete_locate(result)
    }

    fn focus(&mut self, at: Coordinate) {
        if let Some(handle) = self.ready_canvas() {
            let mut canvas = handle.borrow_mut();
            let zoom = canvas.zoom().max(FOCUS_ZOOM);
            canvas.set_view(at, zoom);
        }
    }

    pub fn search_places(&self, query: &str) -> ServiceFuture<Vec<PlaceSelection>> {
        self.geocoder.search(query)
    }

    pub fn begin_select_place(&self, selection: &PlaceSelection) -> ServiceFuture<Coordinate> {
        self.geocoder.place_to_coordinate(selection)
    }

    /// Jump to a picked place; in pin-drop mode the pin goes there too
    pub fn complete_select_place(
        &mut self,
        selection: &PlaceSelection,
        result: Result<Coordinate, MapError>,
    ) -> Result<Coordinate, MapError> {
        let at = result?;
        self.focus(at);
        if self.pin_drop.is_active() {
            if let Some(handle) = self.ready_canvas() {
                self.pin_drop
                    .place_at(&mut handle.borrow_mut(), at, Some(selection.label.clone()));
            }
        }
        Ok(at)
    }

    pub async fn select_place(&mut self, selection: &PlaceSelection) -> Result<Coordinate, MapError> {
        let lookup = self.begin_select_place(selection);
        let result = lookup.await;
        self.complete_select_place(selection, result)
    }

    // ── pin drop ────────────────────────────────────────────────────────

    pub fn toggle_pin_drop_mode(&mut self, on: bool) -> Result<(), MapError> {
        let handle = self.ready_canvas().ok_or(MapError::NotReady)?;
        self.pin_drop.set_mode(&mut handle.borrow_mut(), on);
        if on {
            self.selected = None;
        }
        Ok(())
    }

    pub fn cancel_pin_drop(&mut self) {
        match self.ready_canvas() {
            Some(handle) => self.pin_drop.cancel(&mut handle.borrow_mut()),
            None => self.pin_drop.forget(),
        }
    }

    /// Start storing the pending pin as a venue. The preview stays until
    /// the store confirms.
    pub fn begin_finalize(&mut self, details: VenueDetails) -> Result<ServiceFuture<Venue>, MapError> {
        if self.saving {
            return Err(MapError::PersistenceFailed("a save is already in progress".to_string()));
        }
        let draft = self.pin_drop.draft(details, self.viewer.as_deref())?;
        self.saving = true;
        Ok(self.store.create_venue(draft))
    }

    pub fn complete_finalize(&mut self, result: Result<Venue, MapError>) -> Result<Venue, MapError> {
        self.saving = false;
        let venue = match result {
            Ok(venue) => venue,
            Err(e) => {
                warn!(error = %e, "Venue save failed; pin kept");
                return Err(e);
            }
        };

        if let Some(handle) = self.ready_canvas() {
            self.pin_drop.complete(&mut handle.borrow_mut());
        } else {
            self.pin_drop.forget();
        }

        let mut venues = self.venues.to_vec();
        venues.push(venue.clone());
        self.update_venues(venues.into(), self.filter);
        info!(id = %venue.id, "Venue added from pin");
        Ok(venue)
    }

    pub async fn finalize_pin_drop(&mut self, details: VenueDetails) -> Result<Venue, MapError> {
        let pending = self.begin_finalize(details)?;
        let result = pending.await;
        self.complete_finalize(result)
    }

    // ── events & selection ──────────────────────────────────────────────

    /// Forward a pointer event to the canvas. Returns true if anything the
    /// host draws changed.
    pub fn handle_canvas_event(&mut self, event: CanvasEvent) -> bool {
        let Some(handle) = self.ready_canvas() else {
            return false;
        };
        let mut canvas = handle.borrow_mut();
        let fired = canvas.dispatch(&event);

        if self.pin_drop.on_event(&mut canvas, &event, &fired) {
            return true;
        }

        match event {
            CanvasEvent::MarkerClick(marker)
                if self.marker_listener.is_some_and(|id| fired.contains(&id)) =>
            {
                match self.reconciler.venue_for(marker) {
                    Some(id) => {
                        self.selected = Some(id.clone());
                        true
                    }
                    None => false,
                }
            }
            CanvasEvent::Click(_) => self.selected.take().is_some(),
            _ => false,
        }
    }

    pub fn select_venue(&mut self, id: Option<VenueId>) {
        self.selected = id.filter(|id| self.reconciler.marker_for(id).is_some());
    }

    pub fn selected_venue(&self) -> Option<&Venue> {
        let id = self.selected.as_ref()?;
        self.venues.iter().find(|v| &v.id == id)
    }

    /// Info surface of the selected venue's marker
    pub fn selected_popup(&self) -> Option<Popup> {
        let handle = self.ready_canvas()?;
        let marker = self.reconciler.marker_for(self.selected.as_ref()?)?;
        let canvas = handle.borrow();
        canvas.marker(marker).and_then(|m| m.popup.clone())
    }

    // ── accessors ───────────────────────────────────────────────────────

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == SessionStatus::Ready
    }

    /// The live canvas, once the session has adopted it
    pub fn canvas(&self) -> Option<&MapCanvasHandle> {
        match self.status {
            SessionStatus::Ready => self.canvas.as_ref(),
            _ => None,
        }
    }

    pub fn venues(&self) -> &VenueSnapshot {
        &self.venues
    }

    pub fn filter(&self) -> Option<Activity> {
        self.filter
    }

    pub fn tile_layer(&self) -> TileLayerKind {
        self.tile_layer
    }

    pub fn pin_drop_mode(&self) -> PinDropMode {
        self.pin_drop.mode()
    }

    pub fn pending_pin(&self) -> Option<PendingLocation> {
        self.pin_drop.pending()
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn viewer(&self) -> Option<&str> {
        self.viewer.as_deref()
    }

    pub fn resources(&self) -> &Rc<MapResourceManager> {
        &self.resources
    }
}

impl Drop for MapSession {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::canvas::{MarkerIcon, PopupAction};
    use crate::map::resource::{AcquireSettings, SurfaceRegistry};
    use crate::map::tiles::TileLayerProvider;
    use crate::services::testing::{CountingGeocoder, FakeStore, FixedGeolocation};
    use crate::venue::venue;
    use std::time::Duration;
    use tokio::task::LocalSet;

    const AUSTIN: Coordinate = Coordinate::new(30.2672, -97.7431);

    struct Harness {
        registry: Rc<SurfaceRegistry>,
        resources: Rc<MapResourceManager>,
        store: Rc<FakeStore>,
        geocoder: Rc<CountingGeocoder>,
        session: MapSession,
    }

    fn harness_with(viewer: Option<&str>, location: Result<Coordinate, MapError>) -> Harness {
        let registry = Rc::new(SurfaceRegistry::new());
        registry.report("map", SurfaceSize::new(80, 24));
        let resources = MapResourceManager::new(
            registry.clone(),
            TileLayerProvider::default(),
            AcquireSettings {
                poll_interval: Duration::from_millis(10),
                max_attempts: 5,
            },
        );
        let store = Rc::new(FakeStore::default());
        let geocoder = Rc::new(CountingGeocoder::default());
        let session = MapSession::new(
            resources.clone(),
            store.clone(),
            geocoder.clone(),
            Rc::new(FixedGeolocation(location)),
            viewer.map(str::to_string),
            TileLayerKind::Street,
        );
        Harness {
            registry,
            resources,
            store,
            geocoder,
            session,
        }
    }

    fn harness() -> Harness {
        harness_with(Some("alice"), Ok(AUSTIN))
    }

    fn snapshot(venues: Vec<Venue>) -> VenueSnapshot {
        venues.into()
    }

    fn basketball(id: &str) -> Venue {
        venue(id, AUSTIN.lat, AUSTIN.lng, &[(Activity::Basketball, 2)])
    }

    fn marker_count(session: &MapSession) -> usize {
        session.canvas().map(|c| c.borrow().marker_count()).unwrap_or(0)
    }

    fn preview_count(session: &MapSession) -> usize {
        session
            .canvas()
            .map(|c| c.borrow().markers().filter(|m| m.icon == MarkerIcon::Preview).count())
            .unwrap_or(0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_then_sync() {
        let mut h = harness();
        assert_eq!(h.session.mount("map", AUSTIN, 12.0).await, MountStatus::Ready);
        assert!(h.session.is_ready());

        let report = h.session.update_venues(snapshot(vec![basketball("v1")]), None);
        assert_eq!(report.map(|r| r.added), Some(1));
        assert_eq!(marker_count(&h.session), 1);
        assert_eq!(h.resources.constructions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_venues_before_mount_sync_on_adoption() {
        let mut h = harness();
        assert!(h
            .session
            .update_venues(snapshot(vec![basketball("v1"), basketball("v2")]), None)
            .is_none());
        assert_eq!(h.session.status(), &SessionStatus::Unmounted);

        h.session.mount("map", AUSTIN, 12.0).await;
        assert_eq!(marker_count(&h.session), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_scenario() {
        let mut h = harness();
        h.session.mount("map", AUSTIN, 12.0).await;
        let venues = snapshot(vec![basketball("v1")]);

        h.session.update_venues(venues.clone(), Some(Activity::Basketball));
        assert_eq!(marker_count(&h.session), 1);

        h.session.update_venues(venues, Some(Activity::Tennis));
        assert_eq!(marker_count(&h.session), 0);
        assert!(h.session.canvas().unwrap().is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_twice_reuses_canvas_and_listeners() {
        let mut h = harness();
        h.session.mount("map", AUSTIN, 12.0).await;
        h.session.mount("map", AUSTIN, 12.0).await;

        let canvas = h.session.canvas().unwrap().borrow();
        assert_eq!(canvas.listener_count(CanvasEventKind::MarkerClick), 1);
        drop(canvas);
        assert_eq!(h.resources.constructions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_failure_then_retry() {
        let mut h = harness();
        h.registry.forget("map");

        let status = h.session.mount("map", AUSTIN, 12.0).await;
        assert!(matches!(
            status,
            MountStatus::Failed(MapError::ResourceUnavailable { attempts: 5, .. })
        ));
        assert!(matches!(h.session.status(), SessionStatus::Failed(_)));
        assert!(h.session.canvas().is_none());

        h.registry.report("map", SurfaceSize::new(80, 24));
        let pending = h.session.retry_mount().unwrap();
        let result = pending.await;
        assert_eq!(h.session.complete_mount(result), MountStatus::Ready);
        assert!(h.session.retry_mount().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_during_mount_discards_canvas() {
        let mut h = harness();
        h.registry.forget("map");
        let pending = h.session.begin_mount("map", AUSTIN, 12.0);
        h.session.unmount();
        h.registry.report("map", SurfaceSize::new(80, 24));

        let result = pending.await;
        assert_eq!(
            h.session.complete_mount(result),
            MountStatus::Failed(MapError::Abandoned)
        );
        assert_eq!(h.session.status(), &SessionStatus::Unmounted);
        assert!(h.resources.live().is_none());
        assert_eq!(h.resources.constructions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tile_preference_applied_on_adoption() {
        let mut h = harness();
        h.session.set_tile_layer(TileLayerKind::Satellite);
        h.session.mount("map", AUSTIN, 12.0).await;

        let canvas = h.session.canvas().unwrap().borrow();
        assert_eq!(canvas.layers().len(), 1);
        assert_eq!(canvas.tile_layer().unwrap().kind, TileLayerKind::Satellite);
        drop(canvas);

        h.session.set_tile_layer(TileLayerKind::Street);
        h.session.set_tile_layer(TileLayerKind::Street);
        assert_eq!(h.session.canvas().unwrap().borrow().layers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_drop_finalize_adds_venue() {
        LocalSet::new()
            .run_until(async {
                let mut h = harness();
                h.session.mount("map", AUSTIN, 12.0).await;
                h.session.update_venues(snapshot(vec![basketball("v1")]), None);

                h.session.toggle_pin_drop_mode(true).unwrap();
                let at = Coordinate::new(30.0, -97.0);
                assert!(h.session.handle_canvas_event(CanvasEvent::Click(at)));
                assert_eq!(h.session.pin_drop_mode(), PinDropMode::Previewing);
                tokio::task::yield_now().await;
                assert_eq!(h.geocoder.lookup_count(), 1);

                let details = VenueDetails {
                    name: "Dropped".to_string(),
                    courts: [(Activity::Tennis, 2)].into_iter().collect(),
                    ..VenueDetails::default()
                };
                let venue = h.session.finalize_pin_drop(details).await.unwrap();

                assert_eq!(venue.coordinate, at);
                assert_eq!(venue.address, CountingGeocoder::address_for(at));
                assert_eq!(venue.created_by.as_deref(), Some("alice"));
                assert_eq!(h.session.pin_drop_mode(), PinDropMode::Inactive);
                assert_eq!(preview_count(&h.session), 0);
                assert_eq!(h.session.venues().len(), 2);
                assert_eq!(marker_count(&h.session), 2);
                assert_eq!(h.store.creates.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_keeps_preview() {
        LocalSet::new()
            .run_until(async {
                let mut h = harness();
                h.session.mount("map", AUSTIN, 12.0).await;
                h.store.fail.set(true);

                h.session.toggle_pin_drop_mode(true).unwrap();
                let at = Coordinate::new(30.0, -97.0);
                h.session.handle_canvas_event(CanvasEvent::Click(at));

                let result = h.session.finalize_pin_drop(VenueDetails::default()).await;
                assert!(matches!(result, Err(MapError::PersistenceFailed(_))));
                assert_eq!(h.session.pin_drop_mode(), PinDropMode::Previewing);
                assert_eq!(preview_count(&h.session), 1);
                assert_eq!(h.session.pending_pin().unwrap().coordinate, at);
                assert!(!h.session.is_saving());
                assert!(h.session.venues().is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_without_pin() {
        let mut h = harness();
        h.session.mount("map", AUSTIN, 12.0).await;
        assert_eq!(
            h.session.finalize_pin_drop(VenueDetails::default()).await,
            Err(MapError::NoPendingPin)
        );
        assert_eq!(h.store.creates.get(), 0);
    }

    #[test]
    fn test_pin_drop_requires_ready_map() {
        let mut h = harness();
        assert_eq!(h.session.toggle_pin_drop_mode(true), Err(MapError::NotReady));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_detaches_everything() {
        LocalSet::new()
            .run_until(async {
                let mut h = harness();
                h.session.mount("map", AUSTIN, 12.0).await;
                h.session.update_venues(snapshot(vec![basketball("v1")]), None);
                let canvas = h.session.canvas().unwrap().clone();

                h.session.toggle_pin_drop_mode(true).unwrap();
                h.session.handle_canvas_event(CanvasEvent::Click(AUSTIN));

                h.session.unmount();
                h.session.unmount();

                let c = canvas.borrow();
                assert!(!c.is_ready());
                assert_eq!(c.marker_count(), 0);
                assert_eq!(c.listener_count(CanvasEventKind::MarkerClick), 0);
                assert_eq!(c.listener_count(CanvasEventKind::DragEnd), 0);
                drop(c);
                assert!(h.resources.live().is_none());
                assert_eq!(h.session.pin_drop_mode(), PinDropMode::Inactive);
                assert_eq!(h.session.status(), &SessionStatus::Unmounted);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_remount_after_unmount_builds_fresh_canvas() {
        let mut h = harness();
        h.session.update_venues(snapshot(vec![basketball("v1")]), None);
        h.session.mount("map", AUSTIN, 12.0).await;
        h.session.unmount();
        h.session.mount("map", AUSTIN, 12.0).await;

        assert_eq!(h.resources.constructions(), 2);
        assert_eq!(marker_count(&h.session), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_click_selects_and_click_clears() {
        let mut h = harness();
        let mut owned = basketball("v1");
        owned.created_by = Some("alice".to_string());
        h.session.mount("map", AUSTIN, 12.0).await;
        h.session.update_venues(snapshot(vec![owned]), None);

        let marker = h.session.canvas().unwrap().borrow().markers().next().unwrap().handle;
        assert!(h.session.handle_canvas_event(CanvasEvent::MarkerClick(marker)));
        assert_eq!(h.session.selected_venue().map(|v| v.id.as_str()), Some("v1"));

        let popup = h.session.selected_popup().unwrap();
        assert_eq!(popup.actions, vec![PopupAction::Delete(VenueId::new("v1"))]);

        assert!(h.session.handle_canvas_event(CanvasEvent::Click(AUSTIN)));
        assert!(h.session.selected_popup().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_only_by_creator() {
        let mut h = harness();
        let mut mine = basketball("mine");
        mine.created_by = Some("alice".to_string());
        let mut theirs = basketball("theirs");
        theirs.created_by = Some("bob".to_string());
        h.store.venues.replace(vec![mine.clone(), theirs.clone()]);

        h.session.mount("map", AUSTIN, 12.0).await;
        h.session.update_venues(snapshot(vec![mine, theirs]), None);

        assert_eq!(
            h.session.delete_venue(&VenueId::new("theirs")).await,
            Err(MapError::NotPermitted)
        );
        h.session.delete_venue(&VenueId::new("mine")).await.unwrap();

        assert_eq!(h.session.venues().len(), 1);
        assert_eq!(marker_count(&h.session), 1);
        assert_eq!(h.store.venues.borrow().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delete_changes_nothing() {
        let mut h = harness();
        let mut mine = basketball("mine");
        mine.created_by = Some("alice".to_string());
        h.session.mount("map", AUSTIN, 12.0).await;
        h.session.update_venues(snapshot(vec![mine]), None);
        h.store.fail.set(true);

        assert!(h.session.delete_venue(&VenueId::new("mine")).await.is_err());
        assert_eq!(marker_count(&h.session), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_recenters() {
        let mut h = harness();
        h.session.mount("map", Coordinate::new(0.0, 0.0), 3.0).await;

        assert_eq!(h.session.request_current_location().await, Ok(AUSTIN));
        let canvas = h.session.canvas().unwrap().borrow();
        assert_eq!(canvas.center(), AUSTIN);
        assert_eq!(canvas.zoom(), FOCUS_ZOOM);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_failure_leaves_view() {
        let mut h = harness_with(
            Some("alice"),
            Err(MapError::LocationUnavailable("denied".to_string())),
        );
        h.session.mount("map", AUSTIN, 12.0).await;

        assert!(h.session.request_current_location().await.is_err());
        assert_eq!(h.session.canvas().unwrap().borrow().center(), AUSTIN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_place_moves_pin_when_dropping() {
        let mut h = harness();
        h.session.mount("map", AUSTIN, 12.0).await;
        h.session.toggle_pin_drop_mode(true).unwrap();

        let selection = PlaceSelection {
            id: "30.5,-97.7".to_string(),
            label: "Round Rock".to_string(),
        };
        let at = h.session.select_place(&selection).await.unwrap();

        assert_eq!(at, Coordinate::new(30.5, -97.7));
        let pending = h.session.pending_pin().unwrap();
        assert_eq!(pending.coordinate, at);
        assert_eq!(pending.address.as_deref(), Some("Round Rock"));
        assert_eq!(h.geocoder.lookup_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filtered_out_selection_is_cleared() {
        let mut h = harness();
        h.session.mount("map", AUSTIN, 12.0).await;
        let venues = snapshot(vec![basketball("v1")]);
        h.session.update_venues(venues.clone(), None);
        h.session.select_venue(Some(VenueId::new("v1")));
        assert!(h.session.selected_venue().is_some());

        h.session.update_venues(venues, Some(Activity::Soccer));
        assert!(h.session.selected_venue().is_none());
    }
}
