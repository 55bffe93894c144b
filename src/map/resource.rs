//! Ownership of the single map canvas.
//!
//! The host surface (the map area of the terminal) only gets a size once a
//! frame has been laid out, so acquisition polls for it. Every caller that
//! asks while an acquisition is running joins the same shared future, which
//! keeps construction to exactly one canvas no matter how many mounts race.
//! `release` bumps a generation counter; an acquisition that finishes under
//! an older generation is discarded instead of adopted.

use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::error::MapError;
use crate::geo::Coordinate;
use crate::map::canvas::{CanvasId, MapCanvas, MapCanvasHandle, SurfaceSize};
use crate::map::tiles::{TileLayerKind, TileLayerProvider};

/// Reports the laid-out size of named host surfaces
pub trait SurfaceHost {
    /// `None` while the container does not exist yet
    fn measure(&self, container: &str) -> Option<SurfaceSize>;
}

/// Surface sizes recorded by the renderer after each layout pass
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    sizes: RefCell<HashMap<String, SurfaceSize>>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, container: &str, size: SurfaceSize) {
        self.sizes.borrow_mut().insert(container.to_string(), size);
    }

    pub fn forget(&self, container: &str) {
        self.sizes.borrow_mut().remove(container);
    }
}

impl SurfaceHost for SurfaceRegistry {
    fn measure(&self, container: &str) -> Option<SurfaceSize> {
        self.sizes.borrow().get(container).copied()
    }
}

/// Polling bounds for surface readiness
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquireSettings {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl AcquireSettings {
    /// A size only counts once two probes in a row agree
    pub const MIN_ATTEMPTS: u32 = 2;
}

impl Default for AcquireSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_attempts: 50,
        }
    }
}

/// What to bind the canvas to and where to start
#[derive(Clone, Debug, PartialEq)]
pub struct AcquireRequest {
    pub container: String,
    pub center: Coordinate,
    pub zoom: f64,
}

impl AcquireRequest {
    pub fn new(container: impl Into<String>, center: Coordinate, zoom: f64) -> Self {
        Self {
            container: container.into(),
            center,
            zoom,
        }
    }
}

pub type AcquireResult = Result<MapCanvasHandle, MapError>;

/// Future handed to acquisition callers
pub type PendingAcquire = LocalBoxFuture<'static, AcquireResult>;

type SharedAcquire = Shared<LocalBoxFuture<'static, AcquireResult>>;

#[derive(Default)]
struct ResourceState {
    live: Option<MapCanvasHandle>,
    in_flight: Option<SharedAcquire>,
    /// Bumped by every `release`
    generation: u64,
}

pub struct MapResourceManager {
    host: Rc<dyn SurfaceHost>,
    tiles: TileLayerProvider,
    settings: AcquireSettings,
    state: RefCell<ResourceState>,
    constructions: Cell<u64>,
}

impl MapResourceManager {
    pub fn new(host: Rc<dyn SurfaceHost>, tiles: TileLayerProvider, settings: AcquireSettings) -> Rc<Self> {
        Rc::new(Self {
            host,
            tiles,
            settings,
            state: RefCell::new(ResourceState::default()),
            constructions: Cell::new(0),
        })
    }

    /// Resolve to the live canvas, creating it on first use.
    ///
    /// Returns immediately with the live handle when there is one; joins the
    /// running acquisition when one is in flight; otherwise starts polling.
    pub fn acquire(self: &Rc<Self>, request: AcquireRequest) -> PendingAcquire {
        let mut state = self.state.borrow_mut();

        if let Some(handle) = state.live.as_ref().filter(|h| h.is_live()) {
            debug!("Reusing live canvas {:?}", handle.borrow().id());
            return future::ready(Ok(handle.clone())).boxed_local();
        }

        if let Some(flight) = &state.in_flight {
            debug!("Joining in-flight acquisition for `{}`", request.container);
            return flight.clone().boxed_local();
        }

        info!("Acquiring map canvas for `{}`", request.container);
        let manager = Rc::clone(self);
        let generation = state.generation;
        let flight = async move { manager.run_acquisition(request, generation).await }
            .boxed_local()
            .shared();
        state.in_flight = Some(flight.clone());
        flight.boxed_local()
    }

    async fn run_acquisition(self: Rc<Self>, request: AcquireRequest, generation: u64) -> AcquireResult {
        let polled = self.wait_for_surface(&request.container).await;

        let mut state = self.state.borrow_mut();
        if state.generation != generation {
            // Released while polling; the slot already belongs to someone else.
            info!("Discarding acquisition for `{}` after release", request.container);
            return Err(MapError::Abandoned);
        }
        state.in_flight = None;

        let size = polled.inspect_err(|e| warn!("{}", e))?;

        let id = CanvasId(self.constructions.get() + 1);
        let mut canvas = MapCanvas::new(id, &request.container, size, request.center, request.zoom)
            .inspect_err(|e| warn!("{}", e))?;
        self.constructions.set(id.0);

        canvas.attach_layer(TileLayerKind::Street, self.tiles.descriptor(TileLayerKind::Street));
        let handle = MapCanvasHandle::new(canvas);
        state.live = Some(handle.clone());

        info!(
            "Map canvas {:?} ready ({}x{} cells)",
            id, size.width, size.height
        );
        Ok(handle)
    }

    /// Poll until the container reports the same non-empty size twice in a
    /// row, or the attempt ceiling is reached
    async fn wait_for_surface(&self, container: &str) -> Result<SurfaceSize, MapError> {
        let mut previous: Option<SurfaceSize> = None;
        let max_attempts = self.settings.max_attempts.max(AcquireSettings::MIN_ATTEMPTS);

        for attempt in 1..=max_attempts {
            match self.host.measure(container) {
                Some(size) if !size.is_empty() => {
                    if previous == Some(size) {
                        debug!("Surface `{}` stable at attempt {}", container, attempt);
                        return Ok(size);
                    }
                    previous = Some(size);
                }
                _ => previous = None,
            }
            trace!(attempt, container, "surface not ready");
            if attempt < max_attempts {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }

        Err(MapError::ResourceUnavailable {
            container: container.to_string(),
            attempts: max_attempts,
        })
    }

    /// Destroy the live canvas and cancel interest in any running
    /// acquisition. Safe to call any number of times.
    pub fn release(&self) {
        let mut state = self.state.borrow_mut();
        state.generation += 1;

        if state.in_flight.take().is_some() {
            info!("Release during acquisition; late result will be discarded");
        }

        match state.live.take() {
            Some(handle) => {
                let id = handle.borrow().id();
                handle.destroy();
                info!("Map canvas {:?} released", id);
            }
            None => debug!("Release with no live canvas"),
        }
    }

    /// Swap the base layer on the live canvas. Never leaves two stacked.
    pub fn set_tile_layer(&self, kind: TileLayerKind) {
        let state = self.state.borrow();
        let Some(handle) = state.live.as_ref() else {
            debug!("No live canvas; tile layer {} not applied", kind.label());
            return;
        };

        let mut canvas = handle.borrow_mut();
        if canvas.layers().len() == 1 && canvas.tile_layer().map(|l| l.kind) == Some(kind) {
            return;
        }
        canvas.detach_layers();
        canvas.attach_layer(kind, self.tiles.descriptor(kind));
        info!("Tile layer switched to {}", kind.label());
    }

    pub fn live(&self) -> Option<MapCanvasHandle> {
        self.state.borrow().live.clone()
    }

    pub fn is_acquiring(&self) -> bool {
        self.state.borrow().in_flight.is_some()
    }

    /// Number of canvases ever constructed by this manager
    pub fn constructions(&self) -> u64 {
        self.constructions.get()
    }

    pub fn tiles(&self) -> &TileLayerProvider {
        &self.tiles
    }
}
