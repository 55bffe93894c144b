//! "Drop a pin to add a venue" interaction.
//!
//! ```text
//! Inactive --on--> AwaitingClick --click--> Previewing --complete|cancel--> Inactive
//!                  AwaitingClick --off----> Inactive
//!                                           Previewing --off|teardown--> Inactive
//! ```
//!
//! While previewing there is exactly one draggable preview marker. Reverse
//! lookups run as local tasks and write into the pending location only if it
//! still points at the coordinate they were issued for.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, info};

use crate::error::MapError;
use crate::geo::Coordinate;
use crate::map::canvas::{CanvasEvent, CanvasEventKind, Cursor, ListenerId, MapCanvas, MarkerHandle, MarkerIcon};
use crate::services::GeocodeGateway;
use crate::venue::{NewVenue, VenueDetails};

/// Where the new venue will go
#[derive(Clone, Debug, PartialEq)]
pub struct PendingLocation {
    pub coordinate: Coordinate,
    /// Filled in by the reverse lookup when it succeeds
    pub address: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinDropMode {
    Inactive,
    AwaitingClick,
    Previewing,
}

enum PinDropState {
    Inactive,
    AwaitingClick {
        listener: ListenerId,
    },
    Previewing {
        marker: MarkerHandle,
        drag_listener: ListenerId,
        pending: Rc<RefCell<PendingLocation>>,
    },
}

pub struct PinDropController {
    state: PinDropState,
    geocoder: Rc<dyn GeocodeGateway>,
    lookups_issued: u64,
}

impl PinDropController {
    pub fn new(geocoder: Rc<dyn GeocodeGateway>) -> Self {
        Self {
            state: PinDropState::Inactive,
            geocoder,
            lookups_issued: 0,
        }
    }

    pub fn mode(&self) -> PinDropMode {
        match self.state {
            PinDropState::Inactive => PinDropMode::Inactive,
            PinDropState::AwaitingClick { .. } => PinDropMode::AwaitingClick,
            PinDropState::Previewing { .. } => PinDropMode::Previewing,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, PinDropState::Inactive)
    }

    pub fn pending(&self) -> Option<PendingLocation> {
        match &self.state {
            PinDropState::Previewing { pending, .. } => Some(pending.borrow().clone()),
            _ => None,
        }
    }

    pub fn preview_marker(&self) -> Option<MarkerHandle> {
        match self.state {
            PinDropState::Previewing { marker, .. } => Some(marker),
            _ => None,
        }
    }

    pub fn lookups_issued(&self) -> u64 {
        self.lookups_issued
    }

    /// Turn the mode on or off. Turning it on twice never stacks listeners;
    /// turning it off removes any preview.
    pub fn set_mode(&mut self, canvas: &mut MapCanvas, on: bool) {
        match (&self.state, on) {
            (PinDropState::Inactive, true) => {
                canvas.set_cursor(Cursor::Crosshair);
                let listener = canvas.once(CanvasEventKind::Click);
                self.state = PinDropState::AwaitingClick { listener };
                debug!("Pin drop armed");
            }
            (_, false) => self.clear(canvas),
            _ => {}
        }
    }

    /// Route a dispatched canvas event. Returns true if it was ours.
    pub fn on_event(&mut self, canvas: &mut MapCanvas, event: &CanvasEvent, fired: &[ListenerId]) -> bool {
        match (&self.state, *event) {
            (PinDropState::AwaitingClick { listener }, CanvasEvent::Click(at)) if fired.contains(listener) => {
                self.place_preview(canvas, at, None);
                true
            }
            (PinDropState::Previewing { marker, drag_listener, .. }, CanvasEvent::DragEnd { marker: moved, to })
                if *marker == moved && fired.contains(drag_listener) =>
            {
                self.move_preview(to);
                true
            }
            // Intermediate frames only move the marker, which the canvas already did
            (PinDropState::Previewing { marker, .. }, CanvasEvent::Drag { marker: moved, .. }) => *marker == moved,
            _ => false,
        }
    }

    /// Place or move the preview at a known address (no lookup)
    pub fn place_at(&mut self, canvas: &mut MapCanvas, at: Coordinate, address: Option<String>) {
        match &self.state {
            PinDropState::Previewing { marker, pending, .. } => {
                canvas.set_marker_position(*marker, at);
                *pending.borrow_mut() = PendingLocation {
                    coordinate: at,
                    address,
                };
            }
            PinDropState::AwaitingClick { listener } => {
                canvas.off(*listener);
                self.start_preview(canvas, at, address);
            }
            PinDropState::Inactive => self.start_preview(canvas, at, address),
        }
    }

    fn place_preview(&mut self, canvas: &mut MapCanvas, at: Coordinate, address: Option<String>) {
        self.start_preview(canvas, at, address);
        if let PinDropState::Previewing { pending, .. } = &self.state {
            let pending = Rc::clone(pending);
            self.spawn_lookup(&pending, at);
        }
    }

    fn start_preview(&mut self, canvas: &mut MapCanvas, at: Coordinate, address: Option<String>) {
        canvas.set_cursor(Cursor::Grab);
        let marker = canvas.add_marker(at, MarkerIcon::Preview, true);
        let drag_listener = canvas.on(CanvasEventKind::DragEnd);
        self.state = PinDropState::Previewing {
            marker,
            drag_listener,
            pending: Rc::new(RefCell::new(PendingLocation {
                coordinate: at,
                address,
            })),
        };
        info!(lat = at.lat, lng = at.lng, "Preview pin placed");
    }

    fn move_preview(&mut self, to: Coordinate) {
        let PinDropState::Previewing { pending, .. } = &self.state else {
            return;
        };
        let pending = Rc::clone(pending);
        *pending.borrow_mut() = PendingLocation {
            coordinate: to,
            address: None,
        };
        self.spawn_lookup(&pending, to);
    }

    fn spawn_lookup(&mut self, pending: &Rc<RefCell<PendingLocation>>, at: Coordinate) {
        self.lookups_issued += 1;
        let lookup = self.geocoder.reverse_geocode(at);
        let target: Weak<RefCell<PendingLocation>> = Rc::downgrade(pending);

        tokio::task::spawn_local(async move {
            let result = lookup.await;
            let Some(pending) = target.upgrade() else {
                debug!("Lookup finished after the preview was removed");
                return;
            };
            let mut pending = pending.borrow_mut();
            if pending.coordinate != at {
                debug!("Discarding superseded lookup");
                return;
            }
            match result {
                Ok(address) => pending.address = address,
                Err(e) => debug!(error = %e, "Reverse lookup failed"),
            }
        });
    }

    /// Combine the pending location with what the user filled in
    pub fn draft(&self, details: VenueDetails, viewer: Option<&str>) -> Result<NewVenue, MapError> {
        let pending = self.pending().ok_or(MapError::NoPendingPin)?;
        Ok(NewVenue {
            details,
            coordinate: pending.coordinate,
            address: pending.address.unwrap_or_default(),
            created_by: viewer.map(str::to_string),
        })
    }

    /// The venue was stored; drop the preview and leave the mode
    pub fn complete(&mut self, canvas: &mut MapCanvas) {
        self.clear(canvas);
    }

    pub fn cancel(&mut self, canvas: &mut MapCanvas) {
        if self.is_active() {
            debug!("Pin drop cancelled");
        }
        self.clear(canvas);
    }

    /// Detach everything before the canvas goes away
    pub fn teardown(&mut self, canvas: &mut MapCanvas) {
        self.clear(canvas);
    }

    /// Forget state without touching a canvas that no longer exists
    pub fn forget(&mut self) {
        self.state = PinDropState::Inactive;
    }

    fn clear(&mut self, canvas: &mut MapCanvas) {
        match std::mem::replace(&mut self.state, PinDropState::Inactive) {
            PinDropState::Inactive => return,
            PinDropState::AwaitingClick { listener } => {
                canvas.off(listener);
            }
            PinDropState::Previewing {
                marker, drag_listener, ..
            } => {
                canvas.remove_marker(marker);
                canvas.off(drag_listener);
            }
        }
        canvas.set_cursor(Cursor::Grab);
    }
}
