//! In-memory collaborators for tests.

use futures::future::{self, FutureExt};
use std::cell::{Cell, RefCell};
use std::time::Duration;

use super::{GeocodeGateway, Geolocation, PlaceSelection, ServiceFuture, VenueStore};
use crate::error::MapError;
use crate::geo::Coordinate;
use crate::venue::{NewVenue, Venue, VenueId};

/// Store that keeps venues in memory and can be told to fail
#[derive(Default)]
pub struct FakeStore {
    pub venues: RefCell<Vec<Venue>>,
    pub fail: Cell<bool>,
    pub creates: Cell<usize>,
    next_id: Cell<u64>,
}

impl FakeStore {
    pub fn with_venues(venues: Vec<Venue>) -> Self {
        Self {
            venues: RefCell::new(venues),
            ..Self::default()
        }
    }

    fn failure(&self) -> Option<MapError> {
        self.fail
            .get()
            .then(|| MapError::PersistenceFailed("store offline".to_string()))
    }
}

impl VenueStore for FakeStore {
    fn list_venues(&self) -> ServiceFuture<Vec<Venue>> {
        let result = match self.failure() {
            Some(e) => Err(e),
            None => Ok(self.venues.borrow().clone()),
        };
        future::ready(result).boxed_local()
    }

    fn create_venue(&self, venue: NewVenue) -> ServiceFuture<Venue> {
        self.creates.set(self.creates.get() + 1);
        let result = match self.failure() {
            Some(e) => Err(e),
            None => {
                let id = self.next_id.get() + 1;
                self.next_id.set(id);
                let venue = venue.into_venue(VenueId(format!("new-{id}")));
                self.venues.borrow_mut().push(venue.clone());
                Ok(venue)
            }
        };
        future::ready(result).boxed_local()
    }

    fn delete_venue(&self, id: &VenueId) -> ServiceFuture<()> {
        let result = match self.failure() {
            Some(e) => Err(e),
            None => {
                self.venues.borrow_mut().retain(|v| &v.id != id);
                Ok(())
            }
        };
        future::ready(result).boxed_local()
    }
}

/// Geocoder that records every reverse lookup and answers with the
/// coordinate as text, optionally after a delay
#[derive(Default)]
pub struct CountingGeocoder {
    pub lookups: RefCell<Vec<Coordinate>>,
    pub delay: Cell<Option<Duration>>,
    pub fail: Cell<bool>,
}

impl CountingGeocoder {
    pub fn address_for(at: Coordinate) -> String {
        format!("{:.4}, {:.4}", at.lat, at.lng)
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.borrow().len()
    }
}

impl GeocodeGateway for CountingGeocoder {
    fn reverse_geocode(&self, at: Coordinate) -> ServiceFuture<Option<String>> {
        self.lookups.borrow_mut().push(at);
        let delay = self.delay.get();
        let fail = self.fail.get();
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                Err(MapError::LookupFailed("geocoder offline".to_string()))
            } else {
                Ok(Some(CountingGeocoder::address_for(at)))
            }
        }
        .boxed_local()
    }

    fn place_to_coordinate(&self, place: &PlaceSelection) -> ServiceFuture<Coordinate> {
        let result = place
            .id
            .split_once(',')
            .and_then(|(lat, lng)| Some(Coordinate::new(lat.parse().ok()?, lng.parse().ok()?)))
            .ok_or_else(|| MapError::LookupFailed(format!("unknown place {}", place.label)));
        future::ready(result).boxed_local()
    }

    fn search(&self, _query: &str) -> ServiceFuture<Vec<PlaceSelection>> {
        future::ready(Ok(Vec::new())).boxed_local()
    }
}

pub struct FixedGeolocation(pub Result<Coordinate, MapError>);

impl Geolocation for FixedGeolocation {
    fn current_position(&self) -> ServiceFuture<Coordinate> {
        future::ready(self.0.clone()).boxed_local()
    }
}
