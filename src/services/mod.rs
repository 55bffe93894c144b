//! Collaborators the map session talks to: venue persistence, geocoding and
//! the viewer's position. All calls return boxed local futures that own
//! their state, so callers never hold a borrow across the await.

pub mod geocode;
pub mod geolocation;
pub mod store;
#[cfg(test)]
pub mod testing;

use futures::future::LocalBoxFuture;

use crate::error::MapError;
use crate::geo::Coordinate;
use crate::venue::{NewVenue, Venue, VenueId};

pub use geocode::{Gazetteer, Place};
pub use geolocation::ConfiguredLocation;
pub use store::JsonVenueStore;

pub type ServiceFuture<T> = LocalBoxFuture<'static, Result<T, MapError>>;

/// Venue persistence
pub trait VenueStore {
    fn list_venues(&self) -> ServiceFuture<Vec<Venue>>;

    /// Store a new venue; the store assigns its id
    fn create_venue(&self, venue: NewVenue) -> ServiceFuture<Venue>;

    fn delete_venue(&self, id: &VenueId) -> ServiceFuture<()>;
}

/// A place picked from autocomplete results
#[derive(Clone, Debug, PartialEq)]
pub struct PlaceSelection {
    pub id: String,
    pub label: String,
}

/// Address lookup in both directions. Results are best-effort.
pub trait GeocodeGateway {
    /// Nearest human-readable address, if any
    fn reverse_geocode(&self, at: Coordinate) -> ServiceFuture<Option<String>>;

    fn place_to_coordinate(&self, place: &PlaceSelection) -> ServiceFuture<Coordinate>;

    /// Autocomplete suggestions for a partial query
    fn search(&self, query: &str) -> ServiceFuture<Vec<PlaceSelection>>;
}

/// Source of the viewer's current position
pub trait Geolocation {
    fn current_position(&self) -> ServiceFuture<Coordinate>;
}
