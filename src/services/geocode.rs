use futures::future::{self, FutureExt};
use std::rc::Rc;

use super::{GeocodeGateway, PlaceSelection, ServiceFuture};
use crate::error::MapError;
use crate::geo::Coordinate;
use crate::map::spatial::SpatialGrid;

/// Lookups farther than this from any known place have no address
const REVERSE_RADIUS_KM: f64 = 40.0;
/// Closer than this, the address is the place itself rather than "near" it
const AT_PLACE_KM: f64 = 1.5;
const MAX_SUGGESTIONS: usize = 8;

/// A named populated place
#[derive(Clone, Debug, PartialEq)]
pub struct Place {
    pub name: String,
    /// State, province or country, when known
    pub region: Option<String>,
    pub coordinate: Coordinate,
    pub population: u64,
}

impl Place {
    pub fn label(&self) -> String {
        match &self.region {
            Some(region) => format!("{}, {}", self.name, region),
            None => self.name.clone(),
        }
    }
}

/// Offline geocoder over a list of named places
#[derive(Clone)]
pub struct Gazetteer {
    index: Rc<GazetteerIndex>,
}

struct GazetteerIndex {
    places: Vec<Place>,
    /// Grid items are indices into `places`
    grid: SpatialGrid<usize>,
    /// Lowercased names, parallel to `places`
    names: Vec<String>,
}

impl Gazetteer {
    pub fn new(places: Vec<Place>) -> Self {
        let mut grid = SpatialGrid::new(0.5);
        for (idx, place) in places.iter().enumerate() {
            grid.insert(place.coordinate, idx);
        }
        let names = places.iter().map(|p| p.name.to_lowercase()).collect();
        Self {
            index: Rc::new(GazetteerIndex { places, grid, names }),
        }
    }

    pub fn len(&self) -> usize {
        self.index.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.places.is_empty()
    }

    /// Address text for a coordinate, or `None` in the middle of nowhere
    pub fn address_at(&self, at: Coordinate) -> Option<String> {
        let (&idx, km) = self.index.grid.nearest(at, REVERSE_RADIUS_KM)?;
        let place = self.index.places.get(idx)?;
        if km <= AT_PLACE_KM {
            Some(place.label())
        } else {
            Some(format!("near {}", place.label()))
        }
    }

    /// Places whose name starts with the query, then those containing it.
    /// Larger places first within each group.
    pub fn suggestions(&self, query: &str) -> Vec<PlaceSelection> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<(bool, u64, usize)> = self
            .index
            .names
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| {
                let prefix = name.starts_with(&query);
                (prefix || name.contains(&query))
                    .then(|| (!prefix, self.index.places[idx].population, idx))
            })
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        matches
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, _, idx)| PlaceSelection {
                id: idx.to_string(),
                label: self.index.places[idx].label(),
            })
            .collect()
    }

    pub fn resolve(&self, selection: &PlaceSelection) -> Result<Coordinate, MapError> {
        selection
            .id
            .parse::<usize>()
            .ok()
            .and_then(|idx| self.index.places.get(idx))
            .map(|place| place.coordinate)
            .ok_or_else(|| MapError::LookupFailed(format!("unknown place {}", selection.label)))
    }
}

impl GeocodeGateway for Gazetteer {
    fn reverse_geocode(&self, at: Coordinate) -> ServiceFuture<Option<String>> {
        let result = if at.is_valid() {
            Ok(self.address_at(at))
        } else {
            Err(MapError::InvalidCoordinate {
                lat: at.lat,
                lng: at.lng,
            })
        };
        future::ready(result).boxed_local()
    }

    fn place_to_coordinate(&self, place: &PlaceSelection) -> ServiceFuture<Coordinate> {
        future::ready(self.resolve(place)).boxed_local()
    }

    fn search(&self, query: &str) -> ServiceFuture<Vec<PlaceSelection>> {
        future::ready(Ok(self.suggestions(query))).boxed_local()
    }
}
