use std::collections::HashMap;

use crate::geo::{fast_distance_km, Coordinate};

/// Spatial hash grid for near-constant-time radius queries.
/// Items are bucketed into square cells measured in degrees.
pub struct SpatialGrid<T> {
    cells: HashMap<(i32, i32), Vec<usize>>,
    items: Vec<(Coordinate, T)>,
    cell_size: f64,
}

impl<T> SpatialGrid<T> {
    /// Create a new spatial grid with given cell size in degrees
    pub fn new(cell_size: f64) -> Self {
        Self {
            cells: HashMap::new(),
            items: Vec::new(),
            cell_size,
        }
    }

    #[inline(always)]
    fn to_cell(&self, at: Coordinate) -> (i32, i32) {
        let x = (at.lng / self.cell_size).floor() as i32;
        let y = (at.lat / self.cell_size).floor() as i32;
        (x, y)
    }

    pub fn insert(&mut self, at: Coordinate, item: T) {
        let idx = self.items.len();
        self.items.push((at, item));
        let cell = self.to_cell(at);
        self.cells.entry(cell).or_default().push(idx);
    }

    /// Indices of items in cells touching the radius (may include items
    /// slightly outside it; callers filter by distance)
    pub fn query_radius(&self, at: Coordinate, radius_degrees: f64) -> Vec<usize> {
        let center = self.to_cell(at);
        let cell_radius = (radius_degrees / self.cell_size).ceil() as i32;

        let mut results = Vec::new();
        for dy in -cell_radius..=cell_radius {
            for dx in -cell_radius..=cell_radius {
                if let Some(indices) = self.cells.get(&(center.0 + dx, center.1 + dy)) {
                    results.extend_from_slice(indices);
                }
            }
        }
        results
    }

    /// Closest item within `max_km`, with its distance
    pub fn nearest(&self, at: Coordinate, max_km: f64) -> Option<(&T, f64)> {
        // One degree of latitude is ~111km; longitude cells shrink toward the
        // poles, so widen the search by the latitude factor.
        let cos_lat = at.lat.to_radians().cos().max(0.1);
        let radius_degrees = max_km / (111.0 * cos_lat);

        self.query_radius(at, radius_degrees)
            .into_iter()
            .filter_map(|idx| self.items.get(idx))
            .map(|(pos, item)| (item, fast_distance_km(at, *pos)))
            .filter(|(_, km)| *km <= max_km)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Coordinate, &T)> + '_ {
        self.items.iter().map(|(pos, item)| (*pos, item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialGrid<&'static str> {
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(Coordinate::new(30.2672, -97.7431), "Austin");
        grid.insert(Coordinate::new(29.4241, -98.4936), "San Antonio");
        grid.insert(Coordinate::new(32.7767, -96.7970), "Dallas");
        grid
    }

    #[test]
    fn test_nearest_within_radius() {
        let grid = grid();
        let (name, km) = grid.nearest(Coordinate::new(30.25, -97.75), 50.0).unwrap();
        assert_eq!(*name, "Austin");
        assert!(km < 5.0);
    }

    #[test]
    fn test_nearest_outside_radius() {
        let grid = grid();
        assert!(grid.nearest(Coordinate::new(40.0, -75.0), 50.0).is_none());
    }

    #[test]
    fn test_query_radius_crosses_cells() {
        let grid = grid();
        let hits = grid.query_radius(Coordinate::new(30.0, -98.0), 1.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(grid.len(), 3);
    }
}
