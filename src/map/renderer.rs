//! Vector basemap drawn under the venue markers.
//!
//! Tile descriptors only name where imagery would come from; in the terminal
//! the base layer is this braille line drawing, styled per layer kind.

use crate::braille::BrailleCanvas;
use crate::geo::Coordinate;
use crate::map::geometry::{draw_circle, draw_dotted_line, draw_line};
use crate::map::projection::Viewport;
use crate::map::tiles::TileLayerKind;

pub type LineString = Vec<Coordinate>;

/// Level of detail for coastline data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lod {
    Low,    // 110m - world view
    Medium, // 50m - continental
    High,   // 10m - regional
}

impl Lod {
    pub fn from_zoom(zoom: f64) -> Self {
        if zoom < 4.0 {
            Lod::Low
        } else if zoom < 8.0 {
            Lod::Medium
        } else {
            Lod::High
        }
    }

    fn index(self) -> usize {
        match self {
            Lod::Low => 0,
            Lod::Medium => 1,
            Lod::High => 2,
        }
    }
}

/// Which basemap layer a loaded line belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineLayer {
    Coastline(Lod),
    Border,
    State,
    Road,
}

/// A labelled populated place
#[derive(Clone, Debug, PartialEq)]
pub struct LabelPlace {
    pub coordinate: Coordinate,
    pub name: String,
    pub population: u64,
}

/// Rendered layers, back to front
pub struct MapLayers {
    pub land: BrailleCanvas,
    pub boundaries: BrailleCanvas,
    /// Roads for the street layer, a coordinate grid for satellite
    pub detail: BrailleCanvas,
    /// (column, row, text) in character cells
    pub labels: Vec<(u16, u16, String)>,
}

#[derive(Default)]
pub struct MapRenderer {
    coastlines: [Vec<LineString>; 3],
    borders: Vec<LineString>,
    states: Vec<LineString>,
    roads: Vec<LineString>,
    places: Vec<LabelPlace>,
}

impl MapRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_line(&mut self, layer: LineLayer, line: LineString) {
        if line.len() < 2 {
            return;
        }
        match layer {
            LineLayer::Coastline(lod) => self.coastlines[lod.index()].push(line),
            LineLayer::Border => self.borders.push(line),
            LineLayer::State => self.states.push(line),
            LineLayer::Road => self.roads.push(line),
        }
    }

    pub fn add_place(&mut self, place: LabelPlace) {
        self.places.push(place);
    }

    pub fn has_data(&self) -> bool {
        self.coastlines.iter().any(|c| !c.is_empty())
    }

    pub fn line_count(&self) -> usize {
        self.coastlines.iter().map(Vec::len).sum::<usize>()
            + self.borders.len()
            + self.states.len()
            + self.roads.len()
    }

    /// Most detailed coastlines available at or below the wanted LOD
    fn coastlines(&self, lod: Lod) -> &[LineString] {
        (0..=lod.index())
            .rev()
            .map(|i| &self.coastlines[i])
            .find(|lines| !lines.is_empty())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn min_label_population(zoom: f64) -> u64 {
        if zoom > 12.0 {
            0
        } else if zoom > 9.0 {
            50_000
        } else if zoom > 6.0 {
            250_000
        } else if zoom > 4.0 {
            1_000_000
        } else {
            5_000_000
        }
    }

    /// Draw the basemap for a `cols` x `rows` cell area
    pub fn render(&self, cols: usize, rows: usize, viewport: &Viewport, kind: TileLayerKind) -> MapLayers {
        let lod = Lod::from_zoom(viewport.zoom);

        let (land, (boundaries, detail)) = rayon::join(
            || {
                let mut canvas = BrailleCanvas::new(cols, rows);
                for line in self.coastlines(lod) {
                    draw_linestring(&mut canvas, line, viewport);
                }
                canvas
            },
            || {
                rayon::join(
                    || {
                        let mut canvas = BrailleCanvas::new(cols, rows);
                        for line in &self.borders {
                            draw_linestring(&mut canvas, line, viewport);
                        }
                        if viewport.zoom >= 4.0 {
                            for line in &self.states {
                                draw_linestring(&mut canvas, line, viewport);
                            }
                        }
                        canvas
                    },
                    || {
                        let mut canvas = BrailleCanvas::new(cols, rows);
                        match kind {
                            TileLayerKind::Street if viewport.zoom >= 9.0 => {
                                for line in &self.roads {
                                    draw_linestring(&mut canvas, line, viewport);
                                }
                            }
                            TileLayerKind::Street => {}
                            TileLayerKind::Satellite => draw_grid(&mut canvas, viewport),
                        }
                        canvas
                    },
                )
            },
        );

        let mut labels = Vec::new();
        let mut land = land;
        if viewport.zoom > 3.0 {
            let min_pop = Self::min_label_population(viewport.zoom);
            for place in self.places.iter().filter(|p| p.population >= min_pop) {
                let (px, py) = viewport.project(place.coordinate);
                if !viewport.is_visible(px, py) {
                    continue;
                }
                draw_circle(&mut land, px, py, 1);
                let (col, row) = ((px / 2) as u16, (py / 4) as u16);
                if let Some(label_col) = col.checked_add(2) {
                    labels.push((label_col, row, place.name.clone()));
                }
            }
        }

        MapLayers {
            land,
            boundaries,
            detail,
            labels,
        }
    }
}

/// Draw a linestring with viewport culling
fn draw_linestring(canvas: &mut BrailleCanvas, line: &[Coordinate], viewport: &Viewport) {
    let mut prev: Option<(i32, i32)> = None;

    for &point in line {
        let (px, py) = viewport.project(point);

        if let Some((prev_x, prev_y)) = prev {
            // Segments jumping across the antimeridian span the whole view
            let dist = ((px - prev_x).abs() + (py - prev_y).abs()) as usize;
            if dist < viewport.width && viewport.line_might_be_visible((prev_x, prev_y), (px, py)) {
                draw_line(canvas, prev_x, prev_y, px, py);
            }
        }

        prev = Some((px, py));
    }
}

/// Graticule spacing in degrees for a zoom level
fn grid_step(zoom: f64) -> f64 {
    match zoom {
        z if z < 3.0 => 30.0,
        z if z < 5.0 => 10.0,
        z if z < 7.0 => 5.0,
        z if z < 9.0 => 1.0,
        z if z < 12.0 => 0.25,
        _ => 0.05,
    }
}

/// Dotted latitude/longitude grid over the visible area
fn draw_grid(canvas: &mut BrailleCanvas, viewport: &Viewport) {
    let step = grid_step(viewport.zoom);
    let w = viewport.width as i32;
    let h = viewport.height as i32;
    let top_left = viewport.unproject(0, 0);
    let bottom_right = viewport.unproject(w, h);

    let mut lng = (top_left.lng / step).floor() * step;
    while lng <= bottom_right.lng {
        let (x, _) = viewport.project(Coordinate::new(viewport.center.lat, lng));
        draw_dotted_line(canvas, x, 0, x, h, 3);
        lng += step;
    }

    let mut lat = (bottom_right.lat / step).floor() * step;
    while lat <= top_left.lat {
        let (_, y) = viewport.project(Coordinate::new(lat, viewport.center.lng));
        draw_dotted_line(canvas, 0, y, w, y, 3);
        lat += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(zoom: f64) -> Viewport {
        Viewport::new(Coordinate::new(30.2672, -97.7431), zoom, 160, 96)
    }

    fn line(points: &[(f64, f64)]) -> LineString {
        points.iter().map(|&(lat, lng)| Coordinate::new(lat, lng)).collect()
    }

    #[test]
    fn test_lod_fallback_to_coarser_data() {
        let mut renderer = MapRenderer::new();
        renderer.add_line(LineLayer::Coastline(Lod::Low), line(&[(0.0, 0.0), (1.0, 1.0)]));
        assert_eq!(renderer.coastlines(Lod::High).len(), 1);

        renderer.add_line(
            LineLayer::Coastline(Lod::Medium),
            line(&[(0.0, 0.0), (1.0, 1.0)]),
        );
        renderer.add_line(
            LineLayer::Coastline(Lod::Medium),
            line(&[(2.0, 2.0), (3.0, 3.0)]),
        );
        assert_eq!(renderer.coastlines(Lod::High).len(), 2);
        assert_eq!(renderer.coastlines(Lod::Low).len(), 1);
    }

    #[test]
    fn test_degenerate_lines_are_dropped() {
        let mut renderer = MapRenderer::new();
        renderer.add_line(LineLayer::Road, line(&[(0.0, 0.0)]));
        assert_eq!(renderer.line_count(), 0);
        assert!(!renderer.has_data());
    }

    #[test]
    fn test_visible_line_is_drawn() {
        let mut renderer = MapRenderer::new();
        renderer.add_line(
            LineLayer::Coastline(Lod::High),
            line(&[(30.2, -97.8), (30.3, -97.7)]),
        );
        let layers = renderer.render(80, 24, &viewport(10.0), TileLayerKind::Street);
        assert!(layers.land.filled_cells() > 0);
        assert_eq!(layers.boundaries.filled_cells(), 0);
    }

    #[test]
    fn test_satellite_draws_grid_street_does_not() {
        let renderer = MapRenderer::new();
        let street = renderer.render(80, 24, &viewport(10.0), TileLayerKind::Street);
        let satellite = renderer.render(80, 24, &viewport(10.0), TileLayerKind::Satellite);
        assert_eq!(street.detail.filled_cells(), 0);
        assert!(satellite.detail.filled_cells() > 0);
    }

    #[test]
    fn test_labels_respect_population_threshold() {
        let mut renderer = MapRenderer::new();
        renderer.add_place(LabelPlace {
            coordinate: Coordinate::new(30.2672, -97.7431),
            name: "Austin".to_string(),
            population: 961_855,
        });
        renderer.add_place(LabelPlace {
            coordinate: Coordinate::new(30.268, -97.744),
            name: "Hamlet".to_string(),
            population: 300,
        });

        let layers = renderer.render(80, 24, &viewport(8.0), TileLayerKind::Street);
        let names: Vec<&str> = layers.labels.iter().map(|(_, _, n)| n.as_str()).collect();
        assert_eq!(names, vec!["Austin"]);

        let layers = renderer.render(80, 24, &viewport(14.0), TileLayerKind::Street);
        assert_eq!(layers.labels.len(), 2);
    }
}
