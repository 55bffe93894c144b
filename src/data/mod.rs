//! Natural Earth GeoJSON loading for the basemap and the offline gazetteer.

use anyhow::{Context, Result};
use geojson::{GeoJson, Geometry, Value};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::geo::Coordinate;
use crate::map::renderer::{LabelPlace, LineLayer, LineString, Lod, MapRenderer};
use crate::services::Place;

const LINE_FILES: [(&str, LineLayer); 7] = [
    ("ne_110m_coastline.json", LineLayer::Coastline(Lod::Low)),
    ("ne_50m_coastline.json", LineLayer::Coastline(Lod::Medium)),
    ("ne_10m_coastline.json", LineLayer::Coastline(Lod::High)),
    ("ne_50m_borders.json", LineLayer::Border),
    ("ne_10m_borders.json", LineLayer::Border),
    ("ne_10m_states.json", LineLayer::State),
    ("ne_10m_roads.json", LineLayer::Road),
];

const PLACES_FILE: &str = "ne_10m_cities.json";

/// Everything read from the geodata directory
pub struct GeoData {
    pub renderer: MapRenderer,
    /// Populated places for search and reverse lookup
    pub places: Vec<Place>,
}

/// Load every available data file in `data_dir`. Missing or broken files are
/// skipped; with no coastlines at all a graticule is drawn instead.
pub fn load(data_dir: &Path) -> GeoData {
    let loaded: Vec<(LineLayer, Vec<LineString>)> = LINE_FILES
        .par_iter()
        .filter_map(|&(filename, layer)| {
            let path = data_dir.join(filename);
            if !path.exists() {
                debug!("{} not present", filename);
                return None;
            }
            match read_lines(&path) {
                Ok(lines) => Some((layer, lines)),
                Err(e) => {
                    warn!("Failed to load {}: {:#}", filename, e);
                    None
                }
            }
        })
        .collect();

    let mut renderer = MapRenderer::new();
    for (layer, lines) in loaded {
        for line in lines {
            renderer.add_line(layer, line);
        }
    }
    if !renderer.has_data() {
        info!("No coastline data in {:?}, drawing a graticule", data_dir);
        add_graticule(&mut renderer);
    }

    let places_path = data_dir.join(PLACES_FILE);
    let places = if places_path.exists() {
        match read_places(&places_path) {
            Ok(places) if !places.is_empty() => places,
            Ok(_) => fallback_places(),
            Err(e) => {
                warn!("Failed to load {}: {:#}", PLACES_FILE, e);
                fallback_places()
            }
        }
    } else {
        fallback_places()
    };

    for place in &places {
        renderer.add_place(LabelPlace {
            coordinate: place.coordinate,
            name: place.name.clone(),
            population: place.population,
        });
    }

    info!(
        "Geodata ready: {} lines, {} places",
        renderer.line_count(),
        places.len()
    );
    GeoData { renderer, places }
}

fn read_lines(path: &Path) -> Result<Vec<LineString>> {
    let mut bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    parse_lines(&mut bytes)
}

fn read_places(path: &Path) -> Result<Vec<Place>> {
    let mut bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    parse_places(&mut bytes)
}

fn parse_geojson(bytes: &mut [u8]) -> Result<GeoJson> {
    simd_json::serde::from_slice::<GeoJson>(bytes).context("parse GeoJSON")
}

/// Every line and polygon exterior ring in a GeoJSON document
pub fn parse_lines(bytes: &mut [u8]) -> Result<Vec<LineString>> {
    let mut lines = Vec::new();
    match parse_geojson(bytes)? {
        GeoJson::FeatureCollection(fc) => {
            for feature in &fc.features {
                if let Some(geometry) = &feature.geometry {
                    collect_lines(geometry, &mut lines);
                }
            }
        }
        GeoJson::Feature(f) => {
            if let Some(geometry) = &f.geometry {
                collect_lines(geometry, &mut lines);
            }
        }
        GeoJson::Geometry(geometry) => collect_lines(&geometry, &mut lines),
    }
    Ok(lines)
}

fn to_line(positions: &[Vec<f64>]) -> LineString {
    positions
        .iter()
        .filter(|c| c.len() >= 2)
        .map(|c| Coordinate::new(c[1], c[0]))
        .collect()
}

fn collect_lines(geometry: &Geometry, out: &mut Vec<LineString>) {
    match &geometry.value {
        Value::LineString(coords) => out.push(to_line(coords)),
        Value::MultiLineString(lines) => out.extend(lines.iter().map(|l| to_line(l))),
        Value::Polygon(rings) => out.extend(rings.first().map(|r| to_line(r))),
        Value::MultiPolygon(polygons) => {
            out.extend(polygons.iter().filter_map(|rings| rings.first()).map(|r| to_line(r)))
        }
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                collect_lines(g, out);
            }
        }
        Value::Point(_) | Value::MultiPoint(_) => {}
    }
}

/// Named point features with their region and population
pub fn parse_places(bytes: &mut [u8]) -> Result<Vec<Place>> {
    let GeoJson::FeatureCollection(fc) = parse_geojson(bytes)? else {
        return Ok(Vec::new());
    };

    let places = fc
        .features
        .into_iter()
        .filter_map(|feature| {
            let props = feature.properties.as_ref();
            let text = |key: &str| {
                props
                    .and_then(|p| p.get(key))
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };

            let name = text("name")?;
            let region = text("adm1name").or_else(|| text("adm0name"));
            let population = props
                .and_then(|p| {
                    p.get("pop_max")
                        .or_else(|| p.get("pop_min"))
                        .or_else(|| p.get("population"))
                })
                .and_then(|v| v.as_f64())
                .map(|v| v.max(0.0) as u64)
                .unwrap_or(0);

            let Value::Point(coords) = &feature.geometry.as_ref()?.value else {
                return None;
            };
            if coords.len() < 2 {
                return None;
            }
            let coordinate = Coordinate::checked(coords[1], coords[0]).ok()?;

            Some(Place {
                name,
                region,
                coordinate,
                population,
            })
        })
        .collect();
    Ok(places)
}

/// Meridians and parallels every 30 degrees
fn add_graticule(renderer: &mut MapRenderer) {
    for lng in (-180..=180).step_by(30) {
        let line = (-80..=80)
            .step_by(5)
            .map(|lat| Coordinate::new(lat as f64, lng as f64))
            .collect();
        renderer.add_line(LineLayer::Coastline(Lod::Low), line);
    }
    for lat in (-60..=60).step_by(30) {
        let line = (-180..=180)
            .step_by(5)
            .map(|lng| Coordinate::new(lat as f64, lng as f64))
            .collect();
        renderer.add_line(LineLayer::Coastline(Lod::Low), line);
    }
}

/// Places known without any data files
fn fallback_places() -> Vec<Place> {
    const PLACES: [(&str, &str, f64, f64, u64); 16] = [
        ("Austin", "Texas", 30.2672, -97.7431, 2_283_371),
        ("Houston", "Texas", 29.7604, -95.3698, 7_122_240),
        ("Dallas", "Texas", 32.7767, -96.7970, 7_637_387),
        ("San Antonio", "Texas", 29.4241, -98.4936, 2_558_143),
        ("New York", "New York", 40.7128, -74.0060, 18_800_000),
        ("Los Angeles", "California", 34.0522, -118.2437, 12_400_000),
        ("San Francisco", "California", 37.7749, -122.4194, 3_300_000),
        ("Chicago", "Illinois", 41.8781, -87.6298, 8_900_000),
        ("Seattle", "Washington", 47.6062, -122.3321, 3_500_000),
        ("Denver", "Colorado", 39.7392, -104.9903, 2_900_000),
        ("Atlanta", "Georgia", 33.7490, -84.3880, 5_400_000),
        ("Miami", "Florida", 25.7617, -80.1918, 6_100_000),
        ("Boston", "Massachusetts", 42.3601, -71.0589, 4_900_000),
        ("Washington", "District of Columbia", 38.9072, -77.0369, 5_300_000),
        ("London", "England", 51.5074, -0.1278, 9_000_000),
        ("Toronto", "Ontario", 43.6532, -79.3832, 6_200_000),
    ];

    PLACES
        .iter()
        .map(|&(name, region, lat, lng, population)| Place {
            name: name.to_string(),
            region: Some(region.to_string()),
            coordinate: Coordinate::new(lat, lng),
            population,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COASTLINE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "properties": {},
              "geometry": { "type": "LineString", "coordinates": [[-97.8, 30.2], [-97.7, 30.3]] } },
            { "type": "Feature", "properties": {},
              "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]], [[0.2, 0.2], [0.3, 0.3], [0.2, 0.2]]] } }
        ]
    }"#;

    const CITIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "properties": { "name": "Austin", "adm1name": "Texas", "pop_max": 2283371 },
              "geometry": { "type": "Point", "coordinates": [-97.7431, 30.2672] } },
            { "type": "Feature", "properties": { "name": "", "pop_max": 5 },
              "geometry": { "type": "Point", "coordinates": [0, 0] } },
            { "type": "Feature", "properties": { "name": "Nowhere" },
              "geometry": { "type": "Point", "coordinates": [500, 0] } }
        ]
    }"#;

    #[test]
    fn test_lines_swap_to_lat_lng_and_skip_holes() {
        let mut bytes = COASTLINE.as_bytes().to_vec();
        let lines = parse_lines(&mut bytes).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0][0], Coordinate::new(30.2, -97.8));
        assert_eq!(lines[1].len(), 4);
    }

    #[test]
    fn test_places_need_name_and_valid_point() {
        let mut bytes = CITIES.as_bytes().to_vec();
        let places = parse_places(&mut bytes).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].label(), "Austin, Texas");
        assert_eq!(places[0].population, 2_283_371);
        assert_eq!(places[0].coordinate, Coordinate::new(30.2672, -97.7431));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut bytes = b"{ not json".to_vec();
        assert!(parse_lines(&mut bytes).is_err());
    }

    #[test]
    fn test_empty_dir_uses_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let data = load(dir.path());
        assert!(data.renderer.has_data());
        assert!(data.places.iter().any(|p| p.name == "Austin"));
    }

    #[test]
    fn test_load_reads_files_and_skips_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ne_10m_coastline.json"), COASTLINE).unwrap();
        fs::write(dir.path().join("ne_10m_states.json"), "garbage").unwrap();
        fs::write(dir.path().join(PLACES_FILE), CITIES).unwrap();

        let data = load(dir.path());
        assert_eq!(data.renderer.line_count(), 2);
        assert_eq!(data.places.len(), 1);
    }
}
