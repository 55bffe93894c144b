use glam::DVec2;
use std::f64::consts::PI;

use crate::geo::{Coordinate, MAX_MERCATOR_LAT};

/// Width of the whole world at zoom 0, in braille pixels
pub const TILE_SIZE: f64 = 256.0;

pub const MIN_ZOOM: f64 = 1.0;

/// Viewport representing the visible map area and slippy-map zoom level
#[derive(Clone, Debug, PartialEq)]
pub struct Viewport {
    pub center: Coordinate,
    /// Zoom level (each level doubles the scale)
    pub zoom: f64,
    /// Canvas pixel width
    pub width: usize,
    /// Canvas pixel height
    pub height: usize,
    /// Upper bound imposed by the attached tile layer
    pub max_zoom: f64,
}

/// Project a coordinate to normalized Web Mercator space ([0,1] on both axes)
pub fn to_world(at: Coordinate) -> DVec2 {
    let lat = at.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let lat_rad = lat * PI / 180.0;
    DVec2::new(
        (at.lng + 180.0) / 360.0,
        (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0,
    )
}

/// Inverse of [`to_world`]
pub fn from_world(world: DVec2) -> Coordinate {
    let lng = world.x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * world.y)).sinh().atan() * 180.0 / PI;
    Coordinate::new(lat, lng)
}

impl Viewport {
    pub fn new(center: Coordinate, zoom: f64, width: usize, height: usize) -> Self {
        Self {
            center: center.normalized(),
            zoom,
            width,
            height,
            max_zoom: 19.0,
        }
    }

    fn scale(&self) -> f64 {
        TILE_SIZE * self.zoom.exp2()
    }

    fn half_size(&self) -> DVec2 {
        DVec2::new(self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    /// Pan the viewport by a pixel delta
    pub fn pan(&mut self, dx: i32, dy: i32) {
        let world = to_world(self.center) + DVec2::new(dx as f64, dy as f64) / self.scale();
        let wrapped = DVec2::new(world.x.rem_euclid(1.0), world.y.clamp(0.0, 1.0));
        self.center = from_world(wrapped).normalized();
    }

    pub fn set_center(&mut self, center: Coordinate) {
        self.center = center.normalized();
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(MIN_ZOOM, self.max_zoom);
    }

    /// Lower the zoom ceiling, pulling the current zoom down if needed
    pub fn set_max_zoom(&mut self, max_zoom: f64) {
        self.max_zoom = max_zoom.max(MIN_ZOOM);
        self.zoom = self.zoom.min(self.max_zoom);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + 1.0);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom - 1.0);
    }

    /// Zoom in towards a specific pixel location
    pub fn zoom_in_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 1.0);
    }

    /// Zoom out from a specific pixel location
    pub fn zoom_out_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, -1.0);
    }

    /// Zoom by `delta` levels keeping the point under (px, py) fixed
    fn zoom_at(&mut self, px: i32, py: i32, delta: f64) {
        let anchor = self.unproject(px, py);
        self.set_zoom(self.zoom + delta);

        let (new_px, new_py) = self.project(anchor);
        self.pan(new_px - px, new_py - py);
    }

    /// Unproject pixel coordinates back to a geographic coordinate
    pub fn unproject(&self, px: i32, py: i32) -> Coordinate {
        let offset = DVec2::new(px as f64, py as f64) - self.half_size();
        let world = to_world(self.center) + offset / self.scale();
        from_world(DVec2::new(world.x, world.y.clamp(0.0, 1.0)))
    }

    /// Project a geographic coordinate to pixel coordinates
    pub fn project(&self, at: Coordinate) -> (i32, i32) {
        let offset = (to_world(at) - to_world(self.center)) * self.scale();
        let pixel = offset + self.half_size();
        (pixel.x.round() as i32, pixel.y.round() as i32)
    }

    /// Check if a projected point is visible in the viewport
    pub fn is_visible(&self, px: i32, py: i32) -> bool {
        px >= -10 && px < self.width as i32 + 10 && py >= -10 && py < self.height as i32 + 10
    }

    /// Check if a line segment might be visible (rough bounding box check)
    pub fn line_might_be_visible(&self, p1: (i32, i32), p2: (i32, i32)) -> bool {
        let min_x = p1.0.min(p2.0);
        let max_x = p1.0.max(p2.0);
        let min_y = p1.1.min(p2.1);
        let max_y = p1.1.max(p2.1);

        max_x >= 0 && min_x < self.width as i32 && max_y >= 0 && min_y < self.height as i32
    }
}
