pub mod canvas;
pub mod geometry;
pub mod markers;
pub mod pin_drop;
pub mod projection;
pub mod renderer;
pub mod resource;
pub mod spatial;
pub mod tiles;

pub use canvas::{MapCanvas, MapCanvasHandle};
pub use projection::Viewport;
pub use renderer::{MapLayers, MapRenderer};
