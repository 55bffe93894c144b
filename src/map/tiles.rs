//! Tile layer descriptors keyed by layer kind.

use serde::{Deserialize, Serialize};

/// Base layers the map can show
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileLayerKind {
    #[default]
    Street,
    Satellite,
}

impl TileLayerKind {
    pub fn label(self) -> &'static str {
        match self {
            TileLayerKind::Street => "street",
            TileLayerKind::Satellite => "satellite",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            TileLayerKind::Street => TileLayerKind::Satellite,
            TileLayerKind::Satellite => TileLayerKind::Street,
        }
    }
}

/// Where a tile layer's imagery comes from and how far it can zoom
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileLayerDescriptor {
    /// URL template with `{s}`, `{z}`, `{x}`, `{y}` placeholders
    pub url_template: String,
    pub attribution: String,
    pub max_zoom: u8,
}

impl TileLayerDescriptor {
    pub fn street() -> Self {
        Self {
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "© OpenStreetMap contributors".to_string(),
            max_zoom: 19,
        }
    }

    pub fn satellite() -> Self {
        Self {
            url_template:
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
                    .to_string(),
            attribution: "Tiles © Esri".to_string(),
            max_zoom: 18,
        }
    }

    /// Expand the URL template for one tile. Subdomains rotate a/b/c by
    /// tile position so neighbouring tiles spread across hosts.
    pub fn tile_url(&self, z: u8, x: u32, y: u32) -> String {
        const SUBDOMAINS: [&str; 3] = ["a", "b", "c"];
        let sub = SUBDOMAINS[((x + y) % SUBDOMAINS.len() as u32) as usize];
        self.url_template
            .replace("{s}", sub)
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }
}

/// Overrides read from configuration; missing entries fall back to defaults
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TileOverrides {
    #[serde(default)]
    pub street: Option<TileLayerDescriptor>,
    #[serde(default)]
    pub satellite: Option<TileLayerDescriptor>,
}

/// Stateless lookup from layer kind to descriptor
#[derive(Clone, Debug)]
pub struct TileLayerProvider {
    street: TileLayerDescriptor,
    satellite: TileLayerDescriptor,
}

impl TileLayerProvider {
    pub fn new(overrides: &TileOverrides) -> Self {
        Self {
            street: overrides
                .street
                .clone()
                .unwrap_or_else(TileLayerDescriptor::street),
            satellite: overrides
                .satellite
                .clone()
                .unwrap_or_else(TileLayerDescriptor::satellite),
        }
    }

    pub fn descriptor(&self, kind: TileLayerKind) -> &TileLayerDescriptor {
        match kind {
            TileLayerKind::Street => &self.street,
            TileLayerKind::Satellite => &self.satellite,
        }
    }
}

impl Default for TileLayerProvider {
    fn default() -> Self {
        Self::new(&TileOverrides::default())
    }
}
