use serde::{Deserialize, Serialize};

use crate::{
    cluster::{SizeTiers, Zoom},
    location::LatLng,
};

/// Center used until (or unless) the device location is known, New York City
pub const FALLBACK_CENTER: LatLng = LatLng::new(40.7128, -74.0060);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, specta::Type)]
/// What tapping a cluster does, fixed for a whole session
pub enum ClusterSelectBehavior {
    /// Zoom to the first level where the cluster splits apart, expanding it in
    /// place once max zoom is reached
    ZoomIn,
    /// Always list the members of the cluster in place
    Expand,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, specta::Type)]
/// Base map tiles, always shown regardless of data or location state
pub struct TileLayer {
    pub url_template: String,
    pub attribution: String,
    pub max_zoom: Zoom,
}

impl Default for TileLayer {
    fn default() -> Self {
        Self {
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "© OpenStreetMap contributors".to_string(),
            max_zoom: 19,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
#[serde(default)]
/// Settings for the sightings map
pub struct MapSettings {
    /// Where the map starts when no device location is available
    pub fallback_center: LatLng,
    /// Zoom used with the fallback center
    pub default_zoom: Zoom,
    /// Zoom used when centering on the device
    pub located_zoom: Zoom,
    pub max_zoom: Zoom,
    /// Markers closer than this many screen pixels get grouped
    pub cluster_radius_px: f64,
    /// Markers clustered between each yield back to the event loop
    pub cluster_chunk_size: u32,
    /// Give up on the location service after this many seconds
    pub location_timeout_secs: u32,
    pub size_tiers: SizeTiers,
    pub cluster_select: ClusterSelectBehavior,
    pub tile_layer: TileLayer,
}

impl MapSettings {
    pub fn clamp_zoom(&self, zoom: Zoom) -> Zoom {
        zoom.min(self.max_zoom)
    }
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            fallback_center: FALLBACK_CENTER,
            default_zoom: 10,
            located_zoom: 13,
            max_zoom: 19,
            cluster_radius_px: 60.0,
            cluster_chunk_size: 200,
            location_timeout_secs: 10,
            size_tiers: SizeTiers::default(),
            cluster_select: ClusterSelectBehavior::ZoomIn,
            tile_layer: TileLayer::default(),
        }
    }
}
