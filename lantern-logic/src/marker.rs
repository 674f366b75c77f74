use serde::Serialize;

use crate::{
    cluster::{Cluster, SizeTier, SizeTiers},
    date::display_date,
    feature::GeoFeature,
    location::{DeviceLocation, LatLng},
};

pub const USER_MARKER_POPUP: &str = "Your location";
/// Draw order offset so the user marker sits above sightings
pub const USER_MARKER_Z_OFFSET: i32 = 1000;

#[derive(Debug, Clone, Serialize, PartialEq, specta::Type)]
/// Popup contents for a single sighting
pub struct MarkerDetail {
    pub id: u64,
    pub position: LatLng,
    /// Source date text
    pub date: String,
    /// `M/D/YYYY`, or the source text if it isn't a date
    pub display_date: String,
    pub title: String,
}

impl MarkerDetail {
    pub fn from_feature(feature: &GeoFeature) -> Self {
        let id = feature.properties.id;
        Self {
            id,
            position: feature.position(),
            date: feature.properties.date.clone(),
            display_date: display_date(&feature.properties.date),
            title: format!("Sighting #{id}"),
        }
    }

    pub fn popup_text(&self) -> String {
        format!("{}\nDate: {}", self.title, self.display_date)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, specta::Type)]
pub struct ClusterIcon {
    pub center: LatLng,
    pub count: u32,
    /// Text drawn on the icon, the member count
    pub label: String,
    pub tier: SizeTier,
    pub icon_px: u32,
    pub class_name: String,
}

impl ClusterIcon {
    pub fn new(cluster: &Cluster, tiers: &SizeTiers) -> Self {
        let count = cluster.count();
        let tier = tiers.tier(count);
        Self {
            center: cluster.center,
            count: count as u32,
            label: count.to_string(),
            tier,
            icon_px: tier.icon_px(),
            class_name: tier.class_name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, specta::Type)]
/// Something drawn on the map for sightings, `key` identifies it for selection
pub enum RenderedPoint {
    Single { key: u32, marker: MarkerDetail },
    Cluster { key: u32, icon: ClusterIcon },
}

impl RenderedPoint {
    pub fn key(&self) -> u32 {
        match self {
            Self::Single { key, .. } | Self::Cluster { key, .. } => *key,
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            Self::Single { .. } => 1,
            Self::Cluster { icon, .. } => icon.count,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, specta::Type)]
/// The "you are here" marker, never part of clustering
pub struct UserMarker {
    pub position: LatLng,
    pub accuracy: f64,
    pub popup: String,
    pub z_offset: i32,
}

impl From<&DeviceLocation> for UserMarker {
    fn from(loc: &DeviceLocation) -> Self {
        Self {
            position: loc.position(),
            accuracy: loc.accuracy,
            popup: USER_MARKER_POPUP.to_string(),
            z_offset: USER_MARKER_Z_OFFSET,
        }
    }
}
