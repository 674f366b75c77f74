use serde::{Deserialize, Serialize};

use crate::{error::ConvertError, location::LatLng};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CollectionType {
    #[default]
    FeatureCollection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FeatureType {
    #[default]
    Feature,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    /// GeoJSON order, `[longitude, latitude]`
    Point([f64; 2]),
}

impl Geometry {
    pub fn point(position: LatLng) -> Self {
        Self::Point([position.lng, position.lat])
    }

    pub fn position(&self) -> LatLng {
        match self {
            Self::Point([lng, lat]) => LatLng::new(*lat, *lng),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    pub id: u64,
    pub date: String,
    pub eradication_status: String,
    pub visit_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// A single sighting as a GeoJSON point feature
pub struct GeoFeature {
    #[serde(rename = "type")]
    pub kind: FeatureType,
    pub properties: FeatureProperties,
    pub geometry: Geometry,
}

impl GeoFeature {
    pub fn new(position: LatLng, properties: FeatureProperties) -> Self {
        Self {
            kind: FeatureType::Feature,
            properties,
            geometry: Geometry::point(position),
        }
    }

    pub fn position(&self) -> LatLng {
        self.geometry.position()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
/// The published sightings artifact. Features keep source order.
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: CollectionType,
    pub features: Vec<GeoFeature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<GeoFeature>) -> Self {
        Self {
            kind: CollectionType::FeatureCollection,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Serialize the way the artifact is published, two space indent
    pub fn to_pretty_json(&self) -> Result<String, ConvertError> {
        serde_json::to_string_pretty(self).map_err(ConvertError::ArtifactSerialize)
    }
}
