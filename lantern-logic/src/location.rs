use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// A "part" of a coordinate, in decimal degrees
pub type CoordComponent = f64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, specta::Type)]
/// A WGS84 point in latitude / longitude order
pub struct LatLng {
    pub lat: CoordComponent,
    pub lng: CoordComponent,
}

impl LatLng {
    pub const fn new(lat: CoordComponent, lng: CoordComponent) -> Self {
        Self { lat, lng }
    }

    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, specta::Type)]
/// Position of this device as reported by the platform location service
pub struct DeviceLocation {
    pub latitude: CoordComponent,
    pub longitude: CoordComponent,
    /// Accuracy radius in meters
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl DeviceLocation {
    /// A fix taken right now
    pub fn now(latitude: CoordComponent, longitude: CoordComponent, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            timestamp: Utc::now(),
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Platform location capability, injected into a [crate::MapSession]
pub trait LocationProvider: Send + Sync {
    /// Ask the user for foreground location access
    fn request_permission(&self) -> impl Future<Output = Permission> + Send;
    /// Get a single fix, an error means the position is unavailable
    fn current_position(&self) -> impl Future<Output = Result<DeviceLocation>> + Send;
}
