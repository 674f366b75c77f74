mod cluster;
mod convert;
mod date;
mod error;
mod feature;
mod filter;
mod loader;
mod location;
mod marker;
mod record;
mod session;
mod settings;

pub use cluster::{
    Cluster, ClusterPass, ClusterStrategy, GridClusterStrategy, Marker, Pixel, SizeTier,
    SizeTiers, Zoom, project,
};
pub use convert::{
    ConversionReport, ConvertOptions, CoordinatePolicy, RejectReason, Rejection, convert,
    convert_validated,
};
pub use date::{display_date, parse_observation_date};
pub use error::ConvertError;
pub use feature::{FeatureCollection, FeatureProperties, GeoFeature, Geometry};
pub use filter::SightingFilter;
pub use loader::FeatureCollectionLoader;
pub use location::{DeviceLocation, LatLng, LocationProvider, Permission};
pub use marker::{ClusterIcon, MarkerDetail, RenderedPoint, UserMarker};
pub use record::{SightingRecord, parse_source};
pub use session::{
    DataStatus, LocationStatus, MapPhase, MapSession, MapUiState, MapView, Selection,
    StateUpdateSender,
};
pub use settings::{ClusterSelectBehavior, FALLBACK_CENTER, MapSettings, TileLayer};

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
