use lantern_logic::{FeatureCollection, FeatureCollectionLoader, prelude::*};

use crate::{file::FileLoader, http::HttpLoader, server::is_remote};

/// Either a bundled file or a remote URL, picked from a location string
pub enum SightingsSource {
    File(FileLoader),
    Http(HttpLoader),
}

impl SightingsSource {
    pub fn from_location(location: &str) -> Result<Self> {
        if is_remote(location) {
            HttpLoader::new(location).map(Self::Http)
        } else {
            Ok(Self::File(FileLoader::new(location)))
        }
    }
}

impl FeatureCollectionLoader for SightingsSource {
    async fn load(&self) -> Result<FeatureCollection> {
        match self {
            Self::File(loader) => loader.load().await,
            Self::Http(loader) => loader.load().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::File(loader) => loader.describe(),
            Self::Http(loader) => loader.describe(),
        }
    }
}
