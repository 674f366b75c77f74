use std::future::Future;

use crate::{feature::FeatureCollection, prelude::*};

/// Source of the published sightings artifact, either bundled with the app or
/// fetched remotely. Injected into a [crate::MapSession].
pub trait FeatureCollectionLoader: Send + Sync {
    /// Fetch and parse the artifact. Any error here is shown to the user as a
    /// data load failure, it never tears down the session.
    fn load(&self) -> impl Future<Output = Result<FeatureCollection>> + Send;

    /// Human readable description of where the data comes from, used in logs
    fn describe(&self) -> String {
        String::from("sightings")
    }
}
