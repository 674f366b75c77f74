use std::path::{Path, PathBuf};

use lantern_logic::{FeatureCollection, FeatureCollectionLoader, prelude::*};

/// Loads the artifact bundled with the app
pub struct FileLoader {
    path: PathBuf,
}

impl FileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureCollectionLoader for FileLoader {
    async fn load(&self) -> Result<FeatureCollection> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        FeatureCollection::from_slice(&bytes)
            .with_context(|| format!("{} is not a sightings feature collection", self.path.display()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
