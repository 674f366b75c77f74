use std::time::Duration;

use lantern_logic::{FeatureCollection, FeatureCollectionLoader, prelude::*};
use log::debug;

use crate::server::{FETCH_TIMEOUT_SECS, SIGHTINGS_URL};

/// Loads the sightings artifact over HTTP at display time
pub struct HttpLoader {
    client: reqwest::Client,
    url: String,
}

impl HttpLoader {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Loader for the published artifact
    pub fn published() -> Result<Self> {
        Self::new(SIGHTINGS_URL)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FeatureCollectionLoader for HttpLoader {
    async fn load(&self) -> Result<FeatureCollection> {
        debug!("Fetching sightings from {}", self.url);
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Could not send request")?
            .error_for_status()
            .context("Server returned error")?
            .bytes()
            .await
            .context("Failed to read response")?;

        FeatureCollection::from_slice(&body).context("Response is not a sightings feature collection")
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
