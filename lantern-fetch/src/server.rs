const DEFAULT_SIGHTINGS_URL: &str =
    "https://raw.githubusercontent.com/zachcowell/lantern/main/assets/lanternfly-sightings.geojson";

const fn sightings_url() -> &'static str {
    if let Some(url) = option_env!("LANTERN_SIGHTINGS_URL") {
        url
    } else {
        DEFAULT_SIGHTINGS_URL
    }
}

const fn fetch_timeout_secs() -> u64 {
    if let Some(secs) = option_env!("LANTERN_FETCH_TIMEOUT_SECS") {
        const_str::parse!(secs, u64)
    } else {
        30
    }
}

/// Where the published sightings artifact lives
pub const SIGHTINGS_URL: &str = sightings_url();
pub const FETCH_TIMEOUT_SECS: u64 = fetch_timeout_secs();

pub fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
