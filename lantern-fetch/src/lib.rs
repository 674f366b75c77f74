mod file;
mod http;
mod server;
mod source;

pub use file::FileLoader;
pub use http::HttpLoader;
pub use server::{FETCH_TIMEOUT_SECS, SIGHTINGS_URL, is_remote};
pub use source::SightingsSource;
