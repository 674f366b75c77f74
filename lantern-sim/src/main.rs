use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};
use clap::Parser;
use lantern_fetch::{SIGHTINGS_URL, SightingsSource};
use lantern_logic::{
    ClusterSelectBehavior, DeviceLocation, FeatureCollectionLoader, LocationProvider, MapPhase,
    MapSession, MapSettings, Permission, SightingFilter, StateUpdateSender, Zoom,
};
use log::{debug, info};
use serde::Serialize;

type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

/// Run a headless map session and print what the map would show
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Sightings artifact to load, a path or an http(s) URL
    #[arg(default_value = SIGHTINGS_URL)]
    source: String,

    /// Latitude reported by the simulated device, omit to deny location access
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,

    /// Longitude reported by the simulated device
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,

    /// Zoom levels to step through once the map is ready, state is printed
    /// after each one
    #[arg(long, value_delimiter = ',')]
    zoom: Vec<Zoom>,

    /// Only show sightings with this eradication status
    #[arg(long)]
    status: Option<String>,

    /// Only show sightings with this visit type
    #[arg(long)]
    visit_type: Option<String>,

    /// Tap the rendered point with this key at the end and print the result
    #[arg(long)]
    select: Option<u32>,

    /// Expand clusters in place instead of zooming into them
    #[arg(long)]
    expand: bool,

    /// JSON file with map settings, missing fields use the defaults
    #[arg(long)]
    settings: Option<PathBuf>,
}

struct ScriptedLocation(Option<DeviceLocation>);

impl LocationProvider for ScriptedLocation {
    async fn request_permission(&self) -> Permission {
        if self.0.is_some() {
            Permission::Granted
        } else {
            Permission::Denied
        }
    }

    async fn current_position(&self) -> Result<DeviceLocation> {
        self.0.ok_or_else(|| anyhow!("No simulated location"))
    }
}

struct LogSender;

impl StateUpdateSender for LogSender {
    fn send_update(&self) {
        debug!("Map state updated");
    }
}

#[derive(Serialize)]
struct Step<T: Serialize> {
    step: String,
    state: T,
}

fn print_step(step: impl Into<String>, state: impl Serialize) -> Result {
    let step = Step {
        step: step.into(),
        state,
    };
    let json = serde_json::to_string_pretty(&step).context("Failed to serialize map state")?;
    println!("{json}");
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<MapSettings> {
    let mut settings = match &cli.settings {
        Some(path) => {
            let raw = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_slice(&raw).context("Invalid map settings")?
        }
        None => MapSettings::default(),
    };
    if cli.expand {
        settings.cluster_select = ClusterSelectBehavior::Expand;
    }
    Ok(settings)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let location = ScriptedLocation(
        cli.lat
            .zip(cli.lon)
            .map(|(lat, lon)| DeviceLocation::now(lat, lon, 10.0)),
    );
    let loader = SightingsSource::from_location(&cli.source)?;

    info!(
        "Starting lanternfly map simulator {} with sightings from {}",
        env!("CARGO_PKG_VERSION"),
        loader.describe()
    );

    let session = MapSession::new(settings, location, loader, LogSender);

    let phase = session.run().await;
    if phase != MapPhase::Ready {
        bail!("Map session ended in phase {phase:?}");
    }
    print_step("ready", session.ui_state().await)?;

    let filter = SightingFilter {
        eradication_status: cli.status.clone(),
        visit_type: cli.visit_type.clone(),
    };
    if !filter.is_empty() {
        session.set_filter(filter).await;
        print_step("filter", session.ui_state().await)?;
    }

    for zoom in cli.zoom.iter().copied() {
        session.set_zoom(zoom).await;
        print_step(format!("zoom {zoom}"), session.ui_state().await)?;
    }

    if let Some(key) = cli.select {
        let selection = session
            .select(key)
            .await
            .with_context(|| format!("Nothing rendered with key {key}"))?;
        print_step(format!("select {key}"), selection)?;
    }

    session.close().await;

    Ok(())
}
