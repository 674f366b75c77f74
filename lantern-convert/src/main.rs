mod artifact;

use std::{fs, path::PathBuf};

use clap::{Parser, ValueEnum};
use lantern_logic::{
    ConvertError, ConvertOptions, CoordinatePolicy, convert_validated, parse_source,
};
use log::{info, warn};

use crate::artifact::write_artifact;

type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

const DEFAULT_SOURCE: &str = "assets/edd-maps-spotted-lanternfly.json";
const DEFAULT_OUTPUT: &str = "assets/lanternfly-sightings.geojson";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CoordinateArg {
    /// Skip records outside WGS84 bounds
    Drop,
    /// Clamp out of range coordinates into bounds
    Clamp,
    /// Publish coordinates unchecked
    PassThrough,
}

impl From<CoordinateArg> for CoordinatePolicy {
    fn from(value: CoordinateArg) -> Self {
        match value {
            CoordinateArg::Drop => CoordinatePolicy::Drop,
            CoordinateArg::Clamp => CoordinatePolicy::Clamp,
            CoordinateArg::PassThrough => CoordinatePolicy::PassThrough,
        }
    }
}

/// Convert an EDDMapS spotted lanternfly export into the GeoJSON artifact
/// the map loads
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// EDDMapS export to read
    #[arg(default_value = DEFAULT_SOURCE)]
    source: PathBuf,

    /// Where to write the feature collection
    #[arg(default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// What to do with coordinates outside WGS84 bounds
    #[arg(long, value_enum, default_value_t = CoordinateArg::Drop)]
    coordinates: CoordinateArg,

    /// Keep records whose observation date doesn't parse
    #[arg(long)]
    allow_bad_dates: bool,

    /// Log every rejected record instead of just the count
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result {
    colog::init();

    let cli = Cli::parse();

    info!(
        "Starting lanternfly converter {}",
        env!("CARGO_PKG_VERSION")
    );

    let raw = fs::read(&cli.source).map_err(|source| ConvertError::SourceRead {
        path: cli.source.clone(),
        source,
    })?;

    let records = parse_source(&raw)?;
    info!(
        "Read {} records from {}",
        records.len(),
        cli.source.display()
    );

    let opts = ConvertOptions {
        coordinates: cli.coordinates.into(),
        reject_bad_dates: !cli.allow_bad_dates,
    };

    let report = convert_validated(&records, &opts);

    if cli.verbose {
        for rejection in &report.rejected {
            warn!(
                "Skipped record {} (#{}): {}",
                rejection.index, rejection.id, rejection.reason
            );
        }
    }

    write_artifact(&cli.output, &report.collection)?;

    println!(
        "Converted {} sightings ({} rejected)",
        report.kept(),
        report.rejected.len()
    );
    println!("Wrote {}", cli.output.display());

    Ok(())
}
