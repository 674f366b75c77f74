use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    date::parse_observation_date,
    feature::{FeatureCollection, FeatureProperties, GeoFeature},
    location::LatLng,
    record::SightingRecord,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
/// What to do with a record whose coordinates fall outside WGS84 bounds
pub enum CoordinatePolicy {
    /// Skip the record and count it as rejected
    #[default]
    Drop,
    /// Clamp latitude into [-90, 90] and longitude into [-180, 180]
    Clamp,
    /// Publish the coordinates as-is
    PassThrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOptions {
    pub coordinates: CoordinatePolicy,
    /// Reject records whose observation date can't be parsed
    pub reject_bad_dates: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            coordinates: CoordinatePolicy::Drop,
            reject_bad_dates: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NonFiniteCoordinate,
    CoordinateOutOfRange { latitude: f64, longitude: f64 },
    MalformedDate(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFiniteCoordinate => write!(f, "coordinate is not a number"),
            Self::CoordinateOutOfRange {
                latitude,
                longitude,
            } => write!(f, "coordinate ({latitude}, {longitude}) is out of range"),
            Self::MalformedDate(raw) => write!(f, "observation date {raw:?} is malformed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Position of the record in the source
    pub index: usize,
    pub id: u64,
    pub reason: RejectReason,
}

#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub collection: FeatureCollection,
    pub total: usize,
    pub rejected: Vec<Rejection>,
}

impl ConversionReport {
    pub fn kept(&self) -> usize {
        self.collection.len()
    }
}

fn to_feature(record: &SightingRecord, position: LatLng) -> GeoFeature {
    GeoFeature::new(
        position,
        FeatureProperties {
            id: record.id,
            date: record.observation_date.clone(),
            eradication_status: record.eradication_status.clone(),
            visit_type: record.visit_type.clone(),
        },
    )
}

/// Straight conversion with no validation, one feature per record.
pub fn convert(records: &[SightingRecord]) -> FeatureCollection {
    FeatureCollection::new(
        records
            .iter()
            .map(|record| to_feature(record, record.position()))
            .collect(),
    )
}

fn check_record(record: &SightingRecord, opts: &ConvertOptions) -> Result<LatLng, RejectReason> {
    let position = record.position();

    if !position.lat.is_finite() || !position.lng.is_finite() {
        return Err(RejectReason::NonFiniteCoordinate);
    }

    let position = if position.in_range() {
        position
    } else {
        match opts.coordinates {
            CoordinatePolicy::Drop => {
                return Err(RejectReason::CoordinateOutOfRange {
                    latitude: position.lat,
                    longitude: position.lng,
                });
            }
            CoordinatePolicy::Clamp => LatLng::new(
                position.lat.clamp(-90.0, 90.0),
                position.lng.clamp(-180.0, 180.0),
            ),
            CoordinatePolicy::PassThrough => position,
        }
    };

    if opts.reject_bad_dates && parse_observation_date(&record.observation_date).is_none() {
        return Err(RejectReason::MalformedDate(record.observation_date.clone()));
    }

    Ok(position)
}

/// Convert with validation, bad records are skipped and reported instead of
/// failing the whole batch.
pub fn convert_validated(records: &[SightingRecord], opts: &ConvertOptions) -> ConversionReport {
    let mut features = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match check_record(record, opts) {
            Ok(position) => features.push(to_feature(record, position)),
            Err(reason) => rejected.push(Rejection {
                index,
                id: record.id,
                reason,
            }),
        }
    }

    if !rejected.is_empty() {
        warn!(
            "Rejected {} of {} sighting records",
            rejected.len(),
            records.len()
        );
    }
    info!("Converted {} sighting records", features.len());

    ConversionReport {
        collection: FeatureCollection::new(features),
        total: records.len(),
        rejected,
    }
}
