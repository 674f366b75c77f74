use std::{collections::HashMap, f64::consts::PI};

use serde::{Deserialize, Serialize};

use crate::location::LatLng;

/// Size of a map tile in pixels, zoom `z` spans `TILE_SIZE * 2^z` pixels
pub const TILE_SIZE: f64 = 256.0;
/// Web mercator latitude limit
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Zoom level of the map view, 0 is the whole world
pub type Zoom = u8;

#[derive(Debug, Clone, Copy, PartialEq)]
/// A point in world pixel space at some zoom
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

impl Pixel {
    fn dist_sq(&self, other: &Pixel) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Spherical mercator projection into world pixels
pub fn project(position: LatLng, zoom: Zoom) -> Pixel {
    let scale = TILE_SIZE * 2f64.powi(zoom as i32);
    let lat = position.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let sin = lat.to_radians().sin();
    Pixel {
        x: (position.lng + 180.0) / 360.0 * scale,
        y: (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * scale,
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A sighting as placed on the map
pub struct Marker {
    /// Sighting ID from the feature properties
    pub id: u64,
    pub position: LatLng,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Indexes into the marker slice that was partitioned, in push order
    pub members: Vec<usize>,
    /// Mean position of the members
    pub center: LatLng,
}

impl Cluster {
    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn is_single(&self) -> bool {
        self.members.len() == 1
    }
}

/// One in-progress partition at a fixed zoom and radius. Markers are pushed
/// in order so large sets can be fed in chunks between yields.
pub trait ClusterPass: Send {
    fn push(&mut self, marker: &Marker);
    fn finish(self) -> Vec<Cluster>;
}

/// Replaceable clustering algorithm. Implementations must be deterministic:
/// the same markers in the same order at the same zoom and radius always give
/// the same clusters.
pub trait ClusterStrategy: Send + Sync {
    type Pass: ClusterPass;

    fn begin(&self, zoom: Zoom, radius_px: f64) -> Self::Pass;

    fn partition(&self, markers: &[Marker], zoom: Zoom, radius_px: f64) -> Vec<Cluster> {
        let mut pass = self.begin(zoom, radius_px);
        for marker in markers {
            pass.push(marker);
        }
        pass.finish()
    }
}

/// Greedy grid clustering: each marker joins the nearest existing cluster
/// whose anchor (its first marker) is within the radius in screen space,
/// otherwise it starts a new cluster. A grid with cells the size of the radius
/// keeps lookups to the 9 surrounding cells.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridClusterStrategy;

struct PendingCluster {
    anchor: Pixel,
    members: Vec<usize>,
    lat_sum: f64,
    lng_sum: f64,
}

pub struct GridPass {
    zoom: Zoom,
    radius_sq: f64,
    cell_size: f64,
    grid: HashMap<(i64, i64), Vec<usize>>,
    clusters: Vec<PendingCluster>,
    pushed: usize,
}

impl GridPass {
    fn cell_of(&self, p: &Pixel) -> (i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
        )
    }

    fn nearest(&self, p: &Pixel) -> Option<usize> {
        let (cx, cy) = self.cell_of(p);
        let mut best: Option<(f64, usize)> = None;

        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(candidates) = self.grid.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &idx in candidates {
                    let d = self.clusters[idx].anchor.dist_sq(p);
                    if d > self.radius_sq {
                        continue;
                    }
                    // Ties go to the older cluster so the result never depends
                    // on cell visiting order
                    let better = match best {
                        None => true,
                        Some((best_d, best_idx)) => d < best_d || (d == best_d && idx < best_idx),
                    };
                    if better {
                        best = Some((d, idx));
                    }
                }
            }
        }

        best.map(|(_, idx)| idx)
    }
}

impl ClusterPass for GridPass {
    fn push(&mut self, marker: &Marker) {
        let p = project(marker.position, self.zoom);
        let index = self.pushed;
        self.pushed += 1;

        if let Some(idx) = self.nearest(&p) {
            let cluster = &mut self.clusters[idx];
            cluster.members.push(index);
            cluster.lat_sum += marker.position.lat;
            cluster.lng_sum += marker.position.lng;
        } else {
            let cell = self.cell_of(&p);
            let idx = self.clusters.len();
            self.clusters.push(PendingCluster {
                anchor: p,
                members: vec![index],
                lat_sum: marker.position.lat,
                lng_sum: marker.position.lng,
            });
            self.grid.entry(cell).or_default().push(idx);
        }
    }

    fn finish(self) -> Vec<Cluster> {
        self.clusters
            .into_iter()
            .map(|c| {
                let n = c.members.len() as f64;
                Cluster {
                    center: LatLng::new(c.lat_sum / n, c.lng_sum / n),
                    members: c.members,
                }
            })
            .collect()
    }
}

impl ClusterStrategy for GridClusterStrategy {
    type Pass = GridPass;

    fn begin(&self, zoom: Zoom, radius_px: f64) -> GridPass {
        let radius = radius_px.max(0.0);
        GridPass {
            zoom,
            radius_sq: radius * radius,
            cell_size: radius.max(1.0),
            grid: HashMap::new(),
            clusters: Vec::new(),
            pushed: 0,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, specta::Type,
)]
pub enum SizeTier {
    Small,
    Medium,
    Large,
}

impl SizeTier {
    /// Icon edge length in pixels
    pub fn icon_px(&self) -> u32 {
        match self {
            Self::Small => 40,
            Self::Medium => 45,
            Self::Large => 50,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Small => "cluster-small",
            Self::Medium => "cluster-medium",
            Self::Large => "cluster-large",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, specta::Type)]
/// Count thresholds for cluster icon sizes. A step function, so any pair of
/// thresholds gives tiers that never shrink as the count grows.
pub struct SizeTiers {
    /// Counts above this are at least [SizeTier::Medium]
    pub medium_above: u32,
    /// Counts above this are [SizeTier::Large]
    pub large_above: u32,
}

impl SizeTiers {
    pub fn tier(&self, count: usize) -> SizeTier {
        if count > self.large_above as usize {
            SizeTier::Large
        } else if count > self.medium_above as usize {
            SizeTier::Medium
        } else {
            SizeTier::Small
        }
    }
}

impl Default for SizeTiers {
    fn default() -> Self {
        Self {
            medium_above: 50,
            large_above: 100,
        }
    }
}
