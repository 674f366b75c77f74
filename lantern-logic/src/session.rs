use std::{sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{RwLock, RwLockWriteGuard},
    task::yield_now,
};
use tokio_util::sync::CancellationToken;

use crate::{
    cluster::{Cluster, ClusterPass, ClusterStrategy, GridClusterStrategy, Marker, Zoom},
    feature::FeatureCollection,
    filter::SightingFilter,
    loader::FeatureCollectionLoader,
    location::{DeviceLocation, LatLng, LocationProvider, Permission},
    marker::{ClusterIcon, MarkerDetail, RenderedPoint, UserMarker},
    settings::{ClusterSelectBehavior, MapSettings, TileLayer},
};

pub const LOADING_TEXT: &str = "Loading lanternfly data...";

pub trait StateUpdateSender: Send + Sync {
    fn send_update(&self);
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, specta::Type)]
pub enum LocationStatus {
    /// Permission or position request still in flight
    Awaiting,
    Granted,
    Denied,
    Unavailable,
    /// The location service never answered
    TimedOut,
}

impl LocationStatus {
    pub fn settled(&self) -> bool {
        !matches!(self, Self::Awaiting)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, specta::Type)]
pub enum DataStatus {
    Loading,
    Loaded { features: u32 },
    Failed { message: String },
}

impl DataStatus {
    pub fn settled(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, specta::Type)]
pub enum MapPhase {
    /// Constructed, [MapSession::run] not called yet
    Initializing,
    AwaitingLocation,
    LoadingData,
    /// Location and data have both settled, one way or another
    Ready,
    /// The screen was torn down
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, specta::Type)]
pub struct MapView {
    pub center: LatLng,
    pub zoom: Zoom,
}

#[derive(Debug, Clone, Serialize, PartialEq, specta::Type)]
/// Result of tapping something on the map
pub enum Selection {
    Marker(MarkerDetail),
    /// The view was moved to where the cluster splits apart
    ZoomTo { center: LatLng, zoom: Zoom },
    /// The cluster's members, shown in place
    Expanded {
        center: LatLng,
        members: Vec<MarkerDetail>,
    },
}

#[derive(Debug, Clone, Serialize, specta::Type)]
/// Everything the display layer needs to draw the map screen
pub struct MapUiState {
    pub phase: MapPhase,
    pub view: MapView,
    pub location: LocationStatus,
    pub user_marker: Option<UserMarker>,
    pub data: DataStatus,
    pub points: Vec<RenderedPoint>,
    pub tile_layer: TileLayer,
    pub interactive: bool,
    pub loading_text: Option<String>,
    pub error_text: Option<String>,
    pub filter: SightingFilter,
    pub total_sightings: u32,
    pub visible_sightings: u32,
}

#[derive(Debug, Clone)]
struct VisibleMarker {
    /// Index into the loaded feature collection
    feature: usize,
    marker: Marker,
}

enum LocationOutcome {
    Granted(DeviceLocation),
    Denied,
    Unavailable,
    TimedOut,
}

struct MapState {
    started: bool,
    closed: bool,
    view: MapView,
    location: LocationStatus,
    device: Option<DeviceLocation>,
    data: DataStatus,
    features: Option<Arc<FeatureCollection>>,
    filter: SightingFilter,
    visible: Arc<[VisibleMarker]>,
    clusters: Vec<Cluster>,
    clustered_zoom: Option<Zoom>,
    /// Zoom of the most recently started pass, finished or not
    pass_zoom: Option<Zoom>,
    /// Bumped for every cluster pass, passes that finish with an old value are
    /// stale and get dropped
    generation: u64,
}

impl MapState {
    fn new(settings: &MapSettings) -> Self {
        Self {
            started: false,
            closed: false,
            view: MapView {
                center: settings.fallback_center,
                zoom: settings.clamp_zoom(settings.default_zoom),
            },
            location: LocationStatus::Awaiting,
            device: None,
            data: DataStatus::Loading,
            features: None,
            filter: SightingFilter::default(),
            visible: Arc::from(Vec::new()),
            clusters: Vec::new(),
            clustered_zoom: None,
            pass_zoom: None,
            generation: 0,
        }
    }

    fn phase(&self) -> MapPhase {
        if self.closed {
            MapPhase::Closed
        } else if !self.started {
            MapPhase::Initializing
        } else if self.location.settled() && self.data.settled() {
            MapPhase::Ready
        } else if !self.location.settled() {
            MapPhase::AwaitingLocation
        } else {
            MapPhase::LoadingData
        }
    }

    /// Whether the current view zoom still needs a cluster pass started
    fn needs_pass(&self) -> bool {
        self.features.is_some() && self.pass_zoom != Some(self.view.zoom)
    }

    fn rebuild_visible(&mut self) {
        let visible = self
            .features
            .as_ref()
            .map(|features| {
                features
                    .features
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| self.filter.matches(&f.properties))
                    .map(|(i, f)| VisibleMarker {
                        feature: i,
                        marker: Marker {
                            id: f.properties.id,
                            position: f.position(),
                        },
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        self.visible = Arc::from(visible);
    }

    fn detail(&self, visible_idx: usize) -> Option<MarkerDetail> {
        let features = self.features.as_ref()?;
        let visible = self.visible.get(visible_idx)?;
        features
            .features
            .get(visible.feature)
            .map(MarkerDetail::from_feature)
    }

    fn rendered_points(&self, settings: &MapSettings) -> Vec<RenderedPoint> {
        self.clusters
            .iter()
            .enumerate()
            .filter_map(|(i, cluster)| {
                let key = i as u32;
                if cluster.is_single() {
                    self.detail(cluster.members[0])
                        .map(|marker| RenderedPoint::Single { key, marker })
                } else {
                    Some(RenderedPoint::Cluster {
                        key,
                        icon: ClusterIcon::new(cluster, &settings.size_tiers),
                    })
                }
            })
            .collect()
    }

    fn as_ui_state(&self, settings: &MapSettings) -> MapUiState {
        let phase = self.phase();
        let error_text = match &self.data {
            DataStatus::Failed { message } => Some(message.clone()),
            _ => None,
        };
        let loading_text =
            (phase != MapPhase::Closed && matches!(self.data, DataStatus::Loading))
                .then(|| LOADING_TEXT.to_string());

        MapUiState {
            phase,
            view: self.view,
            location: self.location,
            user_marker: self.device.as_ref().map(UserMarker::from),
            data: self.data.clone(),
            points: self.rendered_points(settings),
            tile_layer: settings.tile_layer.clone(),
            interactive: phase == MapPhase::Ready,
            loading_text,
            error_text,
            filter: self.filter.clone(),
            total_sightings: self.features.as_ref().map_or(0, |f| f.len() as u32),
            visible_sightings: self.visible.len() as u32,
        }
    }
}

/// One showing of the sightings map. Resolves the device location and loads
/// the sightings artifact concurrently via [LocationProvider] and
/// [FeatureCollectionLoader], clusters markers with a [ClusterStrategy], and
/// tells the UI about changes through a [StateUpdateSender].
///
/// Nothing in here returns an error to the host, failures end up in
/// [MapUiState] as degraded states.
pub struct MapSession<L, F, S, C = GridClusterStrategy>
where
    L: LocationProvider,
    F: FeatureCollectionLoader,
    S: StateUpdateSender,
    C: ClusterStrategy,
{
    settings: MapSettings,
    state: RwLock<MapState>,
    location: L,
    loader: F,
    strategy: C,
    state_update_sender: S,
    cancel: CancellationToken,
}

impl<L, F, S> MapSession<L, F, S, GridClusterStrategy>
where
    L: LocationProvider,
    F: FeatureCollectionLoader,
    S: StateUpdateSender,
{
    pub fn new(settings: MapSettings, location: L, loader: F, state_update_sender: S) -> Self {
        Self::with_strategy(
            settings,
            location,
            loader,
            GridClusterStrategy,
            state_update_sender,
        )
    }
}

impl<L, F, S, C> MapSession<L, F, S, C>
where
    L: LocationProvider,
    F: FeatureCollectionLoader,
    S: StateUpdateSender,
    C: ClusterStrategy,
{
    pub fn with_strategy(
        settings: MapSettings,
        location: L,
        loader: F,
        strategy: C,
        state_update_sender: S,
    ) -> Self {
        let state = MapState::new(&settings);
        Self {
            settings,
            state: RwLock::new(state),
            location,
            loader,
            strategy,
            state_update_sender,
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    /// Lock state for writing, `None` once the session has been closed
    async fn live_state(&self) -> Option<RwLockWriteGuard<'_, MapState>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let state = self.state.write().await;
        (!state.closed).then_some(state)
    }

    fn emit_state_update(&self) {
        if !self.cancel.is_cancelled() {
            self.state_update_sender.send_update();
        }
    }

    pub async fn phase(&self) -> MapPhase {
        self.state.read().await.phase()
    }

    pub async fn ui_state(&self) -> MapUiState {
        self.state.read().await.as_ui_state(&self.settings)
    }

    pub async fn device_location(&self) -> Option<DeviceLocation> {
        self.state.read().await.device
    }

    /// Drive the session until both location and data have settled. Returns
    /// [MapPhase::Closed] if [MapSession::close] was called first.
    pub async fn run(&self) -> MapPhase {
        {
            let Some(mut state) = self.live_state().await else {
                return MapPhase::Closed;
            };
            state.started = true;
        }
        self.emit_state_update();

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                info!("Map closed before it was ready");
                MapPhase::Closed
            }

            _ = async { tokio::join!(self.resolve_location(), self.resolve_data()) } => {
                let phase = self.phase().await;
                info!("Map session settled in phase {phase:?}");
                self.emit_state_update();
                phase
            }
        }
    }

    /// Tear down the session, anything still in flight is dropped without
    /// touching state
    pub async fn close(&self) {
        self.cancel.cancel();
        self.state.write().await.closed = true;
    }

    async fn request_location(&self) -> LocationOutcome {
        match self.location.request_permission().await {
            Permission::Denied => LocationOutcome::Denied,
            Permission::Granted => match self.location.current_position().await {
                Ok(loc) => LocationOutcome::Granted(loc),
                Err(why) => {
                    warn!("Failed to get location: {why:?}");
                    LocationOutcome::Unavailable
                }
            },
        }
    }

    async fn resolve_location(&self) {
        let timeout = Duration::from_secs(self.settings.location_timeout_secs as u64);
        let outcome = tokio::time::timeout(timeout, self.request_location())
            .await
            .unwrap_or(LocationOutcome::TimedOut);

        let Some(mut state) = self.live_state().await else {
            return;
        };

        let status = match outcome {
            LocationOutcome::Granted(loc) => {
                info!("Centering map on device location");
                state.view = MapView {
                    center: loc.position(),
                    zoom: self.settings.clamp_zoom(self.settings.located_zoom),
                };
                state.device = Some(loc);
                LocationStatus::Granted
            }
            LocationOutcome::Denied => {
                warn!("Location permission denied, using default view");
                LocationStatus::Denied
            }
            LocationOutcome::Unavailable => LocationStatus::Unavailable,
            LocationOutcome::TimedOut => {
                warn!("Location request timed out after {timeout:?}, using default view");
                LocationStatus::TimedOut
            }
        };
        state.location = status;

        let needs_recluster = state.needs_pass();
        drop(state);

        self.emit_state_update();

        if needs_recluster {
            self.recluster().await;
        }
    }

    async fn resolve_data(&self) {
        let res = self.loader.load().await;

        let Some(mut state) = self.live_state().await else {
            return;
        };

        match res {
            Ok(collection) => {
                let count = collection.len();
                info!("Loaded {count} sightings from {}", self.loader.describe());
                state.features = Some(Arc::new(collection));
                state.rebuild_visible();
                drop(state);

                self.recluster().await;

                if let Some(mut state) = self.live_state().await {
                    state.data = DataStatus::Loaded {
                        features: count as u32,
                    };
                }
            }
            Err(why) => {
                error!("Error loading data from {}: {why:?}", self.loader.describe());
                state.data = DataStatus::Failed {
                    message: format!("Error loading data: {why}"),
                };
            }
        }

        self.emit_state_update();
    }

    /// Re-partition the visible markers at the current zoom. Works through the
    /// markers in chunks, yielding in between so input stays responsive.
    async fn recluster(&self) {
        let (generation, zoom, visible) = {
            let Some(mut state) = self.live_state().await else {
                return;
            };
            state.generation += 1;
            state.pass_zoom = Some(state.view.zoom);
            (state.generation, state.view.zoom, state.visible.clone())
        };

        let chunk_size = self.settings.cluster_chunk_size.max(1) as usize;
        let mut pass = self.strategy.begin(zoom, self.settings.cluster_radius_px);

        for chunk in visible.chunks(chunk_size) {
            for v in chunk {
                pass.push(&v.marker);
            }
            yield_now().await;
            if self.cancel.is_cancelled() {
                return;
            }
        }

        let clusters = pass.finish();

        let Some(mut state) = self.live_state().await else {
            return;
        };

        if state.generation != generation || state.view.zoom != zoom {
            debug!("Dropping stale cluster pass for zoom {zoom}");
            return;
        }

        debug!(
            "Clustered {} markers into {} groups at zoom {zoom}",
            visible.len(),
            clusters.len()
        );
        state.clusters = clusters;
        state.clustered_zoom = Some(zoom);
        drop(state);

        self.emit_state_update();
    }

    async fn move_view(&self, center: Option<LatLng>, zoom: Option<Zoom>) {
        let Some(mut state) = self.live_state().await else {
            return;
        };

        if let Some(center) = center {
            state.view.center = center;
        }

        if let Some(zoom) = zoom {
            state.view.zoom = self.settings.clamp_zoom(zoom);
        }
        let needs_recluster = state.needs_pass();
        drop(state);

        self.emit_state_update();

        if needs_recluster {
            self.recluster().await;
        }
    }

    /// User panned the map
    pub async fn pan_to(&self, center: LatLng) {
        self.move_view(Some(center), None).await;
    }

    /// User zoomed the map, clusters are rebuilt for the new level
    pub async fn set_zoom(&self, zoom: Zoom) {
        self.move_view(None, Some(zoom)).await;
    }

    /// Explicit "center on me", returns false if there's no device location
    pub async fn center_on_me(&self) -> bool {
        let Some(device) = self.device_location().await else {
            return false;
        };
        self.move_view(Some(device.position()), Some(self.settings.located_zoom))
            .await;
        true
    }

    /// The device moved, update the user marker but leave the view alone
    pub async fn update_location(&self, location: DeviceLocation) {
        let Some(mut state) = self.live_state().await else {
            return;
        };
        state.device = Some(location);
        if state.location != LocationStatus::Granted {
            debug!("Late location fix after {:?}", state.location);
            state.location = LocationStatus::Granted;
        }
        drop(state);
        self.emit_state_update();
    }

    pub async fn set_filter(&self, filter: SightingFilter) {
        let Some(mut state) = self.live_state().await else {
            return;
        };
        if state.filter == filter {
            return;
        }
        state.filter = filter;
        state.rebuild_visible();
        let has_features = state.features.is_some();
        drop(state);

        self.emit_state_update();

        if has_features {
            self.recluster().await;
        }
    }

    /// First zoom above `from` where `members` no longer form a single
    /// cluster. Each level is a chunked pass like [MapSession::recluster].
    async fn split_zoom(&self, members: &[Marker], from: Zoom) -> Option<Zoom> {
        let chunk_size = self.settings.cluster_chunk_size.max(1) as usize;

        for zoom in from.saturating_add(1)..=self.settings.max_zoom {
            let mut pass = self.strategy.begin(zoom, self.settings.cluster_radius_px);
            for chunk in members.chunks(chunk_size) {
                for marker in chunk {
                    pass.push(marker);
                }
                yield_now().await;
                if self.cancel.is_cancelled() {
                    return None;
                }
            }
            if pass.finish().len() > 1 {
                return Some(zoom);
            }
        }

        None
    }

    /// Tap on a rendered point, identified by its [RenderedPoint::key]
    pub async fn select(&self, key: u32) -> Option<Selection> {
        let state = self.state.read().await;
        if state.closed {
            return None;
        }

        let cluster = state.clusters.get(key as usize)?;

        if cluster.is_single() {
            return state.detail(cluster.members[0]).map(Selection::Marker);
        }

        let center = cluster.center;
        let details = cluster
            .members
            .iter()
            .filter_map(|&m| state.detail(m))
            .collect::<Vec<_>>();

        let split_from = match self.settings.cluster_select {
            ClusterSelectBehavior::Expand => None,
            ClusterSelectBehavior::ZoomIn => {
                let members = cluster
                    .members
                    .iter()
                    .filter_map(|&m| state.visible.get(m).map(|v| v.marker.clone()))
                    .collect::<Vec<_>>();
                Some((members, state.clustered_zoom.unwrap_or(state.view.zoom)))
            }
        };
        drop(state);

        let target = match split_from {
            Some((members, from)) => self.split_zoom(&members, from).await,
            None => None,
        };

        if self.cancel.is_cancelled() {
            return None;
        }

        Some(match target {
            Some(zoom) => {
                self.move_view(Some(center), Some(zoom)).await;
                Selection::ZoomTo { center, zoom }
            }
            None => Selection::Expanded {
                center,
                members: details,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::{sync::oneshot, test};

    use super::*;
    use crate::{
        settings::FALLBACK_CENTER,
        tests::{
            CountingSender, DummySender, MockLoader, MockLocation, sample_collection,
            sample_location,
        },
    };

    type TestSession = MapSession<MockLocation, MockLoader, DummySender>;

    fn session(location: MockLocation, loader: MockLoader) -> TestSession {
        MapSession::new(MapSettings::default(), location, loader, DummySender)
    }

    async fn settle() {
        // Let any pending cluster passes finish
        for _ in 0..50 {
            yield_now().await;
        }
    }

    fn point_total(ui: &MapUiState) -> u32 {
        ui.points.iter().map(RenderedPoint::count).sum()
    }

    #[test]
    async fn test_denied_uses_fallback() {
        let session = session(MockLocation::denied(), MockLoader::ok(sample_collection(30)));

        assert_eq!(session.phase().await, MapPhase::Initializing);
        assert_eq!(session.run().await, MapPhase::Ready);

        let ui = session.ui_state().await;
        assert_eq!(ui.location, LocationStatus::Denied);
        assert_eq!(ui.view.center, FALLBACK_CENTER);
        assert_eq!(ui.view.center, LatLng::new(40.7128, -74.0060));
        assert_eq!(ui.view.zoom, 10);
        assert!(ui.user_marker.is_none());
        assert!(ui.interactive);
        assert!(ui.loading_text.is_none());
        assert_eq!(point_total(&ui), 30);
    }

    #[test]
    async fn test_granted_centers_on_device() {
        let loc = sample_location(39.95, -75.16);
        let session = session(MockLocation::granted(loc), MockLoader::ok(sample_collection(30)));

        assert_eq!(session.run().await, MapPhase::Ready);

        let ui = session.ui_state().await;
        assert_eq!(ui.location, LocationStatus::Granted);
        assert_eq!(ui.view.center, LatLng::new(39.95, -75.16));
        assert_eq!(ui.view.zoom, 13);
        let user = ui.user_marker.as_ref().expect("No user marker");
        assert_eq!(user.position, loc.position());
        assert_eq!(user.popup, "Your location");
        // User marker is never a sighting point
        assert_eq!(point_total(&ui), 30);
    }

    #[test]
    async fn test_unavailable_position() {
        let session = session(
            MockLocation::unavailable(),
            MockLoader::ok(sample_collection(5)),
        );
        assert_eq!(session.run().await, MapPhase::Ready);
        let ui = session.ui_state().await;
        assert_eq!(ui.location, LocationStatus::Unavailable);
        assert_eq!(ui.view.center, FALLBACK_CENTER);
        assert!(ui.user_marker.is_none());
    }

    #[test]
    async fn test_data_failure_keeps_map_usable() {
        let loc = sample_location(40.0, -75.0);
        let session = session(MockLocation::granted(loc), MockLoader::failing("404 Not Found"));

        assert_eq!(session.run().await, MapPhase::Ready);

        let ui = session.ui_state().await;
        assert_eq!(
            ui.error_text.as_deref(),
            Some("Error loading data: 404 Not Found")
        );
        assert!(matches!(ui.data, DataStatus::Failed { .. }));
        assert!(ui.interactive);
        assert_eq!(ui.tile_layer, TileLayer::default());
        assert!(ui.user_marker.is_some());
        assert!(ui.points.is_empty());
        assert!(ui.loading_text.is_none());

        // Still pannable and zoomable
        session.pan_to(LatLng::new(41.0, -76.0)).await;
        session.set_zoom(12).await;
        let ui = session.ui_state().await;
        assert_eq!(ui.view.center, LatLng::new(41.0, -76.0));
        assert_eq!(ui.view.zoom, 12);
    }

    #[test(start_paused = true)]
    async fn test_location_timeout() {
        let session = session(MockLocation::hanging(), MockLoader::ok(sample_collection(3)));

        assert_eq!(session.run().await, MapPhase::Ready);

        let ui = session.ui_state().await;
        assert_eq!(ui.location, LocationStatus::TimedOut);
        assert_eq!(ui.view.center, FALLBACK_CENTER);
        assert!(ui.user_marker.is_none());
    }

    async fn run_in_order(data_first: bool) -> MapUiState {
        let (loc_tx, loc_rx) = oneshot::channel();
        let (data_tx, data_rx) = oneshot::channel();
        let session = session(
            MockLocation::granted(sample_location(39.9, -75.2)).gated(loc_rx),
            MockLoader::ok(sample_collection(400)).gated(data_rx),
        );

        let driver = async {
            let (first, second) = if data_first {
                (data_tx, loc_tx)
            } else {
                (loc_tx, data_tx)
            };
            first.send(()).ok();
            for _ in 0..100 {
                yield_now().await;
            }
            let phase = session.phase().await;
            if data_first {
                assert_eq!(phase, MapPhase::AwaitingLocation);
            } else {
                assert_eq!(phase, MapPhase::LoadingData);
            }
            second.send(()).ok();
        };

        let (phase, _) = tokio::join!(session.run(), driver);
        assert_eq!(phase, MapPhase::Ready);
        settle().await;
        session.ui_state().await
    }

    #[test]
    async fn test_arrival_order_does_not_matter() {
        let a = run_in_order(true).await;
        let b = run_in_order(false).await;

        assert_eq!(a.view, b.view);
        assert_eq!(a.view.zoom, 13);
        assert_eq!(a.points, b.points);
        assert_eq!(point_total(&a), 400);
    }

    #[test]
    async fn test_close_suppresses_updates() {
        let (sender, count) = CountingSender::new();
        let (_data_tx, data_rx) = oneshot::channel::<()>();
        let session = Arc::new(MapSession::new(
            MapSettings::default(),
            MockLocation::hanging(),
            MockLoader::ok(sample_collection(10)).gated(data_rx),
            sender,
        ));

        let handle = tokio::spawn({
            let session = session.clone();
            async move { session.run().await }
        });

        for _ in 0..10 {
            yield_now().await;
        }
        assert_eq!(session.phase().await, MapPhase::AwaitingLocation);

        session.close().await;
        let before = count.load(Ordering::SeqCst);

        assert_eq!(handle.await.expect("Failed to join"), MapPhase::Closed);

        session.update_location(sample_location(1.0, 1.0)).await;
        session.set_zoom(15).await;

        let ui = session.ui_state().await;
        assert_eq!(ui.phase, MapPhase::Closed);
        assert!(ui.user_marker.is_none());
        assert_eq!(ui.view.zoom, 10);
        assert!(!ui.interactive);
        assert_eq!(count.load(Ordering::SeqCst), before);
        assert!(session.select(0).await.is_none());
    }

    #[test]
    async fn test_run_after_close() {
        let session = session(MockLocation::denied(), MockLoader::ok(sample_collection(1)));
        session.close().await;
        assert_eq!(session.run().await, MapPhase::Closed);
    }

    #[test]
    async fn test_device_moves_without_recentering() {
        let session = session(
            MockLocation::granted(sample_location(40.0, -75.0)),
            MockLoader::ok(sample_collection(10)),
        );
        session.run().await;

        session.pan_to(LatLng::new(41.5, -77.0)).await;
        session.update_location(sample_location(40.1, -75.1)).await;

        let ui = session.ui_state().await;
        assert_eq!(ui.view.center, LatLng::new(41.5, -77.0));
        assert_eq!(
            ui.user_marker.map(|m| m.position),
            Some(LatLng::new(40.1, -75.1))
        );

        assert!(session.center_on_me().await);
        let ui = session.ui_state().await;
        assert_eq!(ui.view.center, LatLng::new(40.1, -75.1));
        assert_eq!(ui.view.zoom, 13);
    }

    #[test]
    async fn test_center_on_me_without_location() {
        let session = session(MockLocation::denied(), MockLoader::ok(sample_collection(1)));
        session.run().await;
        assert!(!session.center_on_me().await);
        assert_eq!(session.ui_state().await.view.center, FALLBACK_CENTER);
    }

    #[test]
    async fn test_late_fix_after_timeout_shows_marker() {
        let session = session(MockLocation::denied(), MockLoader::ok(sample_collection(1)));
        session.run().await;
        session.update_location(sample_location(40.5, -74.5)).await;
        let ui = session.ui_state().await;
        assert_eq!(ui.location, LocationStatus::Granted);
        assert!(ui.user_marker.is_some());
        assert_eq!(ui.view.center, FALLBACK_CENTER);
    }

    #[test]
    async fn test_zoom_reclusters() {
        let session = session(MockLocation::denied(), MockLoader::ok(sample_collection(500)));
        session.run().await;

        session.set_zoom(6).await;
        let far = session.ui_state().await;
        session.set_zoom(18).await;
        let near = session.ui_state().await;

        assert_eq!(far.view.zoom, 6);
        assert_eq!(near.view.zoom, 18);
        assert!(far.points.len() < near.points.len());
        assert_eq!(point_total(&far), 500);
        assert_eq!(point_total(&near), 500);

        session.set_zoom(40).await;
        assert_eq!(session.ui_state().await.view.zoom, 19);
    }

    #[test]
    async fn test_zoom_back_during_pass() {
        let settings = MapSettings {
            cluster_chunk_size: 8,
            ..Default::default()
        };
        let session = MapSession::new(
            settings,
            MockLocation::denied(),
            MockLoader::ok(sample_collection(500)),
            DummySender,
        );
        session.run().await;
        let at_ten = session.ui_state().await;
        assert_eq!(at_ten.view.zoom, 10);

        // Zoom back out while the zoom 18 pass is still working through chunks
        tokio::join!(session.set_zoom(18), async {
            for _ in 0..3 {
                yield_now().await;
            }
            session.set_zoom(10).await;
        });
        settle().await;

        let ui = session.ui_state().await;
        assert_eq!(ui.view.zoom, 10);
        assert_eq!(ui.points, at_ten.points);
        assert_eq!(point_total(&ui), 500);
    }

    #[test]
    async fn test_clustering_deterministic_across_sessions() {
        let a = session(MockLocation::denied(), MockLoader::ok(sample_collection(700)));
        let b = session(MockLocation::denied(), MockLoader::ok(sample_collection(700)));
        a.run().await;
        b.run().await;
        assert_eq!(a.ui_state().await.points, b.ui_state().await.points);
    }

    #[test]
    async fn test_filter_toggle() {
        let session = session(MockLocation::denied(), MockLoader::ok(sample_collection(100)));
        session.run().await;

        session
            .set_filter(SightingFilter {
                eradication_status: Some("treated".to_string()),
                visit_type: None,
            })
            .await;
        let ui = session.ui_state().await;
        assert_eq!(ui.total_sightings, 100);
        assert_eq!(ui.visible_sightings, 50);
        assert_eq!(point_total(&ui), 50);

        session.set_filter(SightingFilter::default()).await;
        let ui = session.ui_state().await;
        assert_eq!(ui.visible_sightings, 100);
        assert_eq!(point_total(&ui), 100);
    }

    #[test]
    async fn test_select_single_marker() {
        let session = session(MockLocation::denied(), MockLoader::ok(sample_collection(1)));
        session.run().await;

        let ui = session.ui_state().await;
        let key = ui.points[0].key();
        match session.select(key).await {
            Some(Selection::Marker(detail)) => {
                assert_eq!(detail.id, 1000);
                assert_eq!(detail.display_date, "6/1/2023");
            }
            other => panic!("Unexpected selection {other:?}"),
        }
        assert!(session.select(99).await.is_none());
    }

    #[test]
    async fn test_select_cluster_zooms_in() {
        let session = session(MockLocation::denied(), MockLoader::ok(sample_collection(200)));
        session.run().await;

        let ui = session.ui_state().await;
        let cluster = ui
            .points
            .iter()
            .find(|p| matches!(p, RenderedPoint::Cluster { .. }))
            .expect("No clusters at default zoom");

        match session.select(cluster.key()).await {
            Some(Selection::ZoomTo { zoom, .. }) => {
                assert!(zoom > 10);
                assert_eq!(session.ui_state().await.view.zoom, zoom);
            }
            other => panic!("Unexpected selection {other:?}"),
        }
    }

    #[test]
    async fn test_select_cluster_expand_behavior() {
        let settings = MapSettings {
            cluster_select: ClusterSelectBehavior::Expand,
            ..Default::default()
        };
        let session = MapSession::new(
            settings,
            MockLocation::denied(),
            MockLoader::ok(sample_collection(200)),
            DummySender,
        );
        session.run().await;

        let ui = session.ui_state().await;
        let cluster = ui
            .points
            .iter()
            .find(|p| matches!(p, RenderedPoint::Cluster { .. }))
            .expect("No clusters at default zoom");

        match session.select(cluster.key()).await {
            Some(Selection::Expanded { members, .. }) => {
                assert_eq!(members.len() as u32, cluster.count());
            }
            other => panic!("Unexpected selection {other:?}"),
        }
        assert_eq!(session.ui_state().await.view.zoom, 10);
    }

    #[test]
    async fn test_inseparable_cluster_expands_at_max_zoom() {
        let collection = FeatureCollection::new(
            sample_collection(3)
                .features
                .into_iter()
                .map(|mut f| {
                    f.geometry = crate::feature::Geometry::point(LatLng::new(40.0, -75.0));
                    f
                })
                .collect(),
        );
        let session = session(MockLocation::denied(), MockLoader::ok(collection));
        session.run().await;

        let ui = session.ui_state().await;
        assert_eq!(ui.points.len(), 1);
        match session.select(ui.points[0].key()).await {
            Some(Selection::Expanded { members, center }) => {
                assert_eq!(members.len(), 3);
                assert_eq!(center, LatLng::new(40.0, -75.0));
            }
            other => panic!("Unexpected selection {other:?}"),
        }
    }

    #[test]
    async fn test_select_yields_between_chunks() {
        let settings = MapSettings {
            cluster_chunk_size: 100,
            ..Default::default()
        };
        let collection = FeatureCollection::new(
            sample_collection(3000)
                .features
                .into_iter()
                .map(|mut f| {
                    f.geometry = crate::feature::Geometry::point(LatLng::new(40.0, -75.0));
                    f
                })
                .collect(),
        );
        let session = MapSession::new(
            settings,
            MockLocation::denied(),
            MockLoader::ok(collection),
            DummySender,
        );
        session.run().await;
        let key = session.ui_state().await.points[0].key();

        let done = std::sync::atomic::AtomicBool::new(false);
        let mut ticks = 0;
        let (selection, _) = tokio::join!(
            async {
                let selection = session.select(key).await;
                done.store(true, Ordering::SeqCst);
                selection
            },
            async {
                while !done.load(Ordering::SeqCst) {
                    ticks += 1;
                    yield_now().await;
                }
            }
        );

        // 9 zoom levels of 30 chunks each, other work runs in between
        assert!(ticks > 9, "only {ticks} ticks");
        match selection {
            Some(Selection::Expanded { members, .. }) => assert_eq!(members.len(), 3000),
            other => panic!("Unexpected selection {other:?}"),
        }
    }

    #[test]
    async fn test_large_dataset_chunks() {
        let settings = MapSettings {
            cluster_chunk_size: 64,
            ..Default::default()
        };
        let (sender, count) = CountingSender::new();
        let session = MapSession::new(
            settings,
            MockLocation::denied(),
            MockLoader::ok(sample_collection(5000)),
            sender,
        );

        assert_eq!(session.run().await, MapPhase::Ready);
        let ui = session.ui_state().await;
        assert_eq!(ui.data, DataStatus::Loaded { features: 5000 });
        assert_eq!(point_total(&ui), 5000);
        assert!(count.load(Ordering::SeqCst) > 0);
    }

    #[test]
    async fn test_loading_indicator_while_pending() {
        let (_data_tx, data_rx) = oneshot::channel::<()>();
        let session = session(
            MockLocation::denied(),
            MockLoader::ok(sample_collection(3)).gated(data_rx),
        );

        let driver = async {
            for _ in 0..20 {
                yield_now().await;
            }
            let ui = session.ui_state().await;
            assert_eq!(ui.phase, MapPhase::LoadingData);
            assert_eq!(ui.loading_text.as_deref(), Some(LOADING_TEXT));
            assert!(!ui.interactive);
            assert_eq!(ui.location, LocationStatus::Denied);
            session.close().await;
        };

        let (phase, _) = tokio::join!(session.run(), driver);
        assert_eq!(phase, MapPhase::Closed);
    }
}
