//! Full and incremental synchronization between a remote source and a local store
//!
//! Runs are blocking and sequential. Progress callbacks double as cancellation
//! points: returning `Err(Cancelled)` stops the run, and rows written so far stay.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use miette::{Diagnostic, Result};
use serde::Serialize;
use thiserror::Error;

use crate::core::store::LocalStore;
use crate::entities::Route;
use crate::remote::{RemoteError, RemoteSource, RouteFilter, RouteWindow};

/// A sync older than this is stale
pub const SYNC_MAX_AGE_HOURS: i64 = 24;

/// Routes persisted per transaction (and per progress report) while saving
const SAVE_CHUNK: usize = 200;

/// Returned by a progress callback to stop the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Diagnostic)]
#[error("sync cancelled")]
#[diagnostic(code(mastoc::sync::cancelled))]
pub struct Cancelled;

/// Progress callback: `(current, total, message)`
pub type SyncProgress<'a> = dyn FnMut(u64, u64, &str) -> Result<(), Cancelled> + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Incremental,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Full => write!(f, "full"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Outcome of one sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub routes_added: usize,
    pub routes_updated: usize,
    pub holds_added: usize,
    pub routes_downloaded: usize,
    pub total_routes_local: usize,
    pub mode: SyncMode,
}

impl SyncResult {
    fn new(mode: SyncMode) -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            routes_added: 0,
            routes_updated: 0,
            holds_added: 0,
            routes_downloaded: 0,
            total_routes_local: 0,
            mode,
        }
    }
}

/// Snapshot of the local store's freshness
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub last_sync: Option<DateTime<Utc>>,
    pub route_count: usize,
    pub hold_count: usize,
    pub is_synced: bool,
}

/// Outcome of a social-counter refresh
#[derive(Debug, Clone, Default, Serialize)]
pub struct SocialRefreshReport {
    pub total: usize,
    pub updated: usize,
    pub errors: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Only sync this face
    pub face_id: Option<String>,
}

/// Why a run stopped early
enum Halt {
    /// Authentication failure or cancellation; reported in the result
    Abort(String),
    /// Local store failure; returned to the caller
    Store(miette::Report),
}

impl From<miette::Report> for Halt {
    fn from(err: miette::Report) -> Self {
        Halt::Store(err)
    }
}

impl From<Cancelled> for Halt {
    fn from(err: Cancelled) -> Self {
        Halt::Abort(err.to_string())
    }
}

/// Drives sync runs between one remote source and one local store.
///
/// A [`BackendRouter`](crate::remote::BackendRouter) is reduced to its active
/// source: data from the secondary would land under foreign ids.
pub struct SyncEngine<'a> {
    pub(crate) remote: &'a dyn RemoteSource,
    pub(crate) store: &'a mut LocalStore,
    options: SyncOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(remote: &'a dyn RemoteSource, store: &'a mut LocalStore) -> Self {
        Self {
            remote: remote.snapshot_source().unwrap_or(remote),
            store,
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &LocalStore {
        &*self.store
    }

    pub fn status(&self) -> SyncStatus {
        let last_sync = self.store.last_sync();
        let route_count = self.store.route_count();
        SyncStatus {
            last_sync,
            route_count,
            hold_count: self.store.hold_count(),
            is_synced: last_sync.is_some() && route_count > 0,
        }
    }

    /// True when never synced, the store is empty, or the last sync is stale
    pub fn needs_sync(&self, now: DateTime<Utc>) -> bool {
        match self.store.last_sync() {
            None => true,
            Some(_) if self.store.route_count() == 0 => true,
            Some(last) => now - last > chrono::Duration::hours(SYNC_MAX_AGE_HOURS),
        }
    }

    /// Download every face, hold and route.
    ///
    /// With `clear_existing`, the store is wiped first. Failures of single faces
    /// are recorded and skipped; a failed listing step marks the run unsuccessful.
    pub fn sync_full(
        &mut self,
        clear_existing: bool,
        progress: &mut SyncProgress<'_>,
    ) -> Result<SyncResult> {
        let mut result = SyncResult::new(SyncMode::Full);
        let started = Utc::now();
        tracing::info!(backend = %self.remote.kind(), clear_existing, "starting full sync");

        let outcome = self.run_full(&mut result, clear_existing, progress);
        self.finish(result, outcome, started)
    }

    /// Fetch routes created since the last sync and apply new ones and changed ones.
    ///
    /// Falls back to a full sync when the store has never been synced.
    pub fn sync_incremental(&mut self, progress: &mut SyncProgress<'_>) -> Result<SyncResult> {
        let Some(last_sync) = self.store.last_sync() else {
            tracing::info!("no previous sync, running a full sync instead");
            return self.sync_full(false, progress);
        };

        let mut result = SyncResult::new(SyncMode::Incremental);
        let started = Utc::now();
        tracing::info!(backend = %self.remote.kind(), %last_sync, "starting incremental sync");

        let outcome = self.run_incremental(&mut result, last_sync, started, progress);
        self.finish(result, outcome, started)
    }

    fn finish(
        &mut self,
        mut result: SyncResult,
        outcome: std::result::Result<(), Halt>,
        started: DateTime<Utc>,
    ) -> Result<SyncResult> {
        match outcome {
            Ok(()) => {}
            Err(Halt::Abort(message)) => {
                tracing::warn!(%message, "sync aborted");
                result.success = false;
                result.errors.push(message);
            }
            Err(Halt::Store(err)) => return Err(err),
        }

        if result.success {
            self.store.set_last_sync(started)?;
        }
        result.total_routes_local = self.store.route_count();

        tracing::info!(
            mode = %result.mode,
            success = result.success,
            added = result.routes_added,
            updated = result.routes_updated,
            holds = result.holds_added,
            errors = result.errors.len(),
            "sync finished"
        );
        Ok(result)
    }

    fn run_full(
        &mut self,
        result: &mut SyncResult,
        clear_existing: bool,
        progress: &mut SyncProgress<'_>,
    ) -> std::result::Result<(), Halt> {
        if clear_existing {
            self.store.clear_all()?;
        }

        progress(0, 0, "Listing faces")?;
        let face_ids = match self.face_ids() {
            Ok(ids) => ids,
            Err(err) => {
                step_failed(result, "listing faces", err)?;
                Vec::new()
            }
        };

        let face_total = face_ids.len() as u64;
        for (i, face_id) in face_ids.iter().enumerate() {
            progress(i as u64, face_total, &format!("Fetching holds for face {}", face_id))?;
            match self.remote.get_face_holds(face_id) {
                Ok(face) => {
                    let saved = self.store.save_face(&face)?;
                    tracing::debug!(face = %face_id, holds = saved, "saved face");
                    result.holds_added += saved;
                }
                Err(err) if err.is_fatal() => return Err(Halt::Abort(err.to_string())),
                Err(err) => {
                    tracing::warn!(face = %face_id, error = %err, "skipping face");
                    result.errors.push(format!("face {}: {}", face_id, err));
                }
            }
        }
        progress(face_total, face_total, "Holds downloaded")?;

        let filter = RouteFilter {
            face_id: self.options.face_id.clone(),
            window: RouteWindow::All,
        };
        let routes = match self.fetch_routes(&filter, progress) {
            Ok(routes) => routes,
            Err(err) => return step_failed(result, "fetching routes", err),
        };

        result.routes_downloaded = routes.len();
        result.routes_added = routes.len();
        self.save_in_chunks(&routes, progress)?;
        Ok(())
    }

    fn run_incremental(
        &mut self,
        result: &mut SyncResult,
        last_sync: DateTime<Utc>,
        now: DateTime<Utc>,
        progress: &mut SyncProgress<'_>,
    ) -> std::result::Result<(), Halt> {
        let filter = RouteFilter {
            face_id: self.options.face_id.clone(),
            window: self.remote.incremental_window(last_sync, now),
        };
        tracing::debug!(window = ?filter.window, "incremental window");

        let routes = match self.fetch_routes(&filter, progress) {
            Ok(routes) => routes,
            Err(err) => return step_failed(result, "fetching routes", err),
        };
        result.routes_downloaded = routes.len();

        let local_ids = self.store.route_ids();
        let mut added = Vec::new();
        let mut updated = Vec::new();
        for route in routes {
            if !local_ids.contains(&route.id) {
                added.push(route);
            } else if self
                .store
                .get_route(&route.id)
                .map_or(true, |local| local.counters_or_holds_differ(&route))
            {
                updated.push(route);
            }
        }

        result.routes_added = added.len();
        result.routes_updated = updated.len();
        added.append(&mut updated);
        self.save_in_chunks(&added, progress)?;
        Ok(())
    }

    fn face_ids(&self) -> std::result::Result<Vec<String>, RemoteError> {
        let ids = self.remote.list_face_ids()?;
        Ok(match &self.options.face_id {
            Some(only) => ids.into_iter().filter(|id| id == only).collect(),
            None => ids,
        })
    }

    fn fetch_routes(
        &self,
        filter: &RouteFilter,
        progress: &mut SyncProgress<'_>,
    ) -> std::result::Result<Vec<Route>, RemoteError> {
        self.remote.list_all_routes(filter, &mut |current, total| {
            progress(current, total, "Fetching routes")
                .map_err(|c| RemoteError::Cancelled(c.to_string()))
        })
    }

    fn save_in_chunks(
        &mut self,
        routes: &[Route],
        progress: &mut SyncProgress<'_>,
    ) -> std::result::Result<(), Halt> {
        let total = routes.len() as u64;
        let mut saved = 0u64;
        for chunk in routes.chunks(SAVE_CHUNK) {
            saved += self.store.save_routes(chunk)? as u64;
            progress(saved, total, "Saving routes")?;
        }
        Ok(())
    }

    /// Re-fetch one route's social counters; returns whether they changed
    pub fn refresh_social_counts(&self, route_id: &str) -> Result<bool> {
        let counts = self.remote.get_social_counts(route_id)?;
        self.store.update_social_counts(route_id, &counts)
    }

    /// Refresh social counters of every stored route, pausing `delay` between
    /// remote calls.
    ///
    /// Per-route failures are counted and skipped; authentication failures stop
    /// the refresh with an error.
    pub fn refresh_all_social_counts(
        &self,
        delay: Duration,
        progress: &mut SyncProgress<'_>,
    ) -> Result<SocialRefreshReport> {
        let route_ids: Vec<String> = self
            .store
            .get_all_routes()
            .into_iter()
            .map(|r| r.id)
            .collect();

        let mut report = SocialRefreshReport {
            total: route_ids.len(),
            ..Default::default()
        };
        let total = route_ids.len() as u64;

        for (i, route_id) in route_ids.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                thread::sleep(delay);
            }

            match self.remote.get_social_counts(route_id) {
                Ok(counts) => {
                    if self.store.update_social_counts(route_id, &counts)? {
                        report.updated += 1;
                    }
                }
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(route = %route_id, error = %err, "social refresh failed");
                    report.errors += 1;
                }
            }

            if progress(i as u64 + 1, total, "Refreshing social counts").is_err() {
                report.cancelled = true;
                break;
            }
        }

        Ok(report)
    }
}

/// Record a failed step; fatal errors abort the run instead
fn step_failed(
    result: &mut SyncResult,
    step: &str,
    err: RemoteError,
) -> std::result::Result<(), Halt> {
    if err.is_fatal() {
        return Err(Halt::Abort(err.to_string()));
    }
    tracing::warn!(step, error = %err, "sync step failed");
    result.success = false;
    result.errors.push(format!("{}: {}", step, err));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Face, SocialCounts};
    use crate::remote::{BackendKind, Credentials, PageCursor, RoutePage, RoutePayload};
    use chrono::TimeZone;

    /// Source with a fixed route list and no faces
    struct StaticSource {
        routes: Vec<Route>,
    }

    impl RemoteSource for StaticSource {
        fn kind(&self) -> BackendKind {
            BackendKind::Managed
        }
        fn is_authenticated(&self) -> bool {
            true
        }
        fn authenticate(&mut self, _: &Credentials) -> std::result::Result<String, RemoteError> {
            Ok(String::new())
        }
        fn list_face_ids(&self) -> std::result::Result<Vec<String>, RemoteError> {
            Ok(vec![])
        }
        fn list_routes(
            &self,
            _: &RouteFilter,
            _: Option<&PageCursor>,
        ) -> std::result::Result<RoutePage, RemoteError> {
            Ok(RoutePage {
                items: self.routes.clone(),
                total: self.routes.len() as u64,
                next: None,
            })
        }
        fn get_face_holds(&self, id: &str) -> std::result::Result<Face, RemoteError> {
            Err(RemoteError::NotFound {
                backend: BackendKind::Managed,
                resource: id.to_string(),
            })
        }
        fn create_route(&self, _: &str, _: &RoutePayload) -> std::result::Result<Route, RemoteError> {
            Err(RemoteError::Validation("read only".to_string()))
        }
        fn update_route(&self, _: &str, _: &RoutePayload) -> std::result::Result<Route, RemoteError> {
            Err(RemoteError::Validation("read only".to_string()))
        }
        fn get_social_counts(&self, _: &str) -> std::result::Result<SocialCounts, RemoteError> {
            Ok(SocialCounts::default())
        }
        fn incremental_window(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> RouteWindow {
            RouteWindow::All
        }
    }

    fn route(id: &str) -> Route {
        Route {
            id: id.to_string(),
            name: id.to_string(),
            holds_list: "S1 T2".to_string(),
            grade: None,
            setter: None,
            face_id: "f".to_string(),
            feet_rule: None,
            is_private: false,
            ascents: 0,
            likes: 0,
            comments: 0,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_needs_sync() {
        let source = StaticSource { routes: vec![] };
        let mut store = LocalStore::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();

        assert!(SyncEngine::new(&source, &mut store).needs_sync(now));

        store.save_route(&route("r1")).unwrap();
        store.set_last_sync(now - chrono::Duration::hours(2)).unwrap();
        assert!(!SyncEngine::new(&source, &mut store).needs_sync(now));

        store.set_last_sync(now - chrono::Duration::hours(25)).unwrap();
        assert!(SyncEngine::new(&source, &mut store).needs_sync(now));
    }

    #[test]
    fn test_status_reports_counts() {
        let source = StaticSource {
            routes: vec![route("a"), route("b")],
        };
        let mut store = LocalStore::open_in_memory().unwrap();
        let mut engine = SyncEngine::new(&source, &mut store);
        assert!(!engine.status().is_synced);

        let result = engine.sync_full(false, &mut |_, _, _| Ok(())).unwrap();
        assert!(result.success);

        let status = engine.status();
        assert_eq!(status.route_count, 2);
        assert!(status.is_synced);
        assert!(status.last_sync.is_some());
    }

    #[test]
    fn test_incremental_without_last_sync_runs_full() {
        let source = StaticSource {
            routes: vec![route("a")],
        };
        let mut store = LocalStore::open_in_memory().unwrap();
        let result = SyncEngine::new(&source, &mut store)
            .sync_incremental(&mut |_, _, _| Ok(()))
            .unwrap();
        assert_eq!(result.mode, SyncMode::Full);
        assert_eq!(result.routes_added, 1);
    }

    #[test]
    fn test_progress_messages_are_monotonic() {
        let source = StaticSource {
            routes: (0..450).map(|i| route(&format!("r{}", i))).collect(),
        };
        let mut store = LocalStore::open_in_memory().unwrap();
        let mut saves = Vec::new();
        SyncEngine::new(&source, &mut store)
            .sync_full(false, &mut |current, total, message| {
                if message == "Saving routes" {
                    saves.push((current, total));
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(saves, vec![(200, 450), (400, 450), (450, 450)]);
    }

    #[test]
    fn test_throttled_refresh_skips_trailing_delay() {
        let source = StaticSource { routes: vec![] };
        let mut store = LocalStore::open_in_memory().unwrap();
        store.save_route(&route("only")).unwrap();

        let engine = SyncEngine::new(&source, &mut store);
        let started = std::time::Instant::now();
        let report = engine
            .refresh_all_social_counts(Duration::from_millis(300), &mut |_, _, _| Ok(()))
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(report.total, 1);
        assert_eq!(report.updated, 0);
    }
}
