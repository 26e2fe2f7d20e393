//! Primary/secondary routing with single-shot failover

use chrono::{DateTime, Utc};

use super::{
    BackendKind, Credentials, PageCursor, PageProgress, RemoteError, RemoteSource, RouteFilter,
    RoutePage, RoutePayload, RouteWindow,
};
use crate::entities::{Face, Route, SocialCounts};

/// Delegates to a primary source, retrying once on an authenticated secondary
/// when `fallback` is enabled.
pub struct BackendRouter {
    primary: Box<dyn RemoteSource>,
    secondary: Option<Box<dyn RemoteSource>>,
    fallback: bool,
}

impl BackendRouter {
    pub fn new(primary: Box<dyn RemoteSource>) -> Self {
        Self {
            primary,
            secondary: None,
            fallback: false,
        }
    }

    pub fn with_secondary(mut self, secondary: Box<dyn RemoteSource>, fallback: bool) -> Self {
        self.secondary = Some(secondary);
        self.fallback = fallback;
        self
    }

    pub fn active_kind(&self) -> BackendKind {
        self.primary.kind()
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback
    }

    pub fn set_fallback(&mut self, fallback: bool) {
        self.fallback = fallback;
    }

    /// The active source alone, without failover.
    ///
    /// Anything that writes into the active source's local store must go
    /// through this: route ids of another source would collide in that store.
    pub fn primary(&self) -> &dyn RemoteSource {
        self.primary.as_ref()
    }

    pub fn primary_mut(&mut self) -> &mut dyn RemoteSource {
        self.primary.as_mut()
    }

    pub fn secondary_mut(&mut self) -> Option<&mut (dyn RemoteSource + 'static)> {
        self.secondary.as_deref_mut()
    }

    /// Make `kind` the primary source.
    ///
    /// Returns `false` when no configured source is of that kind. Local data is
    /// not migrated; each source keeps its own store.
    pub fn switch_to(&mut self, kind: BackendKind) -> bool {
        if self.primary.kind() == kind {
            return true;
        }
        match self.secondary.take() {
            Some(secondary) if secondary.kind() == kind => {
                let previous = std::mem::replace(&mut self.primary, secondary);
                self.secondary = Some(previous);
                tracing::info!(active = %kind, "switched remote source");
                true
            }
            other => {
                self.secondary = other;
                false
            }
        }
    }

    fn failover_target(&self, err: &RemoteError) -> Option<&dyn RemoteSource> {
        if !self.fallback || matches!(err, RemoteError::Validation(_) | RemoteError::Cancelled(_))
        {
            return None;
        }
        self.secondary
            .as_deref()
            .filter(|secondary| secondary.is_authenticated())
    }

    fn dispatch<T>(
        &self,
        operation: &str,
        mut call: impl FnMut(&dyn RemoteSource) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        match call(self.primary.as_ref()) {
            Ok(value) => Ok(value),
            Err(err) => match self.failover_target(&err) {
                Some(secondary) => {
                    tracing::warn!(
                        operation,
                        from = %self.primary.kind(),
                        to = %secondary.kind(),
                        error = %err,
                        "primary source failed, retrying on secondary"
                    );
                    call(secondary)
                }
                None => Err(err),
            },
        }
    }
}

impl RemoteSource for BackendRouter {
    fn kind(&self) -> BackendKind {
        self.primary.kind()
    }

    fn is_authenticated(&self) -> bool {
        self.primary.is_authenticated()
    }

    fn authenticate(&mut self, credentials: &Credentials) -> Result<String, RemoteError> {
        self.primary.authenticate(credentials)
    }

    fn list_face_ids(&self) -> Result<Vec<String>, RemoteError> {
        self.dispatch("list_face_ids", |source| source.list_face_ids())
    }

    fn list_routes(
        &self,
        filter: &RouteFilter,
        cursor: Option<&PageCursor>,
    ) -> Result<RoutePage, RemoteError> {
        self.dispatch("list_routes", |source| source.list_routes(filter, cursor))
    }

    fn list_all_routes(
        &self,
        filter: &RouteFilter,
        progress: &mut PageProgress<'_>,
    ) -> Result<Vec<Route>, RemoteError> {
        // A retry restarts pagination; keep the reported position from going backwards.
        let mut high_water = 0u64;
        let mut clamped = |current: u64, total: u64| {
            high_water = high_water.max(current);
            progress(high_water, total.max(high_water))
        };
        self.dispatch("list_all_routes", |source| {
            source.list_all_routes(filter, &mut clamped)
        })
    }

    fn get_face_holds(&self, face_id: &str) -> Result<Face, RemoteError> {
        self.dispatch("get_face_holds", |source| source.get_face_holds(face_id))
    }

    fn create_route(&self, face_id: &str, payload: &RoutePayload) -> Result<Route, RemoteError> {
        self.primary.create_route(face_id, payload)
    }

    fn update_route(&self, route_id: &str, payload: &RoutePayload) -> Result<Route, RemoteError> {
        self.primary.update_route(route_id, payload)
    }

    fn get_social_counts(&self, route_id: &str) -> Result<SocialCounts, RemoteError> {
        self.dispatch("get_social_counts", |source| {
            source.get_social_counts(route_id)
        })
    }

    fn incremental_window(&self, last_sync: DateTime<Utc>, now: DateTime<Utc>) -> RouteWindow {
        self.primary.incremental_window(last_sync, now)
    }

    fn snapshot_source(&self) -> Option<&dyn RemoteSource> {
        Some(self.primary())
    }
}
