//! Route creation and editing against the active remote source
//!
//! The local store only learns about a route once the remote has acknowledged it.

use miette::Result;

use crate::core::sync::SyncEngine;
use crate::entities::Route;
use crate::remote::RoutePayload;

impl SyncEngine<'_> {
    /// Create a route on `face_id` and persist the remote's copy of it
    pub fn publish_route(&mut self, face_id: &str, payload: &RoutePayload) -> Result<Route> {
        payload.validate_for_create()?;

        let route = self.remote.create_route(face_id, payload)?;
        self.store.save_route(&route)?;
        tracing::info!(route = %route.id, face = %face_id, "published route");
        Ok(route)
    }

    /// Apply a partial update to an existing route and persist the result.
    ///
    /// When the payload carries no face id, the face of the stored route is used.
    pub fn amend_route(&mut self, route_id: &str, payload: &RoutePayload) -> Result<Route> {
        payload.validate_for_update()?;

        let mut payload = payload.clone();
        if payload.face_id.is_none() {
            payload.face_id = self.store.get_route(route_id).map(|r| r.face_id);
        }

        let route = self.remote.update_route(route_id, &payload)?;
        self.store.save_route(&route)?;
        tracing::info!(route = %route.id, "amended route");
        Ok(route)
    }
}
