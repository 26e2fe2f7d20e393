//! Managed REST API client
//!
//! snake_case JSON, page/page_size pagination and `since_created_at` windows.
//! Requests carry either a static `X-API-Key` or a bearer token obtained from
//! `POST api/auth/login`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{
    check_status, non_empty, parse_remote_timestamp, BackendKind, Credentials, PageCursor,
    RemoteError, RemoteSource, RouteFilter, RoutePage, RoutePayload, RouteWindow,
};
use crate::entities::{
    parse_centroid, parse_polygon, Face, FacePicture, Grade, Hold, Route, Setter, SocialCounts,
};

/// Largest page the API serves
pub const PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone)]
enum Auth {
    ApiKey(String),
    Bearer(String),
}

pub struct ManagedService {
    http: Client,
    base_url: String,
    auth: Option<Auth>,
}

impl ManagedService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mastoc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::transport(BackendKind::Managed, e))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        if let Some(key) = non_empty(api_key) {
            self.auth = Some(Auth::ApiKey(key));
        }
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, RemoteError> {
        match &self.auth {
            Some(Auth::ApiKey(key)) => Ok(req.header("X-API-Key", key)),
            Some(Auth::Bearer(token)) => Ok(req.bearer_auth(token)),
            None => Err(RemoteError::unauthenticated(BackendKind::Managed)),
        }
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        req: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = self
            .authorized(req)?
            .send()
            .map_err(|e| RemoteError::transport(BackendKind::Managed, e))?;
        let response = check_status(BackendKind::Managed, resource, response)?;
        response
            .json::<T>()
            .map_err(|e| RemoteError::transport(BackendKind::Managed, e))
    }

    fn since_created_at(window: &RouteWindow, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match window {
            RouteWindow::All => None,
            RouteWindow::MaxAgeDays(days) => Some(now - chrono::Duration::days(*days as i64)),
            RouteWindow::CreatedSince(since) => Some(*since),
        }
    }
}

impl RemoteSource for ManagedService {
    fn kind(&self) -> BackendKind {
        BackendKind::Managed
    }

    fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    fn authenticate(&mut self, credentials: &Credentials) -> Result<String, RemoteError> {
        match credentials {
            Credentials::Password { username, password } => {
                let response = self
                    .http
                    .post(self.url("api/auth/login"))
                    .form(&[("username", username), ("password", password)])
                    .send()
                    .map_err(|e| RemoteError::transport(BackendKind::Managed, e))?;
                let response = check_status(BackendKind::Managed, "api/auth/login", response)?;
                let body: LoginResponse = response
                    .json()
                    .map_err(|e| RemoteError::transport(BackendKind::Managed, e))?;
                let token =
                    non_empty(body.access_token).ok_or_else(|| RemoteError::Authentication {
                        backend: BackendKind::Managed,
                        message: "login response carried no access token".to_string(),
                    })?;
                tracing::info!(backend = "managed", "authenticated with password");
                self.auth = Some(Auth::Bearer(token.clone()));
                Ok(token)
            }
            Credentials::Token(token) => {
                self.auth = Some(Auth::Bearer(token.clone()));
                Ok(token.clone())
            }
            Credentials::ApiKey(key) => {
                self.auth = Some(Auth::ApiKey(key.clone()));
                Ok(key.clone())
            }
        }
    }

    fn list_face_ids(&self) -> Result<Vec<String>, RemoteError> {
        let faces: Vec<ManagedFaceRef> =
            self.send_json("api/faces", self.http.get(self.url("api/faces")))?;
        Ok(faces.into_iter().map(|f| f.id).collect())
    }

    fn list_routes(
        &self,
        filter: &RouteFilter,
        cursor: Option<&PageCursor>,
    ) -> Result<RoutePage, RemoteError> {
        let page = match cursor {
            None => 1,
            Some(PageCursor::Page(page)) => *page,
            Some(PageCursor::Url(url)) => {
                return Err(RemoteError::Network {
                    backend: BackendKind::Managed,
                    message: format!("URL cursor {} not supported", url),
                })
            }
        };

        let mut query: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("page_size", PAGE_SIZE.to_string()),
        ];
        if let Some(face_id) = &filter.face_id {
            query.push(("face_id", face_id.clone()));
        }
        if let Some(since) = Self::since_created_at(&filter.window, Utc::now()) {
            query.push(("since_created_at", since.to_rfc3339()));
        }

        let body: ManagedPage =
            self.send_json("api/climbs", self.http.get(self.url("api/climbs")).query(&query))?;
        Ok(body.into_route_page(page))
    }

    fn get_face_holds(&self, face_id: &str) -> Result<Face, RemoteError> {
        let resource = format!("api/faces/{}/setup", face_id);
        let face: ManagedFace = self.send_json(&resource, self.http.get(self.url(&resource)))?;
        Ok(face.into_face())
    }

    fn create_route(&self, face_id: &str, payload: &RoutePayload) -> Result<Route, RemoteError> {
        payload.validate_for_create()?;
        let mut body = payload_json(payload);
        body["face_id"] = json!(face_id);
        body["is_private"] = json!(payload.is_private.unwrap_or(false));

        let climb: ManagedClimb =
            self.send_json("api/climbs", self.http.post(self.url("api/climbs")).json(&body))?;
        Ok(climb.into_route())
    }

    fn update_route(&self, route_id: &str, payload: &RoutePayload) -> Result<Route, RemoteError> {
        payload.validate_for_update()?;
        let resource = format!("api/climbs/{}", route_id);
        let climb: ManagedClimb = self.send_json(
            &resource,
            self.http
                .patch(self.url(&resource))
                .json(&payload_json(payload)),
        )?;
        Ok(climb.into_route())
    }

    fn get_social_counts(&self, route_id: &str) -> Result<SocialCounts, RemoteError> {
        let resource = format!("api/climbs/{}", route_id);
        let climb: ManagedClimb = self.send_json(&resource, self.http.get(self.url(&resource)))?;
        Ok(SocialCounts {
            ascents: Some(climb.climbed_by.unwrap_or(0)),
            likes: climb.total_likes.unwrap_or(0),
            comments: climb.total_comments.unwrap_or(0),
        })
    }

    fn incremental_window(&self, last_sync: DateTime<Utc>, _now: DateTime<Utc>) -> RouteWindow {
        RouteWindow::CreatedSince(last_sync - chrono::Duration::days(1))
    }
}

/// Only the fields set on the payload are sent
fn payload_json(payload: &RoutePayload) -> JsonValue {
    let mut body = serde_json::Map::new();
    let mut put = |key: &str, value: JsonValue| {
        body.insert(key.to_string(), value);
    };

    if let Some(v) = &payload.name {
        put("name", json!(v));
    }
    if let Some(v) = &payload.holds_list {
        put("holds_list", json!(v));
    }
    if let Some(v) = &payload.grade_font {
        put("grade_font", json!(v));
    }
    if let Some(v) = payload.grade_ircra {
        put("grade_ircra", json!(v));
    }
    if let Some(v) = &payload.feet_rule {
        put("feet_rule", json!(v));
    }
    if let Some(v) = &payload.description {
        put("description", json!(v));
    }
    if let Some(v) = payload.is_private {
        put("is_private", json!(v));
    }

    JsonValue::Object(body)
}

// =========================================================================
// Wire types
// =========================================================================

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManagedFaceRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ManagedPage {
    #[serde(default)]
    results: Vec<ManagedClimb>,
    #[serde(default)]
    count: u64,
    page: Option<u32>,
    page_size: Option<u32>,
}

impl ManagedPage {
    fn into_route_page(self, requested_page: u32) -> RoutePage {
        let page = self.page.unwrap_or(requested_page);
        let page_size = self.page_size.unwrap_or(PAGE_SIZE) as u64;
        let has_more = !self.results.is_empty() && (page as u64) * page_size < self.count;

        RoutePage {
            items: self
                .results
                .into_iter()
                .map(ManagedClimb::into_route)
                .collect(),
            total: self.count,
            next: has_more.then_some(PageCursor::Page(page + 1)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ManagedClimb {
    id: String,
    name: Option<String>,
    holds_list: Option<String>,
    grade_font: Option<String>,
    grade_ircra: Option<f64>,
    feet_rule: Option<String>,
    is_private: Option<bool>,
    face_id: Option<String>,
    setter_id: Option<String>,
    setter_name: Option<String>,
    climbed_by: Option<u32>,
    total_likes: Option<u32>,
    total_comments: Option<u32>,
    created_at: Option<String>,
}

impl ManagedClimb {
    fn into_route(self) -> Route {
        let setter = non_empty(self.setter_name).map(|name| Setter {
            id: non_empty(self.setter_id).unwrap_or_else(|| name.clone()),
            name,
        });

        let grade = match (self.grade_ircra, non_empty(self.grade_font)) {
            (None, None) => None,
            (ircra, font) => Some(Grade {
                ircra: ircra.unwrap_or(0.0),
                font: font.unwrap_or_default(),
            }),
        };

        Route {
            id: self.id,
            name: self.name.unwrap_or_default(),
            holds_list: self.holds_list.unwrap_or_default(),
            grade,
            setter,
            face_id: self.face_id.unwrap_or_default(),
            feet_rule: non_empty(self.feet_rule),
            is_private: self.is_private.unwrap_or(false),
            ascents: self.climbed_by.unwrap_or(0),
            likes: self.total_likes.unwrap_or(0),
            comments: self.total_comments.unwrap_or(0),
            created_at: self
                .created_at
                .as_deref()
                .and_then(parse_remote_timestamp)
                .unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ManagedFace {
    id: String,
    picture: Option<ManagedPicture>,
    #[serde(default)]
    feet_rules_options: Vec<String>,
    has_symmetry: Option<bool>,
    #[serde(default)]
    holds: Vec<ManagedHold>,
}

#[derive(Debug, Deserialize)]
struct ManagedPicture {
    name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ManagedHold {
    id: i64,
    /// Id on the legacy service; routes imported from there reference it
    stokt_id: Option<i64>,
    polygon_str: Option<String>,
    centroid_str: Option<String>,
    centroid_x: Option<f64>,
    centroid_y: Option<f64>,
    area: Option<f64>,
}

impl ManagedFace {
    fn into_face(self) -> Face {
        let face_id = self.id;
        let holds = self
            .holds
            .into_iter()
            .map(|h| {
                let centroid = match (h.centroid_x, h.centroid_y) {
                    (Some(x), Some(y)) => (x, y),
                    _ => parse_centroid(h.centroid_str.as_deref().unwrap_or("")),
                };
                Hold {
                    id: h.stokt_id.unwrap_or(h.id),
                    face_id: face_id.clone(),
                    polygon: parse_polygon(h.polygon_str.as_deref().unwrap_or("")),
                    centroid,
                    area: h.area.unwrap_or(0.0),
                }
            })
            .collect();

        Face {
            picture: self.picture.map(|p| FacePicture {
                name: p.name.unwrap_or_default(),
                width: p.width.unwrap_or(0),
                height: p.height.unwrap_or(0),
            }),
            has_symmetry: self.has_symmetry.unwrap_or(false),
            feet_rules: self.feet_rules_options,
            holds,
            id: face_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service() -> ManagedService {
        ManagedService::new("http://localhost:8000", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_page_has_more() {
        let json = r#"{
            "results": [
                {"id": "r1", "name": "One", "holds_list": "S1 T2", "face_id": "f",
                 "grade_font": "6a", "grade_ircra": 17.0,
                 "setter_id": null, "setter_name": "Bob",
                 "climbed_by": 3, "total_likes": 1,
                 "created_at": "2024-05-01T08:00:00"}
            ],
            "count": 501, "page": 1, "page_size": 500
        }"#;
        let page: ManagedPage = serde_json::from_str(json).unwrap();
        let page = page.into_route_page(1);
        assert_eq!(page.next, Some(PageCursor::Page(2)));
        assert_eq!(page.total, 501);

        let route = &page.items[0];
        assert_eq!(route.setter.as_ref().unwrap().id, "Bob");
        assert_eq!(route.ircra(), 17.0);
        assert_eq!(route.comments, 0);
        assert_eq!(
            route.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_last_and_empty_pages() {
        let last: ManagedPage =
            serde_json::from_str(r#"{"results": [{"id": "r"}], "count": 501, "page": 2, "page_size": 500}"#)
                .unwrap();
        assert!(last.into_route_page(2).next.is_none());

        let empty: ManagedPage =
            serde_json::from_str(r#"{"results": [], "count": 900, "page": 1, "page_size": 500}"#)
                .unwrap();
        let page = empty.into_route_page(1);
        assert!(page.items.is_empty());
        assert!(page.next.is_none());
    }

    #[test]
    fn test_face_prefers_legacy_hold_ids() {
        let json = r#"{
            "id": "face-1",
            "picture": {"name": "p.jpg", "width": 10, "height": 20},
            "holds": [
                {"id": 5, "stokt_id": 829279, "polygon_str": "0,0 1,1", "centroid_x": 0.5, "centroid_y": 0.5},
                {"id": 6, "polygon_str": "", "centroid_str": "3 4"}
            ]
        }"#;
        let face: ManagedFace = serde_json::from_str(json).unwrap();
        let face = face.into_face();
        assert_eq!(face.holds[0].id, 829279);
        assert_eq!(face.holds[0].centroid, (0.5, 0.5));
        assert_eq!(face.holds[1].id, 6);
        assert_eq!(face.holds[1].centroid, (3.0, 4.0));
        assert!(face.holds[1].polygon.is_empty());
    }

    #[test]
    fn test_incremental_window_backs_off_one_day() {
        let svc = service();
        let last = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 9, 0, 0).unwrap();
        assert_eq!(
            svc.incremental_window(last, now),
            RouteWindow::CreatedSince(Utc.with_ymd_and_hms(2024, 6, 9, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_max_age_becomes_since_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap();
        assert_eq!(
            ManagedService::since_created_at(&RouteWindow::MaxAgeDays(7), now),
            Some(Utc.with_ymd_and_hms(2024, 6, 23, 0, 0, 0).unwrap())
        );
        assert_eq!(ManagedService::since_created_at(&RouteWindow::All, now), None);
    }

    #[test]
    fn test_payload_json_omits_unset_fields() {
        let payload = RoutePayload {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        let body = payload_json(&payload);
        assert_eq!(body, json!({"name": "Renamed"}));
    }

    #[test]
    fn test_api_key_authenticates_without_request() {
        let mut svc = service();
        assert!(!svc.is_authenticated());
        svc.authenticate(&Credentials::ApiKey("secret".to_string()))
            .unwrap();
        assert!(svc.is_authenticated());
        assert!(service().with_api_key(Some("  ".to_string())).auth.is_none());
    }
}
