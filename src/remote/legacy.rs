//! Legacy gym service client
//!
//! camelCase JSON, `Authorization: Token <t>` headers, next-URL pagination and
//! `max_age` day windows. The service has no per-route endpoint, so social counts
//! are derived from the likes and comments listings.

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
    parse_centroid, parse_holds_list, parse_polygon, Face, FacePicture, Grade, Hold, HoldRole,
    Route, Setter, SocialCounts,
};

/// `max_age` the service treats as "everything"
const ALL_ROUTES_MAX_AGE: u32 = 9999;

/// Smallest day window an incremental refresh asks for
const MIN_INCREMENTAL_DAYS: i64 = 7;

/// Comments requested when counting them
const COMMENT_COUNT_LIMIT: u32 = 1000;

pub struct LegacyService {
    http: Client,
    base_url: String,
    gym_id: String,
    token: Option<String>,
}

impl LegacyService {
    pub fn new(base_url: &str, gym_id: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mastoc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::transport(BackendKind::Legacy, e))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            gym_id: gym_id.to_string(),
            token: None,
        })
    }

    /// Restore a previously issued session token
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = non_empty(token);
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, RemoteError> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| RemoteError::unauthenticated(BackendKind::Legacy))?;
        Ok(req.header("Authorization", format!("Token {}", token)))
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        req: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = self
            .authorized(req)?
            .send()
            .map_err(|e| RemoteError::transport(BackendKind::Legacy, e))?;
        let response = check_status(BackendKind::Legacy, resource, response)?;
        response
            .json::<T>()
            .map_err(|e| RemoteError::transport(BackendKind::Legacy, e))
    }

    fn max_age(window: &RouteWindow, now: DateTime<Utc>) -> u32 {
        match window {
            RouteWindow::All => ALL_ROUTES_MAX_AGE,
            RouteWindow::MaxAgeDays(days) => *days,
            RouteWindow::CreatedSince(since) => {
                ((now - *since).num_days() + 1).clamp(1, ALL_ROUTES_MAX_AGE as i64) as u32
            }
        }
    }
}

impl RemoteSource for LegacyService {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn authenticate(&mut self, credentials: &Credentials) -> Result<String, RemoteError> {
        match credentials {
            Credentials::Password { username, password } => {
                let response = self
                    .http
                    .post(self.url("api/token-auth"))
                    .form(&[("username", username), ("password", password)])
                    .send()
                    .map_err(|e| RemoteError::transport(BackendKind::Legacy, e))?;
                let response = check_status(BackendKind::Legacy, "api/token-auth", response)?;
                let body: TokenResponse = response
                    .json()
                    .map_err(|e| RemoteError::transport(BackendKind::Legacy, e))?;
                let token = non_empty(body.token).ok_or_else(|| RemoteError::Authentication {
                    backend: BackendKind::Legacy,
                    message: "login response carried no token".to_string(),
                })?;
                tracing::info!(backend = "legacy", "authenticated with password");
                self.token = Some(token.clone());
                Ok(token)
            }
            Credentials::Token(token) => {
                self.token = Some(token.clone());
                Ok(token.clone())
            }
            Credentials::ApiKey(_) => Err(RemoteError::Authentication {
                backend: BackendKind::Legacy,
                message: "the legacy service does not accept API keys".to_string(),
            }),
        }
    }

    fn list_face_ids(&self) -> Result<Vec<String>, RemoteError> {
        let resource = format!("api/gyms/{}/walls", self.gym_id);
        let walls: Vec<LegacyWall> = self.send_json(&resource, self.http.get(self.url(&resource)))?;
        Ok(walls
            .into_iter()
            .flat_map(|wall| wall.faces.into_iter().map(|face| face.id))
            .collect())
    }

    fn list_routes(
        &self,
        filter: &RouteFilter,
        cursor: Option<&PageCursor>,
    ) -> Result<RoutePage, RemoteError> {
        let resource = format!("api/gyms/{}/climbs", self.gym_id);
        let req = match cursor {
            None => {
                let max_age = Self::max_age(&filter.window, Utc::now());
                self.http
                    .get(self.url(&resource))
                    .query(&[("max_age", max_age)])
            }
            Some(PageCursor::Url(next)) => self.http.get(next),
            Some(PageCursor::Page(page)) => {
                return Err(RemoteError::Network {
                    backend: BackendKind::Legacy,
                    message: format!("page-number cursor {} not supported", page),
                })
            }
        };

        let page: LegacyPage = self.send_json(&resource, req)?;
        Ok(page.into_route_page(filter.face_id.as_deref()))
    }

    fn get_face_holds(&self, face_id: &str) -> Result<Face, RemoteError> {
        let resource = format!("api/faces/{}/setup", face_id);
        let face: LegacyFace = self.send_json(&resource, self.http.get(self.url(&resource)))?;
        Ok(face.into_face())
    }

    fn create_route(&self, face_id: &str, payload: &RoutePayload) -> Result<Route, RemoteError> {
        payload.validate_for_create()?;
        let resource = format!("api/faces/{}/climbs", face_id);
        let climb: LegacyClimb = self.send_json(
            &resource,
            self.http.post(self.url(&resource)).json(&payload_json(payload)),
        )?;
        Ok(climb.into_route())
    }

    fn update_route(&self, route_id: &str, payload: &RoutePayload) -> Result<Route, RemoteError> {
        payload.validate_for_update()?;
        let face_id = payload.face_id.as_deref().ok_or_else(|| {
            RemoteError::Validation("the legacy service needs the route's face id".to_string())
        })?;
        let resource = format!("api/faces/{}/climbs/{}", face_id, route_id);
        let climb: LegacyClimb = self.send_json(
            &resource,
            self.http.patch(self.url(&resource)).json(&payload_json(payload)),
        )?;
        Ok(climb.into_route())
    }

    fn get_social_counts(&self, route_id: &str) -> Result<SocialCounts, RemoteError> {
        let likes_resource = format!("api/climbs/{}/likes", route_id);
        let likes: Vec<JsonValue> =
            self.send_json(&likes_resource, self.http.get(self.url(&likes_resource)))?;

        let comments_resource = format!("api/climbs/{}/comments", route_id);
        let comments: Vec<JsonValue> = self.send_json(
            &comments_resource,
            self.http
                .get(self.url(&comments_resource))
                .query(&[("limit", COMMENT_COUNT_LIMIT)]),
        )?;

        Ok(SocialCounts {
            ascents: None,
            likes: likes.len() as u32,
            comments: comments.len() as u32,
        })
    }

    fn incremental_window(&self, last_sync: DateTime<Utc>, now: DateTime<Utc>) -> RouteWindow {
        let days_since = (now - last_sync).num_days() + 1;
        RouteWindow::MaxAgeDays(days_since.max(MIN_INCREMENTAL_DAYS) as u32)
    }
}

/// Legacy create/update body: holds split by role, grade as a graded label
fn payload_json(payload: &RoutePayload) -> JsonValue {
    let mut body = serde_json::Map::new();

    if let Some(name) = &payload.name {
        body.insert("name".to_string(), json!(name));
    }

    if let Some(holds_list) = &payload.holds_list {
        let ids_with = |role: HoldRole| -> Vec<String> {
            parse_holds_list(holds_list)
                .into_iter()
                .filter(|h| h.role == role)
                .map(|h| h.hold_id.to_string())
                .collect()
        };
        body.insert(
            "holdsList".to_string(),
            json!({
                "start": ids_with(HoldRole::Start),
                "others": ids_with(HoldRole::Other),
                "top": ids_with(HoldRole::Top),
                "feetOnly": ids_with(HoldRole::Feet),
            }),
        );
    }

    if let Some(grade) = &payload.grade_font {
        body.insert(
            "grade".to_string(),
            json!({ "gradingSystem": "font", "value": grade }),
        );
    }
    if let Some(feet_rule) = &payload.feet_rule {
        body.insert("feetRule".to_string(), json!(feet_rule));
    }
    if let Some(description) = &payload.description {
        body.insert("description".to_string(), json!(description));
    }
    if let Some(is_private) = payload.is_private {
        body.insert("isPrivate".to_string(), json!(is_private));
    }

    JsonValue::Object(body)
}

// =========================================================================
// Wire types
// =========================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyWall {
    #[serde(default)]
    faces: Vec<LegacyFaceRef>,
}

#[derive(Debug, Deserialize)]
struct LegacyFaceRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LegacyPage {
    #[serde(default)]
    count: u64,
    next: Option<String>,
    #[serde(default)]
    results: Vec<LegacyClimb>,
}

impl LegacyPage {
    /// The service cannot filter by face, so that happens here
    fn into_route_page(self, face_id: Option<&str>) -> RoutePage {
        let items = self
            .results
            .into_iter()
            .map(LegacyClimb::into_route)
            .filter(|route| face_id.map_or(true, |f| route.face_id == f))
            .collect();

        RoutePage {
            items,
            total: self.count,
            next: non_empty(self.next).map(PageCursor::Url),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyClimb {
    id: String,
    name: Option<String>,
    holds_list: Option<String>,
    face_id: Option<String>,
    feet_rule: Option<String>,
    date_created: Option<String>,
    is_private: Option<bool>,
    climbed_by: Option<u32>,
    total_likes: Option<u32>,
    total_comments: Option<u32>,
    climb_setters: Option<LegacySetter>,
    crowd_grade: Option<LegacyGrade>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySetter {
    id: Option<String>,
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyGrade {
    ircra: Option<f64>,
    font: Option<String>,
}

impl LegacyClimb {
    fn into_route(self) -> Route {
        let setter = self.climb_setters.and_then(|s| {
            let name = non_empty(s.full_name)?;
            Some(Setter {
                id: non_empty(s.id).unwrap_or_else(|| name.clone()),
                name,
            })
        });

        let grade = self.crowd_grade.map(|g| Grade {
            ircra: g.ircra.unwrap_or(0.0),
            font: g.font.unwrap_or_default(),
        });

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
                .date_created
                .as_deref()
                .and_then(parse_remote_timestamp)
                .unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyFace {
    id: String,
    picture: Option<LegacyPicture>,
    #[serde(default)]
    feet_rules_options: Vec<String>,
    has_symmetry: Option<bool>,
    #[serde(default)]
    holds: Vec<LegacyHold>,
}

#[derive(Debug, Deserialize)]
struct LegacyPicture {
    name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyHold {
    id: i64,
    area: Option<f64>,
    polygon_str: Option<String>,
    centroid_str: Option<String>,
}

impl LegacyFace {
    fn into_face(self) -> Face {
        let face_id = self.id;
        let holds = self
            .holds
            .into_iter()
            .map(|h| Hold {
                id: h.id,
                face_id: face_id.clone(),
                polygon: parse_polygon(h.polygon_str.as_deref().unwrap_or("")),
                centroid: parse_centroid(h.centroid_str.as_deref().unwrap_or("")),
                area: h.area.unwrap_or(0.0),
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
