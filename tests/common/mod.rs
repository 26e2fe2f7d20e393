//! In-memory remote source shared by the integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use mastoc::entities::{Face, Grade, Hold, Route, Setter, SocialCounts};
use mastoc::remote::{
    BackendKind, Credentials, PageCursor, RemoteError, RemoteSource, RouteFilter, RoutePage,
    RoutePayload, RouteWindow,
};

/// Which error a failing call produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Auth,
    Network,
    Validation,
}

impl Failure {
    fn error(self, kind: BackendKind) -> RemoteError {
        match self {
            Failure::Auth => RemoteError::Authentication {
                backend: kind,
                message: "HTTP 401".to_string(),
            },
            Failure::Network => RemoteError::Network {
                backend: kind,
                message: "connection refused".to_string(),
            },
            Failure::Validation => RemoteError::Validation("rejected".to_string()),
        }
    }
}

/// Shared log of `"<kind>:<operation>"` entries
pub type CallLog = Rc<RefCell<Vec<String>>>;

pub struct FakeRemote {
    pub kind: BackendKind,
    pub authenticated: bool,
    pub faces: Vec<Face>,
    pub routes: Vec<Route>,
    pub page_size: usize,
    /// Total reported on each page; defaults to the number of matching routes
    pub reported_total: Option<u64>,
    pub social: HashMap<String, SocialCounts>,
    pub fail_all: Option<Failure>,
    pub fail_faces_listing: Option<Failure>,
    pub fail_routes_listing: Option<Failure>,
    /// Pages from this one on fail with a network error
    pub fail_from_page: Option<u32>,
    pub fail_face_holds: HashSet<String>,
    pub calls: CallLog,
}

impl FakeRemote {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            authenticated: true,
            faces: Vec::new(),
            routes: Vec::new(),
            page_size: 100,
            reported_total: None,
            social: HashMap::new(),
            fail_all: None,
            fail_faces_listing: None,
            fail_routes_listing: None,
            fail_from_page: None,
            fail_face_holds: HashSet::new(),
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_face(mut self, face: Face) -> Self {
        self.faces.push(face);
        self
    }

    pub fn with_routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.fail_all = Some(failure);
        self
    }

    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn call_log(&self) -> CallLog {
        Rc::clone(&self.calls)
    }

    fn record(&self, op: &str) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(format!("{}:{}", self.kind, op));
        match self.fail_all {
            Some(failure) => Err(failure.error(self.kind)),
            None => Ok(()),
        }
    }

    fn matching(&self, filter: &RouteFilter, now: DateTime<Utc>) -> Vec<Route> {
        let since = match filter.window {
            RouteWindow::All => None,
            RouteWindow::MaxAgeDays(days) => Some(now - chrono::Duration::days(days as i64)),
            RouteWindow::CreatedSince(at) => Some(at),
        };
        self.routes
            .iter()
            .filter(|r| filter.face_id.as_ref().map_or(true, |f| &r.face_id == f))
            .filter(|r| since.map_or(true, |s| r.created_at >= s))
            .cloned()
            .collect()
    }
}

impl RemoteSource for FakeRemote {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn authenticate(&mut self, credentials: &Credentials) -> Result<String, RemoteError> {
        self.record("authenticate")?;
        match credentials {
            Credentials::Password { password, .. } if password == "secret" => {
                self.authenticated = true;
                Ok("fake-token".to_string())
            }
            Credentials::Token(token) | Credentials::ApiKey(token) => {
                self.authenticated = true;
                Ok(token.clone())
            }
            _ => Err(Failure::Auth.error(self.kind)),
        }
    }

    fn list_face_ids(&self) -> Result<Vec<String>, RemoteError> {
        self.record("list_face_ids")?;
        if let Some(failure) = self.fail_faces_listing {
            return Err(failure.error(self.kind));
        }
        Ok(self.faces.iter().map(|f| f.id.clone()).collect())
    }

    fn list_routes(
        &self,
        filter: &RouteFilter,
        cursor: Option<&PageCursor>,
    ) -> Result<RoutePage, RemoteError> {
        self.record("list_routes")?;
        if let Some(failure) = self.fail_routes_listing {
            return Err(failure.error(self.kind));
        }

        let matching = self.matching(filter, Utc::now());
        let page = match cursor {
            Some(PageCursor::Page(n)) => *n as usize,
            _ => 1,
        };
        if self.fail_from_page.map_or(false, |from| page as u32 >= from) {
            return Err(Failure::Network.error(self.kind));
        }
        let start = (page - 1) * self.page_size;
        let items: Vec<Route> = matching.iter().skip(start).take(self.page_size).cloned().collect();
        let next = if start + items.len() < matching.len() {
            Some(PageCursor::Page(page as u32 + 1))
        } else {
            None
        };

        Ok(RoutePage {
            items,
            total: self.reported_total.unwrap_or(matching.len() as u64),
            next,
        })
    }

    fn get_face_holds(&self, face_id: &str) -> Result<Face, RemoteError> {
        self.record("get_face_holds")?;
        if self.fail_face_holds.contains(face_id) {
            return Err(Failure::Network.error(self.kind));
        }
        self.faces
            .iter()
            .find(|f| f.id == face_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                backend: self.kind,
                resource: face_id.to_string(),
            })
    }

    fn create_route(&self, face_id: &str, payload: &RoutePayload) -> Result<Route, RemoteError> {
        self.record("create_route")?;
        let mut created = route(
            "created-1",
            payload.holds_list.as_deref().unwrap_or_default(),
            0.0,
            None,
            day(2024, 6, 1),
        );
        created.name = payload.name.clone().unwrap_or_default();
        created.face_id = face_id.to_string();
        created.is_private = payload.is_private.unwrap_or(false);
        created.grade = payload.grade_font.as_ref().map(|font| Grade {
            ircra: 0.0,
            font: Grade::normalize_label(font),
        });
        Ok(created)
    }

    fn update_route(&self, route_id: &str, payload: &RoutePayload) -> Result<Route, RemoteError> {
        self.record("update_route")?;
        let mut existing = self
            .routes
            .iter()
            .find(|r| r.id == route_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                backend: self.kind,
                resource: route_id.to_string(),
            })?;
        if let Some(name) = &payload.name {
            existing.name = name.clone();
        }
        if let Some(holds) = &payload.holds_list {
            existing.holds_list = holds.clone();
        }
        if let Some(face) = &payload.face_id {
            existing.face_id = face.clone();
        }
        Ok(existing)
    }

    fn get_social_counts(&self, route_id: &str) -> Result<SocialCounts, RemoteError> {
        self.record("get_social_counts")?;
        self.social
            .get(route_id)
            .copied()
            .ok_or_else(|| RemoteError::NotFound {
                backend: self.kind,
                resource: route_id.to_string(),
            })
    }

    fn incremental_window(&self, last_sync: DateTime<Utc>, _now: DateTime<Utc>) -> RouteWindow {
        RouteWindow::CreatedSince(last_sync - chrono::Duration::days(1))
    }
}

pub fn day(year: i32, month: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, d, 12, 0, 0).unwrap()
}

pub fn route(
    id: &str,
    holds_list: &str,
    ircra: f64,
    setter: Option<&str>,
    created_at: DateTime<Utc>,
) -> Route {
    Route {
        id: id.to_string(),
        name: format!("Route {}", id),
        holds_list: holds_list.to_string(),
        grade: Some(Grade {
            ircra,
            font: String::new(),
        }),
        setter: setter.map(|name| Setter {
            id: name.to_lowercase(),
            name: name.to_string(),
        }),
        face_id: "face-1".to_string(),
        feet_rule: None,
        is_private: false,
        ascents: 0,
        likes: 0,
        comments: 0,
        created_at,
    }
}

pub fn face(id: &str, hold_ids: &[i64]) -> Face {
    Face {
        id: id.to_string(),
        picture: None,
        has_symmetry: false,
        feet_rules: Vec::new(),
        holds: hold_ids
            .iter()
            .map(|&hid| Hold {
                id: hid,
                face_id: id.to_string(),
                polygon: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)],
                centroid: (5.0, 5.0),
                area: 50.0,
            })
            .collect(),
    }
}
