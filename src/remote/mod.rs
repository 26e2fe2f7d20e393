//! Remote route services
//!
//! Both services expose the same contract through [`RemoteSource`]:
//! - [`LegacyService`] - the original gym service (token auth, next-URL pagination,
//!   day-count windows)
//! - [`ManagedService`] - the self-hosted REST API (API key or bearer auth,
//!   page/page_size pagination, since-timestamp windows)
//!
//! [`BackendRouter`] holds one of them as primary and optionally the other as a
//! failover secondary.

mod legacy;
mod managed;
mod router;

pub use legacy::LegacyService;
pub use managed::ManagedService;
pub use router::BackendRouter;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::ValueEnum;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{holds_list_is_complete, Face, Route, SocialCounts};

/// Which remote service a source talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Legacy,
    #[default]
    Managed,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Legacy => write!(f, "legacy"),
            BackendKind::Managed => write!(f, "managed"),
        }
    }
}

/// Errors raised by remote operations
#[derive(Debug, Error, Diagnostic)]
pub enum RemoteError {
    #[error("{backend} service rejected credentials: {message}")]
    #[diagnostic(
        code(mastoc::remote::authentication),
        help("run `mastoc login` or set the credentials for this source in the config")
    )]
    Authentication {
        backend: BackendKind,
        message: String,
    },

    #[error("{backend} service request failed: {message}")]
    #[diagnostic(code(mastoc::remote::network))]
    Network {
        backend: BackendKind,
        message: String,
    },

    #[error("{resource} not found on {backend} service")]
    #[diagnostic(code(mastoc::remote::not_found))]
    NotFound {
        backend: BackendKind,
        resource: String,
    },

    #[error("Invalid route payload: {0}")]
    #[diagnostic(code(mastoc::remote::validation))]
    Validation(String),

    #[error("Could not decode {backend} service response: {message}")]
    #[diagnostic(code(mastoc::remote::decode))]
    Decode {
        backend: BackendKind,
        message: String,
    },

    #[error("Cancelled: {0}")]
    #[diagnostic(code(mastoc::remote::cancelled))]
    Cancelled(String),
}

impl RemoteError {
    /// Errors that must stop a whole sync run rather than one step of it
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RemoteError::Authentication { .. } | RemoteError::Cancelled(_)
        )
    }

    pub(crate) fn transport(backend: BackendKind, err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode {
                backend,
                message: err.to_string(),
            }
        } else {
            RemoteError::Network {
                backend,
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn unauthenticated(backend: BackendKind) -> Self {
        RemoteError::Authentication {
            backend,
            message: "no credentials configured".to_string(),
        }
    }
}

/// Credentials accepted by [`RemoteSource::authenticate`]
#[derive(Debug, Clone)]
pub enum Credentials {
    Password { username: String, password: String },
    /// Pre-issued session token (legacy) or bearer token (managed)
    Token(String),
    /// Static API key (managed only)
    ApiKey(String),
}

/// How far back a route listing reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteWindow {
    #[default]
    All,
    /// Routes created in the last N days
    MaxAgeDays(u32),
    /// Routes created at or after a timestamp
    CreatedSince(DateTime<Utc>),
}

/// Filter for route listings
#[derive(Debug, Clone, Default)]
pub struct RouteFilter {
    pub face_id: Option<String>,
    pub window: RouteWindow,
}

/// Position of the next page in a paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Opaque next-page URL handed out by the server
    Url(String),
    /// Explicit 1-based page number
    Page(u32),
}

/// One page of routes
#[derive(Debug, Clone, Default)]
pub struct RoutePage {
    pub items: Vec<Route>,
    /// Total number of routes the listing will yield across all pages
    pub total: u64,
    /// Cursor for the following page; `None` on the last page
    pub next: Option<PageCursor>,
}

/// Per-page progress callback: `(fetched_so_far, expected_total)`.
/// Returning an error stops pagination.
pub type PageProgress<'a> = dyn FnMut(u64, u64) -> Result<(), RemoteError> + 'a;

/// Fields for creating or updating a route
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutePayload {
    pub name: Option<String>,
    pub holds_list: Option<String>,
    pub grade_font: Option<String>,
    pub grade_ircra: Option<f64>,
    pub feet_rule: Option<String>,
    pub description: Option<String>,
    pub is_private: Option<bool>,
    /// Face the route lives on; required by the legacy service for updates
    pub face_id: Option<String>,
}

/// Minimum route name length accepted by both services
pub const MIN_ROUTE_NAME_LEN: usize = 3;

impl RoutePayload {
    pub fn new(name: impl Into<String>, holds_list: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            holds_list: Some(holds_list.into()),
            ..Default::default()
        }
    }

    pub fn with_grade_font(mut self, grade: impl Into<String>) -> Self {
        self.grade_font = Some(grade.into());
        self
    }

    pub fn with_face(mut self, face_id: impl Into<String>) -> Self {
        self.face_id = Some(face_id.into());
        self
    }

    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = Some(is_private);
        self
    }

    /// Check the fields a new route must carry
    pub fn validate_for_create(&self) -> Result<(), RemoteError> {
        let name = self.name.as_deref().map(str::trim).unwrap_or("");
        if name.chars().count() < MIN_ROUTE_NAME_LEN {
            return Err(RemoteError::Validation(format!(
                "route name must be at least {} characters",
                MIN_ROUTE_NAME_LEN
            )));
        }
        self.validate_holds()
    }

    /// Check the fields present in a partial update
    pub fn validate_for_update(&self) -> Result<(), RemoteError> {
        if let Some(name) = &self.name {
            if name.trim().chars().count() < MIN_ROUTE_NAME_LEN {
                return Err(RemoteError::Validation(format!(
                    "route name must be at least {} characters",
                    MIN_ROUTE_NAME_LEN
                )));
            }
        }
        if self.holds_list.is_some() {
            self.validate_holds()?;
        }
        Ok(())
    }

    fn validate_holds(&self) -> Result<(), RemoteError> {
        match self.holds_list.as_deref() {
            Some(list) if holds_list_is_complete(list) => Ok(()),
            _ => Err(RemoteError::Validation(
                "holds list needs at least one start (S) and one top (T) hold".to_string(),
            )),
        }
    }
}

/// Contract shared by both remote services
pub trait RemoteSource {
    fn kind(&self) -> BackendKind;

    fn is_authenticated(&self) -> bool;

    /// Authenticate and return the token now in use
    fn authenticate(&mut self, credentials: &Credentials) -> Result<String, RemoteError>;

    /// Ids of every face this source serves
    fn list_face_ids(&self) -> Result<Vec<String>, RemoteError>;

    /// Fetch one page of routes; `cursor` is `None` for the first page
    fn list_routes(
        &self,
        filter: &RouteFilter,
        cursor: Option<&PageCursor>,
    ) -> Result<RoutePage, RemoteError>;

    /// Drive [`list_routes`](Self::list_routes) until the last page
    fn list_all_routes(
        &self,
        filter: &RouteFilter,
        progress: &mut PageProgress<'_>,
    ) -> Result<Vec<Route>, RemoteError> {
        let mut routes = Vec::new();
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = self.list_routes(filter, cursor.as_ref())?;
            routes.extend(page.items);
            progress(routes.len() as u64, page.total)?;

            match page.next {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                Some(_) => {
                    tracing::warn!(backend = %self.kind(), "server repeated a page cursor, stopping");
                    break;
                }
                None => break,
            }
        }

        Ok(routes)
    }

    /// Face with its full hold geometry
    fn get_face_holds(&self, face_id: &str) -> Result<Face, RemoteError>;

    fn create_route(&self, face_id: &str, payload: &RoutePayload) -> Result<Route, RemoteError>;

    fn update_route(&self, route_id: &str, payload: &RoutePayload) -> Result<Route, RemoteError>;

    /// Current social counters of one route
    fn get_social_counts(&self, route_id: &str) -> Result<SocialCounts, RemoteError>;

    /// Listing window for an incremental refresh after `last_sync`
    fn incremental_window(&self, last_sync: DateTime<Utc>, now: DateTime<Utc>) -> RouteWindow;

    /// The single source whose data a local store of this kind holds, when that
    /// is not `self`
    fn snapshot_source(&self) -> Option<&dyn RemoteSource> {
        None
    }
}

/// Map a non-success HTTP status onto the error taxonomy
pub(crate) fn check_status(
    backend: BackendKind,
    resource: &str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    tracing::debug!(%backend, resource, status = status.as_u16(), "remote request failed");

    Err(match status.as_u16() {
        401 | 403 => RemoteError::Authentication {
            backend,
            message: format!("HTTP {}", status.as_u16()),
        },
        404 => RemoteError::NotFound {
            backend,
            resource: resource.to_string(),
        },
        400 | 422 => RemoteError::Validation(body),
        _ => RemoteError::Network {
            backend,
            message: format!("HTTP {} on {}: {}", status.as_u16(), resource, body),
        },
    })
}

/// Lenient timestamp parsing for remote payloads (RFC 3339, or naive UTC)
pub(crate) fn parse_remote_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Empty strings from the wire mean "unset"
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
