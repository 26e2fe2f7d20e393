//! Climbing domain types
//!
//! - [`Route`] - a boulder problem with its holds, grade, setter and social counters
//! - [`Face`] - a wall surface with its [`Hold`] geometry

pub mod face;
pub mod route;

pub use face::{parse_centroid, parse_polygon, Face, FacePicture, Hold};
pub use route::{
    format_holds_list, holds_list_is_complete, parse_holds_list, Grade, HoldRole, Route,
    RouteHold, Setter, SocialCounts,
};
