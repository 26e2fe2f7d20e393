//! Face and hold geometry

use serde::{Deserialize, Serialize};

/// A single physical grip on a face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    /// Integer id, unique within its face
    pub id: i64,

    pub face_id: String,

    /// Outline as an ordered point list (image pixel coordinates)
    #[serde(default)]
    pub polygon: Vec<(f64, f64)>,

    pub centroid: (f64, f64),

    #[serde(default)]
    pub area: f64,
}

impl Hold {
    /// Polygon in the `"x,y x,y ..."` form both remote services use
    pub fn polygon_str(&self) -> String {
        self.polygon
            .iter()
            .map(|(x, y)| format!("{},{}", x, y))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Parse a `"x,y x,y ..."` polygon string, skipping malformed points
pub fn parse_polygon(polygon_str: &str) -> Vec<(f64, f64)> {
    polygon_str
        .split_whitespace()
        .filter_map(|point| {
            let (x, y) = point.split_once(',')?;
            Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
        })
        .collect()
}

/// Parse a `"x y"` centroid string; malformed input yields the origin
pub fn parse_centroid(centroid_str: &str) -> (f64, f64) {
    let mut parts = centroid_str.split_whitespace().map(|p| p.parse::<f64>());
    match (parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y))) => (x, y),
        _ => (0.0, 0.0),
    }
}

/// Wall picture a face is drawn on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacePicture {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// A climbable wall surface and its holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<FacePicture>,

    #[serde(default)]
    pub has_symmetry: bool,

    /// Foot rules a route on this face may declare
    #[serde(default)]
    pub feet_rules: Vec<String>,

    #[serde(default)]
    pub holds: Vec<Hold>,
}
