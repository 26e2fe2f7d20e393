//! Route entity type (a boulder problem on a wall face)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role a hold plays inside a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldRole {
    Start,
    Other,
    Feet,
    Top,
}

impl HoldRole {
    /// Single-letter tag used in `holds_list`
    pub fn tag(&self) -> char {
        match self {
            HoldRole::Start => 'S',
            HoldRole::Other => 'O',
            HoldRole::Feet => 'F',
            HoldRole::Top => 'T',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'S' => Some(HoldRole::Start),
            'O' => Some(HoldRole::Other),
            'F' => Some(HoldRole::Feet),
            'T' => Some(HoldRole::Top),
            _ => None,
        }
    }
}

impl std::fmt::Display for HoldRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldRole::Start => write!(f, "start"),
            HoldRole::Other => write!(f, "other"),
            HoldRole::Feet => write!(f, "feet"),
            HoldRole::Top => write!(f, "top"),
        }
    }
}

/// One `<role-tag><hold-id>` token of a holds list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteHold {
    pub hold_id: i64,
    pub role: HoldRole,
}

/// Parse a `holds_list` such as `"S829279 O828906 T829009"`.
///
/// Tokens with an unknown tag or a non-numeric id are skipped.
pub fn parse_holds_list(holds_list: &str) -> Vec<RouteHold> {
    holds_list
        .split_whitespace()
        .filter_map(|token| {
            let mut chars = token.chars();
            let role = HoldRole::from_tag(chars.next()?)?;
            let hold_id = chars.as_str().parse::<i64>().ok()?;
            Some(RouteHold { hold_id, role })
        })
        .collect()
}

/// Encode holds back into the compact `holds_list` form
pub fn format_holds_list(holds: &[RouteHold]) -> String {
    holds
        .iter()
        .map(|h| format!("{}{}", h.role.tag(), h.hold_id))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Difficulty grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    /// IRCRA scale, the common numeric denominator across grading systems
    pub ircra: f64,

    /// Fontainebleau label (e.g. "6A+")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub font: String,
}

impl Grade {
    /// Normalize a Fontainebleau label for exact-match lookups
    pub fn normalize_label(label: &str) -> String {
        label.trim().to_ascii_uppercase()
    }
}

/// Route setter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setter {
    pub id: String,
    pub name: String,
}

/// Social counters maintained by the remote service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialCounts {
    /// Number of ascents; `None` when the source cannot report it
    pub ascents: Option<u32>,
    pub likes: u32,
    pub comments: u32,
}

/// A route (boulder problem) on a wall face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Opaque, globally unique identifier assigned by the remote source
    pub id: String,

    pub name: String,

    /// Compact hold membership (see [`parse_holds_list`])
    pub holds_list: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<Grade>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setter: Option<Setter>,

    pub face_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feet_rule: Option<String>,

    #[serde(default)]
    pub is_private: bool,

    #[serde(default)]
    pub ascents: u32,

    #[serde(default)]
    pub likes: u32,

    #[serde(default)]
    pub comments: u32,

    pub created_at: DateTime<Utc>,
}

impl Route {
    pub fn holds(&self) -> Vec<RouteHold> {
        parse_holds_list(&self.holds_list)
    }

    /// IRCRA grade, with `0` standing in for "no grade"
    pub fn ircra(&self) -> f64 {
        self.grade.as_ref().map(|g| g.ircra).unwrap_or(0.0)
    }

    /// Setter display name, if any
    pub fn setter_name(&self) -> Option<&str> {
        self.setter.as_ref().map(|s| s.name.as_str())
    }

    /// A route is complete when it has at least one start and one top hold
    pub fn is_complete(&self) -> bool {
        holds_list_is_complete(&self.holds_list)
    }

    /// True when any field that the remote service mutates after creation differs
    pub fn counters_or_holds_differ(&self, other: &Route) -> bool {
        self.holds_list != other.holds_list
            || self.ascents != other.ascents
            || self.likes != other.likes
            || self.comments != other.comments
    }
}

pub fn holds_list_is_complete(holds_list: &str) -> bool {
    let holds = parse_holds_list(holds_list);
    holds.iter().any(|h| h.role == HoldRole::Start) && holds.iter().any(|h| h.role == HoldRole::Top)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(holds_list: &str) -> Route {
        Route {
            id: "r1".to_string(),
            name: "Test".to_string(),
            holds_list: holds_list.to_string(),
            grade: None,
            setter: None,
            face_id: "f1".to_string(),
            feet_rule: None,
            is_private: false,
            ascents: 0,
            likes: 0,
            comments: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_holds_list() {
        let holds = parse_holds_list("S829279 S829528 O828906 F12 T829009");
        assert_eq!(holds.len(), 5);
        assert_eq!(
            holds[0],
            RouteHold {
                hold_id: 829279,
                role: HoldRole::Start
            }
        );
        assert_eq!(holds[3].role, HoldRole::Feet);
        assert_eq!(holds[4].role, HoldRole::Top);
    }

    #[test]
    fn test_parse_holds_list_skips_garbage() {
        let holds = parse_holds_list("  X12 S O7 Tabc S3  ");
        assert_eq!(
            holds,
            vec![
                RouteHold {
                    hold_id: 7,
                    role: HoldRole::Other
                },
                RouteHold {
                    hold_id: 3,
                    role: HoldRole::Start
                },
            ]
        );
        assert!(parse_holds_list("").is_empty());
    }

    #[test]
    fn test_format_holds_list() {
        let holds = parse_holds_list("S1 O2   T3");
        assert_eq!(format_holds_list(&holds), "S1 O2 T3");
    }

    #[test]
    fn test_completeness() {
        assert!(route("S1 O2 T3").is_complete());
        assert!(route("S1 T1").is_complete());
        assert!(!route("S1 O2").is_complete());
        assert!(!route("O2 T3").is_complete());
        assert!(!route("").is_complete());
    }

    #[test]
    fn test_missing_grade_is_zero() {
        let mut r = route("S1 T2");
        assert_eq!(r.ircra(), 0.0);
        r.grade = Some(Grade {
            ircra: 18.5,
            font: "6B".to_string(),
        });
        assert_eq!(r.ircra(), 18.5);
    }

    #[test]
    fn test_counters_or_holds_differ() {
        let a = route("S1 T2");
        let mut b = a.clone();
        b.name = "Renamed".to_string();
        assert!(!a.counters_or_holds_differ(&b));
        b.likes = 3;
        assert!(a.counters_or_holds_differ(&b));
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(Grade::normalize_label(" 6a+ "), "6A+");
    }
}
