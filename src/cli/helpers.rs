//! Helper functions for CLI output formatting

use chrono::{DateTime, Local, Utc};
use console::{style, Term};

use crate::core::sync::Cancelled;
use crate::entities::Route;

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Grade as `"6A+ (17.5)"`, `"-"` when ungraded
pub fn format_grade(route: &Route) -> String {
    match &route.grade {
        Some(grade) if !grade.font.is_empty() => format!("{} ({:.1})", grade.font, grade.ircra),
        Some(grade) => format!("{:.1}", grade.ircra),
        None => "-".to_string(),
    }
}

pub fn format_local_time(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Progress callback that redraws one status line on stderr
pub fn progress_printer(quiet: bool) -> impl FnMut(u64, u64, &str) -> Result<(), Cancelled> {
    let term = Term::stderr();
    let live = !quiet && term.is_term();
    move |current, total, message| {
        if live {
            let line = if total > 0 {
                format!("{} {} ({}/{})", style("→").blue(), message, current, total)
            } else {
                format!("{} {}", style("→").blue(), message)
            };
            let _ = term.clear_line();
            let _ = term.write_str(&line);
        }
        Ok(())
    }
}

/// Clear whatever [`progress_printer`] left on the status line
pub fn finish_progress(quiet: bool) {
    let term = Term::stderr();
    if !quiet && term.is_term() {
        let _ = term.clear_line();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Grade;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("Dalle à côté du toit", 10), "Dalle à...");
    }

    #[test]
    fn test_format_grade() {
        let mut route = Route {
            id: "r".to_string(),
            name: "r".to_string(),
            holds_list: String::new(),
            grade: None,
            setter: None,
            face_id: "f".to_string(),
            feet_rule: None,
            is_private: false,
            ascents: 0,
            likes: 0,
            comments: 0,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        assert_eq!(format_grade(&route), "-");
        route.grade = Some(Grade {
            ircra: 17.5,
            font: "6A+".to_string(),
        });
        assert_eq!(format_grade(&route), "6A+ (17.5)");
    }
}
