//! Route repository: upserts, association maintenance and route queries

use std::collections::{BTreeSet, HashSet};

use miette::{IntoDiagnostic, Result};
use rusqlite::{params, params_from_iter, OptionalExtension, Row, Transaction};

use super::{format_datetime, parse_datetime, LocalStore};
use crate::entities::{Grade, HoldRole, Route, RouteHold, Setter, SocialCounts};

/// Column list shared by every route query; see [`route_from_row`]
const ROUTE_SELECT: &str = r#"SELECT r.id, r.name, r.holds_list, r.grade_ircra, r.grade_font,
          r.setter_id, s.name, r.face_id, r.feet_rule, r.is_private,
          r.ascents, r.likes, r.comments, r.created_at
   FROM routes r
   LEFT JOIN setters s ON s.id = r.setter_id"#;

const ROUTE_ORDER: &str = "ORDER BY r.created_at DESC, r.id ASC";

fn route_from_row(row: &Row<'_>) -> rusqlite::Result<Route> {
    let grade_ircra: Option<f64> = row.get(3)?;
    let grade_font: Option<String> = row.get(4)?;
    let grade = match (grade_ircra, grade_font) {
        (None, None) => None,
        (ircra, font) => Some(Grade {
            ircra: ircra.unwrap_or(0.0),
            font: font.unwrap_or_default(),
        }),
    };

    let setter_id: Option<String> = row.get(5)?;
    let setter_name: Option<String> = row.get(6)?;
    let setter = setter_id.map(|id| Setter {
        name: setter_name.unwrap_or_else(|| id.clone()),
        id,
    });

    Ok(Route {
        id: row.get(0)?,
        name: row.get(1)?,
        holds_list: row.get(2)?,
        grade,
        setter,
        face_id: row.get(7)?,
        feet_rule: row.get(8)?,
        is_private: row.get::<_, i64>(9)? != 0,
        ascents: row.get::<_, i64>(10)? as u32,
        likes: row.get::<_, i64>(11)? as u32,
        comments: row.get::<_, i64>(12)? as u32,
        created_at: parse_datetime(row.get::<_, String>(13)?),
    })
}

/// Upsert one route and rewrite its associations
fn write_route(tx: &Transaction<'_>, route: &Route) -> rusqlite::Result<()> {
    if let Some(setter) = &route.setter {
        tx.execute(
            "INSERT INTO setters (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![setter.id, setter.name],
        )?;
    }

    let grade_font = route
        .grade
        .as_ref()
        .map(|g| Grade::normalize_label(&g.font))
        .filter(|label| !label.is_empty());

    tx.execute(
        r#"INSERT INTO routes (id, name, holds_list, grade_ircra, grade_font, setter_id,
                               face_id, feet_rule, is_private, ascents, likes, comments, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
           ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               holds_list = excluded.holds_list,
               grade_ircra = excluded.grade_ircra,
               grade_font = excluded.grade_font,
               setter_id = excluded.setter_id,
               feet_rule = excluded.feet_rule,
               is_private = excluded.is_private,
               ascents = excluded.ascents,
               likes = excluded.likes,
               comments = excluded.comments"#,
        params![
            route.id,
            route.name,
            route.holds_list,
            route.grade.as_ref().map(|g| g.ircra),
            grade_font,
            route.setter.as_ref().map(|s| s.id.as_str()),
            route.face_id,
            route.feet_rule,
            route.is_private as i64,
            route.ascents as i64,
            route.likes as i64,
            route.comments as i64,
            format_datetime(route.created_at),
        ],
    )?;

    tx.execute(
        "DELETE FROM route_holds WHERE route_id = ?1",
        params![route.id],
    )?;
    let mut insert = tx.prepare_cached(
        "INSERT OR IGNORE INTO route_holds (route_id, hold_id, role) VALUES (?1, ?2, ?3)",
    )?;
    for hold in route.holds() {
        insert.execute(params![route.id, hold.hold_id, hold.role.to_string()])?;
    }

    Ok(())
}

impl LocalStore {
    /// Insert or update a route; its `route_holds` rows are replaced atomically
    pub fn save_route(&mut self, route: &Route) -> Result<()> {
        let tx = self.conn.transaction().into_diagnostic()?;
        write_route(&tx, route).into_diagnostic()?;
        tx.commit().into_diagnostic()?;
        Ok(())
    }

    /// Save a batch of routes in one transaction, returning how many were written
    pub fn save_routes(&mut self, routes: &[Route]) -> Result<usize> {
        let tx = self.conn.transaction().into_diagnostic()?;
        for route in routes {
            write_route(&tx, route).into_diagnostic()?;
        }
        tx.commit().into_diagnostic()?;
        Ok(routes.len())
    }

    /// Apply fresh social counters; `ascents: None` keeps the stored value.
    ///
    /// Returns `true` when any stored counter changed.
    pub fn update_social_counts(&self, route_id: &str, counts: &SocialCounts) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                r#"UPDATE routes
                   SET ascents = COALESCE(?2, ascents), likes = ?3, comments = ?4
                   WHERE id = ?1
                     AND (ascents != COALESCE(?2, ascents) OR likes != ?3 OR comments != ?4)"#,
                params![
                    route_id,
                    counts.ascents.map(|a| a as i64),
                    counts.likes as i64,
                    counts.comments as i64
                ],
            )
            .into_diagnostic()?;
        Ok(changed > 0)
    }

    pub fn get_route(&self, id: &str) -> Option<Route> {
        self.conn
            .query_row(
                &format!("{} WHERE r.id = ?1", ROUTE_SELECT),
                params![id],
                route_from_row,
            )
            .optional()
            .ok()
            .flatten()
    }

    /// All routes, newest first
    pub fn get_all_routes(&self) -> Vec<Route> {
        self.query_routes(&format!("{} {}", ROUTE_SELECT, ROUTE_ORDER), &[])
    }

    /// Routes whose Fontainebleau grade matches `label` (trimmed, case-insensitive)
    pub fn get_routes_by_grade(&self, label: &str) -> Vec<Route> {
        let label = Grade::normalize_label(label);
        self.query_routes(
            &format!("{} WHERE r.grade_font = ?1 {}", ROUTE_SELECT, ROUTE_ORDER),
            &[&label],
        )
    }

    /// Routes that use `hold_id` under any role
    pub fn get_routes_by_hold(&self, hold_id: i64) -> Vec<Route> {
        self.query_routes(
            &format!(
                "{} WHERE r.id IN (SELECT route_id FROM route_holds WHERE hold_id = ?1) {}",
                ROUTE_SELECT, ROUTE_ORDER
            ),
            &[&hold_id],
        )
    }

    /// Routes that use every hold in `hold_ids`; an empty set matches all routes
    pub fn get_routes_by_holds_all(&self, hold_ids: &[i64]) -> Vec<Route> {
        let distinct: BTreeSet<i64> = hold_ids.iter().copied().collect();
        if distinct.is_empty() {
            return self.get_all_routes();
        }

        let placeholders = vec!["?"; distinct.len()].join(", ");
        let sql = format!(
            r#"{} WHERE r.id IN (
                   SELECT route_id FROM route_holds
                   WHERE hold_id IN ({})
                   GROUP BY route_id
                   HAVING COUNT(DISTINCT hold_id) = {}
               ) {}"#,
            ROUTE_SELECT,
            placeholders,
            distinct.len(),
            ROUTE_ORDER
        );

        let mut stmt = match self.conn.prepare(&sql) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params_from_iter(distinct.iter()), route_from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    /// Ids of every stored route
    pub fn route_ids(&self) -> HashSet<String> {
        let mut stmt = match self.conn.prepare("SELECT id FROM routes") {
            Ok(s) => s,
            Err(_) => return HashSet::new(),
        };
        stmt.query_map([], |row| row.get::<_, String>(0))
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    /// Association rows of one route
    pub fn route_holds(&self, route_id: &str) -> Vec<RouteHold> {
        let mut stmt = match self.conn.prepare(
            "SELECT hold_id, role FROM route_holds WHERE route_id = ?1 ORDER BY hold_id, role",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![route_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .map(|rows| {
            rows.filter_map(|r| r.ok())
                .filter_map(|(hold_id, role)| {
                    let role = match role.as_str() {
                        "start" => HoldRole::Start,
                        "other" => HoldRole::Other,
                        "feet" => HoldRole::Feet,
                        "top" => HoldRole::Top,
                        _ => return None,
                    };
                    Some(RouteHold { hold_id, role })
                })
                .collect()
        })
        .unwrap_or_default()
    }

    /// Stored setters, by name
    pub fn get_setters(&self) -> Vec<Setter> {
        let mut stmt = match self
            .conn
            .prepare("SELECT id, name FROM setters ORDER BY name COLLATE NOCASE, id")
        {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map([], |row| {
            Ok(Setter {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
    }

    fn query_routes(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Vec<Route> {
        let mut stmt = match self.conn.prepare(sql) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(args, route_from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn route(id: &str, holds_list: &str, day: u32) -> Route {
        Route {
            id: id.to_string(),
            name: format!("Route {}", id),
            holds_list: holds_list.to_string(),
            grade: Some(Grade {
                ircra: 18.0,
                font: "6a+".to_string(),
            }),
            setter: Some(Setter {
                id: "s1".to_string(),
                name: "Ada".to_string(),
            }),
            face_id: "face".to_string(),
            feet_rule: None,
            is_private: false,
            ascents: 1,
            likes: 2,
            comments: 3,
            created_at: created(day),
        }
    }

    fn created(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_save_route_is_idempotent() {
        let mut store = LocalStore::open_in_memory().unwrap();
        let r = route("r1", "S1 O2 T3", 1);

        store.save_route(&r).unwrap();
        store.save_route(&r).unwrap();

        assert_eq!(store.route_count(), 1);
        assert_eq!(store.route_holds("r1").len(), 3);
        let stored = store.get_route("r1").unwrap();
        assert_eq!(stored.grade.as_ref().unwrap().font, "6A+");
        assert_eq!(stored.setter_name(), Some("Ada"));
        assert_eq!(stored.created_at, created(1));
    }

    #[test]
    fn test_shrinking_holds_replaces_associations() {
        let mut store = LocalStore::open_in_memory().unwrap();
        let mut r = route("r1", "S1 O2 O3 T4", 1);
        store.save_route(&r).unwrap();

        r.holds_list = "S1 T4".to_string();
        store.save_route(&r).unwrap();

        let ids: Vec<i64> = store.route_holds("r1").iter().map(|h| h.hold_id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert!(store.get_routes_by_hold(2).is_empty());
    }

    #[test]
    fn test_same_hold_under_two_roles() {
        let mut store = LocalStore::open_in_memory().unwrap();
        store.save_route(&route("r1", "S1 T1", 1)).unwrap();

        assert_eq!(store.route_holds("r1").len(), 2);
        assert_eq!(store.get_routes_by_hold(1).len(), 1);
    }

    #[test]
    fn test_get_all_routes_newest_first() {
        let mut store = LocalStore::open_in_memory().unwrap();
        store
            .save_routes(&[
                route("old", "S1 T2", 1),
                route("new", "S1 T2", 3),
                route("mid", "S1 T2", 2),
            ])
            .unwrap();

        let ids: Vec<String> = store.get_all_routes().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_get_routes_by_grade_normalizes_label() {
        let mut store = LocalStore::open_in_memory().unwrap();
        store.save_route(&route("r1", "S1 T2", 1)).unwrap();
        let mut other = route("r2", "S1 T2", 2);
        other.grade = None;
        store.save_route(&other).unwrap();

        assert_eq!(store.get_routes_by_grade(" 6A+ ").len(), 1);
        assert_eq!(store.get_routes_by_grade("6a+").len(), 1);
        assert!(store.get_routes_by_grade("7A").is_empty());
        assert!(store.get_route("r2").unwrap().grade.is_none());
    }

    #[test]
    fn test_get_routes_by_holds_all() {
        let mut store = LocalStore::open_in_memory().unwrap();
        store.save_route(&route("a", "S1 O2 T3", 1)).unwrap();
        store.save_route(&route("b", "S1 O4 T3", 2)).unwrap();

        let both: Vec<String> = store
            .get_routes_by_holds_all(&[1, 3])
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(both, vec!["b", "a"]);

        let only_a = store.get_routes_by_holds_all(&[1, 2, 2]);
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].id, "a");

        assert!(store.get_routes_by_holds_all(&[2, 4]).is_empty());
        assert_eq!(store.get_routes_by_holds_all(&[]).len(), 2);
    }

    #[test]
    fn test_update_social_counts() {
        let mut store = LocalStore::open_in_memory().unwrap();
        store.save_route(&route("r1", "S1 T2", 1)).unwrap();

        let same = SocialCounts {
            ascents: Some(1),
            likes: 2,
            comments: 3,
        };
        assert!(!store.update_social_counts("r1", &same).unwrap());

        let without_ascents = SocialCounts {
            ascents: None,
            likes: 9,
            comments: 3,
        };
        assert!(store.update_social_counts("r1", &without_ascents).unwrap());
        let stored = store.get_route("r1").unwrap();
        assert_eq!((stored.ascents, stored.likes), (1, 9));

        assert!(!store.update_social_counts("missing", &same).unwrap());
    }

    #[test]
    fn test_route_ids_and_setters() {
        let mut store = LocalStore::open_in_memory().unwrap();
        store.save_route(&route("r1", "S1 T2", 1)).unwrap();
        let mut r2 = route("r2", "S1 T2", 2);
        r2.setter = Some(Setter {
            id: "s0".to_string(),
            name: "bea".to_string(),
        });
        store.save_route(&r2).unwrap();

        let ids = store.route_ids();
        assert!(ids.contains("r1") && ids.contains("r2"));

        let names: Vec<String> = store.get_setters().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Ada", "bea"]);
    }
}
