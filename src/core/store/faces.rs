//! Face and hold repository

use miette::{IntoDiagnostic, Result};
use rusqlite::{params, OptionalExtension, Row};

use super::LocalStore;
use crate::entities::{parse_polygon, Face, FacePicture, Hold};

const HOLD_SELECT: &str =
    "SELECT face_id, id, polygon_str, centroid_x, centroid_y, area FROM holds";

fn hold_from_row(row: &Row<'_>) -> rusqlite::Result<Hold> {
    Ok(Hold {
        face_id: row.get(0)?,
        id: row.get(1)?,
        polygon: parse_polygon(&row.get::<_, String>(2)?),
        centroid: (row.get(3)?, row.get(4)?),
        area: row.get(5)?,
    })
}

impl LocalStore {
    /// Upsert a face and all of its holds, returning the number of holds written
    pub fn save_face(&mut self, face: &Face) -> Result<usize> {
        let feet_rules = serde_json::to_string(&face.feet_rules).into_diagnostic()?;
        let tx = self.conn.transaction().into_diagnostic()?;

        tx.execute(
            r#"INSERT INTO faces (id, picture_name, picture_width, picture_height, has_symmetry, feet_rules)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(id) DO UPDATE SET
                   picture_name = excluded.picture_name,
                   picture_width = excluded.picture_width,
                   picture_height = excluded.picture_height,
                   has_symmetry = excluded.has_symmetry,
                   feet_rules = excluded.feet_rules"#,
            params![
                face.id,
                face.picture.as_ref().map(|p| p.name.as_str()),
                face.picture.as_ref().map(|p| p.width),
                face.picture.as_ref().map(|p| p.height),
                face.has_symmetry as i64,
                feet_rules,
            ],
        )
        .into_diagnostic()?;

        {
            let mut upsert = tx
                .prepare_cached(
                    r#"INSERT INTO holds (face_id, id, polygon_str, centroid_x, centroid_y, area)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                       ON CONFLICT(face_id, id) DO UPDATE SET
                           polygon_str = excluded.polygon_str,
                           centroid_x = excluded.centroid_x,
                           centroid_y = excluded.centroid_y,
                           area = excluded.area"#,
                )
                .into_diagnostic()?;

            for hold in &face.holds {
                upsert
                    .execute(params![
                        face.id,
                        hold.id,
                        hold.polygon_str(),
                        hold.centroid.0,
                        hold.centroid.1,
                        hold.area,
                    ])
                    .into_diagnostic()?;
            }
        }

        tx.commit().into_diagnostic()?;
        Ok(face.holds.len())
    }

    /// Face with its holds in id order
    pub fn get_face(&self, id: &str) -> Option<Face> {
        let face = self
            .conn
            .query_row(
                r#"SELECT id, picture_name, picture_width, picture_height, has_symmetry, feet_rules
                   FROM faces WHERE id = ?1"#,
                params![id],
                |row| {
                    let picture_name: Option<String> = row.get(1)?;
                    let feet_rules: String = row.get(5)?;
                    Ok(Face {
                        id: row.get(0)?,
                        picture: match picture_name {
                            Some(name) => Some(FacePicture {
                                name,
                                width: row.get::<_, Option<u32>>(2)?.unwrap_or(0),
                                height: row.get::<_, Option<u32>>(3)?.unwrap_or(0),
                            }),
                            None => None,
                        },
                        has_symmetry: row.get::<_, i64>(4)? != 0,
                        feet_rules: serde_json::from_str(&feet_rules).unwrap_or_default(),
                        holds: Vec::new(),
                    })
                },
            )
            .optional()
            .ok()
            .flatten()?;

        Some(Face {
            holds: self.get_all_holds(Some(&face.id)),
            ..face
        })
    }

    /// Ids of every stored face
    pub fn face_ids(&self) -> Vec<String> {
        let mut stmt = match self.conn.prepare("SELECT id FROM faces ORDER BY id") {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map([], |row| row.get::<_, String>(0))
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn get_hold(&self, face_id: &str, hold_id: i64) -> Option<Hold> {
        self.conn
            .query_row(
                &format!("{} WHERE face_id = ?1 AND id = ?2", HOLD_SELECT),
                params![face_id, hold_id],
                hold_from_row,
            )
            .optional()
            .ok()
            .flatten()
    }

    /// Holds of one face, or of every face when `face_id` is `None`
    pub fn get_all_holds(&self, face_id: Option<&str>) -> Vec<Hold> {
        let (sql, args): (String, Vec<&dyn rusqlite::ToSql>) = match &face_id {
            Some(face) => (
                format!("{} WHERE face_id = ?1 ORDER BY id", HOLD_SELECT),
                vec![face as &dyn rusqlite::ToSql],
            ),
            None => (format!("{} ORDER BY face_id, id", HOLD_SELECT), vec![]),
        };

        let mut stmt = match self.conn.prepare(&sql) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(args.as_slice(), hold_from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }
}
