//! `mastoc holds` command - hold usage and grade spread

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::collections::HashSet;
use tabled::{builder::Builder, settings::Style};

use crate::cli::commands::utils::{load_config, open_store};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::RouteHoldIndex;

#[derive(Args, Debug)]
pub struct HoldsArgs {
    /// Only holds of this face
    #[arg(long)]
    pub face: Option<String>,

    /// Lowest IRCRA grade of the routes counted
    #[arg(long)]
    pub min_grade: Option<f64>,

    /// Highest IRCRA grade of the routes counted
    #[arg(long)]
    pub max_grade: Option<f64>,

    /// Number of holds to show, most used first
    #[arg(long, default_value = "20")]
    pub top: usize,
}

#[derive(Debug, Serialize)]
struct HoldRow {
    hold_id: i64,
    face_id: Option<String>,
    routes: usize,
    percentile: f64,
    min_grade: Option<f64>,
    max_grade: Option<f64>,
}

pub fn run(args: HoldsArgs, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global)?;
    let store = open_store(&config)?;
    let index = RouteHoldIndex::from_store(&store);

    let face_holds: Option<HashSet<i64>> = args.face.as_deref().map(|face| {
        store
            .get_all_holds(Some(face))
            .into_iter()
            .map(|h| h.id)
            .collect()
    });

    let usage = index.holds_usage(args.min_grade, args.max_grade);
    let percentile = index.holds_usage_percentile(args.min_grade, args.max_grade, None);

    let mut rows: Vec<HoldRow> = usage
        .iter()
        .filter(|(hold_id, _)| face_holds.as_ref().map_or(true, |set| set.contains(*hold_id)))
        .map(|(&hold_id, &routes)| HoldRow {
            hold_id,
            face_id: index.hold(hold_id).map(|h| h.face_id.clone()),
            routes,
            percentile: percentile.get(&hold_id).copied().unwrap_or(0.0),
            min_grade: index.hold_min_grade(hold_id, args.min_grade, args.max_grade, None),
            max_grade: index.hold_max_grade(hold_id, args.min_grade, args.max_grade, None),
        })
        .collect();

    rows.sort_by(|a, b| b.routes.cmp(&a.routes).then(a.hold_id.cmp(&b.hold_id)));
    let used = rows.len();
    rows.truncate(args.top);

    let format = match global.format {
        OutputFormat::Auto => OutputFormat::Table,
        f => f,
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&rows).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(&rows).into_diagnostic()?;
            print!("{}", yaml);
        }
        OutputFormat::Tsv => {
            println!("hold_id\troutes\tpercentile\tmin_grade\tmax_grade");
            for row in &rows {
                println!(
                    "{}\t{}\t{:.3}\t{}\t{}",
                    row.hold_id,
                    row.routes,
                    row.percentile,
                    fmt_grade(row.min_grade),
                    fmt_grade(row.max_grade)
                );
            }
        }
        OutputFormat::Id => {
            for row in &rows {
                println!("{}", row.hold_id);
            }
        }
        OutputFormat::Table | OutputFormat::Auto => {
            let mut builder = Builder::default();
            builder.push_record(["Hold", "Face", "Routes", "Percentile", "Min grade", "Max grade"]);
            for row in &rows {
                builder.push_record([
                    row.hold_id.to_string(),
                    row.face_id.clone().unwrap_or_else(|| "-".to_string()),
                    row.routes.to_string(),
                    format!("{:.0}%", row.percentile * 100.0),
                    fmt_grade(row.min_grade),
                    fmt_grade(row.max_grade),
                ]);
            }
            println!("{}", builder.build().with(Style::rounded()));
            println!();
            println!(
                "Showing {} of {} used hold(s).",
                style(rows.len()).cyan(),
                used
            );
        }
    }

    Ok(())
}

fn fmt_grade(grade: Option<f64>) -> String {
    grade.map_or_else(|| "-".to_string(), |g| format!("{:.1}", g))
}
