//! `mastoc routes` command - filter and sort routes

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::commands::utils::{load_config, open_store};
use crate::cli::helpers::{format_grade, truncate_str};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{HoldMatch, RouteHoldIndex, RouteQuery, SortKey};
use crate::entities::Route;

#[derive(Args, Debug)]
pub struct RoutesArgs {
    /// Hold ids to match (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub holds: Vec<i64>,

    /// Whether routes need all of --holds or any one of them
    #[arg(long, default_value = "all")]
    pub hold_match: HoldMatch,

    /// Search route names (case-insensitive)
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Lowest IRCRA grade
    #[arg(long)]
    pub min_grade: Option<f64>,

    /// Highest IRCRA grade
    #[arg(long)]
    pub max_grade: Option<f64>,

    /// Fontainebleau grade labels (e.g. 6A+,6B)
    #[arg(long, value_delimiter = ',')]
    pub grade: Vec<String>,

    /// Only routes by these setters
    #[arg(long, value_delimiter = ',')]
    pub setter: Vec<String>,

    /// Hide routes by these setters (ignored with --setter)
    #[arg(long, value_delimiter = ',')]
    pub exclude_setter: Vec<String>,

    /// Setter name contains this text (case-insensitive)
    #[arg(long)]
    pub setter_like: Option<String>,

    /// Feet rules to keep (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub feet: Vec<String>,

    /// Sort field
    #[arg(long, default_value = "date")]
    pub sort: SortKey,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub asc: bool,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Show count only
    #[arg(long)]
    pub count: bool,
}

pub fn run(args: RoutesArgs, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global)?;
    let store = open_store(&config)?;
    let index = RouteHoldIndex::from_store(&store);

    let query = RouteQuery::default()
        .with_holds(args.holds.iter().copied())
        .matching_holds(args.hold_match)
        .with_grades(args.min_grade, args.max_grade)
        .with_grade_labels(&args.grade)
        .including_setters(args.setter.iter().cloned())
        .excluding_setters(args.exclude_setter.iter().cloned())
        .setter_containing(args.setter_like)
        .with_feet_rules(args.feet.iter().cloned())
        .name_containing(args.search)
        .sorted_by(args.sort, !args.asc);
    let mut routes = index.filtered_routes(&query);
    tracing::debug!(matches = routes.len(), sort = ?args.sort, "filtered routes");

    if let Some(limit) = args.limit {
        routes.truncate(limit);
    }

    if args.count {
        println!("{}", routes.len());
        return Ok(());
    }

    if routes.is_empty() {
        match global.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Yaml => println!("[]"),
            _ => println!("No routes found."),
        }
        return Ok(());
    }

    let format = match global.format {
        OutputFormat::Auto => OutputFormat::Table,
        f => f,
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&routes).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(&routes).into_diagnostic()?;
            print!("{}", yaml);
        }
        OutputFormat::Tsv => {
            println!("id\tname\tgrade_font\tircra\tsetter\tface_id\tholds_list\tascents\tlikes\tcomments");
            for route in &routes {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    route.id,
                    route.name,
                    route.grade.as_ref().map(|g| g.font.as_str()).unwrap_or(""),
                    route.ircra(),
                    route.setter_name().unwrap_or(""),
                    route.face_id,
                    route.holds_list,
                    route.ascents,
                    route.likes,
                    route.comments
                );
            }
        }
        OutputFormat::Id => {
            for route in &routes {
                println!("{}", route.id);
            }
        }
        OutputFormat::Table | OutputFormat::Auto => {
            print_table(&routes);
            println!();
            println!("{} route(s) found.", style(routes.len()).cyan());
        }
    }

    Ok(())
}

fn print_table(routes: &[&Route]) {
    let mut builder = Builder::default();
    builder.push_record(["ID", "Name", "Grade", "Setter", "Holds", "Ascents", "Likes", "Created"]);

    for route in routes {
        builder.push_record([
            truncate_str(&route.id, 12),
            truncate_str(&route.name, 28),
            format_grade(route),
            truncate_str(route.setter_name().unwrap_or("-"), 16),
            route.holds().len().to_string(),
            route.ascents.to_string(),
            route.likes.to_string(),
            route.created_at.format("%Y-%m-%d").to_string(),
        ]);
    }

    println!("{}", builder.build().with(Style::rounded()));
}
