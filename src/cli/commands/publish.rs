//! `mastoc publish` and `mastoc amend` commands

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::commands::utils::open_context;
use crate::cli::helpers::format_grade;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::SyncEngine;
use crate::entities::Route;
use crate::remote::RoutePayload;

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Route name
    pub name: String,

    /// Holds list, e.g. "S829279 S829280 O829290 T829300"
    #[arg(long)]
    pub holds: String,

    /// Fontainebleau grade label
    #[arg(long)]
    pub grade: Option<String>,

    /// Face to publish on (default from config)
    #[arg(long)]
    pub face: Option<String>,

    /// Feet rule
    #[arg(long)]
    pub feet_rule: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Hide the route from other users
    #[arg(long)]
    pub private: bool,
}

#[derive(Args, Debug)]
pub struct AmendArgs {
    /// Route id
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub holds: Option<String>,

    #[arg(long)]
    pub grade: Option<String>,

    #[arg(long)]
    pub feet_rule: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Change visibility
    #[arg(long)]
    pub private: Option<bool>,
}

pub fn run_publish(args: PublishArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = open_context(global)?;
    let face_id = args
        .face
        .or_else(|| ctx.config.face_id.clone())
        .ok_or_else(|| miette::miette!("no face given; pass --face or set face_id in config"))?;

    let mut payload = RoutePayload::new(args.name, args.holds).with_private(args.private);
    if let Some(grade) = args.grade {
        payload = payload.with_grade_font(grade);
    }
    payload.feet_rule = args.feet_rule;
    payload.description = args.description;

    let mut engine = SyncEngine::new(ctx.router.primary(), &mut ctx.store);
    let route = engine.publish_route(&face_id, &payload)?;
    print_route("Published", &route, global.format)
}

pub fn run_amend(args: AmendArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = open_context(global)?;

    let payload = RoutePayload {
        name: args.name,
        holds_list: args.holds,
        grade_font: args.grade,
        feet_rule: args.feet_rule,
        description: args.description,
        is_private: args.private,
        ..Default::default()
    };

    let mut engine = SyncEngine::new(ctx.router.primary(), &mut ctx.store);
    let route = engine.amend_route(&args.id, &payload)?;
    print_route("Amended", &route, global.format)
}

fn print_route(verb: &str, route: &Route, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(route).into_diagnostic()?);
        }
        OutputFormat::Id => println!("{}", route.id),
        _ => {
            println!(
                "{} {} {} ({})",
                style("✓").green(),
                verb,
                style(&route.name).cyan(),
                route.id
            );
            println!("  Grade: {}", format_grade(route));
            println!("  Holds: {}", route.holds_list);
        }
    }
    Ok(())
}
