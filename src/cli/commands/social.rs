//! `mastoc refresh-social` command - re-fetch likes, comments and ascents

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::time::Duration;

use crate::cli::commands::utils::open_context;
use crate::cli::helpers::{finish_progress, progress_printer};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::SyncEngine;

#[derive(Args, Debug)]
pub struct RefreshSocialArgs {
    /// Refresh a single route
    #[arg(long)]
    pub route: Option<String>,

    /// Pause between remote calls in milliseconds (default from config)
    #[arg(long)]
    pub delay_ms: Option<u64>,
}

pub fn run(args: RefreshSocialArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = open_context(global)?;
    let delay = args
        .delay_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| ctx.config.social_refresh_delay());

    let engine = SyncEngine::new(ctx.router.primary(), &mut ctx.store);

    if let Some(route_id) = &args.route {
        if engine.store().get_route(route_id).is_none() {
            return Err(miette::miette!("route '{}' is not in the local store", route_id));
        }
        let changed = engine.refresh_social_counts(route_id)?;
        if changed {
            println!("{} Updated counters of {}", style("✓").green(), style(route_id).cyan());
        } else {
            println!("{} Counters of {} unchanged", style("✓").green(), style(route_id).cyan());
        }
        return Ok(());
    }

    let mut progress = progress_printer(global.quiet);
    let report = engine.refresh_all_social_counts(delay, &mut progress)?;
    finish_progress(global.quiet);

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        _ => {
            println!(
                "{} Refreshed {} of {} route(s)",
                style("✓").green(),
                style(report.updated).cyan(),
                report.total
            );
            if report.errors > 0 {
                println!("  {} {} route(s) failed", style("!").yellow(), report.errors);
            }
            if report.cancelled {
                println!("  {} cancelled", style("!").yellow());
            }
        }
    }

    Ok(())
}
