//! `mastoc status` command - local store dashboard

use chrono::Utc;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::commands::utils::open_context;
use crate::cli::helpers::format_local_time;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::SyncEngine;

pub fn run(global: &GlobalOpts) -> Result<()> {
    let mut ctx = open_context(global)?;
    let source = ctx.router.active_kind();
    let fallback = ctx.router.fallback_enabled();
    let store_path = ctx.config.store_path(source);

    let engine = SyncEngine::new(ctx.router.primary(), &mut ctx.store);
    let status = engine.status();
    let stale = engine.needs_sync(Utc::now());
    let stats = engine.store().stats();

    match global.format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "source": source,
                "fallback": fallback,
                "store": store_path,
                "status": status,
                "stats": stats,
                "needs_sync": stale,
            });
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        _ => {
            println!("{}", style("Mastoc Status").bold());
            println!("{}", style("─".repeat(40)).dim());
            println!("Source:      {}", style(source).cyan());
            println!("Fallback:    {}", if fallback { "enabled" } else { "disabled" });
            println!("Store:       {}", store_path.display());
            match status.last_sync {
                Some(at) => println!("Last sync:   {}", format_local_time(at)),
                None => println!("Last sync:   {}", style("never").yellow()),
            }
            println!();
            println!("Routes:      {}", style(stats.routes).cyan());
            println!("Holds:       {}", stats.holds);
            println!("Faces:       {}", stats.faces);
            println!("Setters:     {}", stats.setters);
            println!();
            if stale {
                println!(
                    "{} Data is stale, run {}",
                    style("!").yellow(),
                    style("mastoc sync").cyan()
                );
            } else {
                println!("{} Up to date", style("✓").green());
            }
        }
    }

    Ok(())
}
