//! `mastoc sync` command - pull routes and holds into the local store

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::args::OutputFormat;
use crate::cli::commands::utils::open_context;
use crate::cli::helpers::{finish_progress, progress_printer};
use crate::cli::GlobalOpts;
use crate::core::{SyncEngine, SyncOptions, SyncResult};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Download everything instead of routes created since the last sync
    #[arg(long)]
    pub full: bool,

    /// Wipe the local store before a full sync
    #[arg(long, requires = "full")]
    pub clear: bool,

    /// Restrict the sync to one face
    #[arg(long)]
    pub face: Option<String>,
}

pub fn run(args: SyncArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = open_context(global)?;
    let face_id = args.face.or_else(|| ctx.config.face_id.clone());

    if !global.quiet {
        eprintln!(
            "{} Syncing from {} ({})",
            style("→").blue(),
            style(ctx.router.active_kind()).cyan(),
            if args.full { "full" } else { "incremental" }
        );
    }

    let mut engine =
        SyncEngine::new(ctx.router.primary(), &mut ctx.store).with_options(SyncOptions { face_id });
    let mut progress = progress_printer(global.quiet);
    let result = if args.full {
        engine.sync_full(args.clear, &mut progress)?
    } else {
        engine.sync_incremental(&mut progress)?
    };
    finish_progress(global.quiet);

    print_result(&result, global.format)?;

    if result.success {
        Ok(())
    } else {
        Err(miette::miette!(
            "sync did not complete ({} error(s))",
            result.errors.len()
        ))
    }
}

fn print_result(result: &SyncResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(result).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(result).into_diagnostic()?;
            print!("{}", yaml);
        }
        _ => {
            if result.success {
                println!("{} {} sync complete", style("✓").green(), result.mode);
            } else {
                println!("{} {} sync incomplete", style("✗").red(), result.mode);
            }
            println!("  Downloaded:    {}", result.routes_downloaded);
            println!("  Routes added:  {}", style(result.routes_added).cyan());
            println!("  Updated:       {}", result.routes_updated);
            println!("  Holds saved:   {}", result.holds_added);
            println!("  Local routes:  {}", result.total_routes_local);

            if !result.errors.is_empty() {
                println!();
                for err in &result.errors {
                    println!("  {} {}", style("!").yellow(), err);
                }
            }
        }
    }
    Ok(())
}
