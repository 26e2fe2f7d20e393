//! `mastoc setters` command

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::commands::utils::{load_config, open_store};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::RouteHoldIndex;

#[derive(Args, Debug)]
pub struct SettersArgs {
    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

pub fn run(args: SettersArgs, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global)?;
    let store = open_store(&config)?;
    let index = RouteHoldIndex::from_store(&store);

    let setters = index.setters();
    let shown = &setters[..args.limit.unwrap_or(setters.len()).min(setters.len())];

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(shown).into_diagnostic()?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&shown).into_diagnostic()?);
        }
        OutputFormat::Tsv => {
            for setter in shown {
                println!("{}\t{}", setter.name, setter.route_count);
            }
        }
        OutputFormat::Id => {
            for setter in shown {
                println!("{}", setter.name);
            }
        }
        OutputFormat::Table | OutputFormat::Auto => {
            let mut builder = Builder::default();
            builder.push_record(["Setter", "Routes"]);
            for setter in shown {
                builder.push_record([setter.name.clone(), setter.route_count.to_string()]);
            }
            println!("{}", builder.build().with(Style::rounded()));
            println!();
            println!("{} setter(s) found.", style(setters.len()).cyan());
        }
    }

    Ok(())
}
