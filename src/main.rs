use clap::Parser;
use miette::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mastoc::cli::commands;
use mastoc::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Terminate quietly when piped into `head` and friends
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    let default_level = if global.verbose { "mastoc=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("MASTOC_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Sync(args) => commands::sync::run(args, &global),
        Commands::Status => commands::status::run(&global),
        Commands::Routes(args) => commands::routes::run(args, &global),
        Commands::Holds(args) => commands::holds::run(args, &global),
        Commands::Setters(args) => commands::setters::run(args, &global),
        Commands::RefreshSocial(args) => commands::social::run(args, &global),
        Commands::Login(args) => commands::login::run(args, &global),
        Commands::Publish(args) => commands::publish::run_publish(args, &global),
        Commands::Amend(args) => commands::publish::run_amend(args, &global),
    }
}
