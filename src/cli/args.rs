//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    holds::HoldsArgs,
    login::LoginArgs,
    publish::{AmendArgs, PublishArgs},
    routes::RoutesArgs,
    setters::SettersArgs,
    social::RefreshSocialArgs,
    sync::SyncArgs,
};
use crate::remote::BackendKind;

#[derive(Parser)]
#[command(name = "mastoc")]
#[command(author, version, about = "Bouldering wall route sync and hold index")]
#[command(long_about = "Synchronizes routes and hold geometry from a remote gym service into a local database, and answers hold, grade and setter queries over it.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable debug logging (overridden by MASTOC_LOG)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Extra config file, layered over the global one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Remote source to use (overrides config and MASTOC_SOURCE)
    #[arg(long, global = true)]
    pub source: Option<BackendKind>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pull routes and holds from the remote source
    Sync(SyncArgs),

    /// Show local store status
    Status,

    /// List routes matching hold, grade and setter filters
    Routes(RoutesArgs),

    /// Show hold usage statistics
    Holds(HoldsArgs),

    /// List setters by number of routes
    Setters(SettersArgs),

    /// Refresh likes, comments and ascents from the remote source
    RefreshSocial(RefreshSocialArgs),

    /// Log in with a username and password and keep the session token
    Login(LoginArgs),

    /// Create a route on the remote source
    Publish(PublishArgs),

    /// Edit an existing route on the remote source
    Amend(AmendArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Table for terminals
    #[default]
    Auto,
    /// Bordered table
    Table,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// YAML format
    Yaml,
    /// Just IDs, one per line
    Id,
}
