//! `mastoc login` command - exchange a username and password for a session token

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs;

use crate::cli::commands::utils::load_config;
use crate::cli::GlobalOpts;
use crate::remote::{BackendKind, Credentials};

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account name (default from config)
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Account password (default from config)
    #[arg(long, env = "MASTOC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

pub fn run(args: LoginArgs, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global)?;
    let kind = config.source();

    let (config_user, config_password) = match kind {
        BackendKind::Legacy => (&config.legacy.username, &config.legacy.password),
        BackendKind::Managed => (&config.managed.username, &config.managed.password),
    };
    let username = args
        .username
        .or_else(|| config_user.clone())
        .ok_or_else(|| miette::miette!("no username given for {}", kind))?;
    let password = args
        .password
        .or_else(|| config_password.clone())
        .ok_or_else(|| miette::miette!("no password given for {}", kind))?;

    let mut source = config.build_source(kind)?;
    let token = source.authenticate(&Credentials::Password { username, password })?;

    let path = config.session_token_path(kind);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).into_diagnostic()?;
    }
    fs::write(&path, &token).into_diagnostic()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).into_diagnostic()?;
    }

    println!("{} Logged in to {}", style("✓").green(), style(kind).cyan());
    println!("  Token saved to {}", style(path.display()).dim());
    Ok(())
}
