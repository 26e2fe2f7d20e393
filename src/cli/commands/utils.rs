//! Shared utilities for CLI commands

use miette::Result;

use crate::cli::GlobalOpts;
use crate::core::{Config, LocalStore};
use crate::remote::BackendRouter;

/// Everything a command needs to talk to the remote source and the local store
pub struct Context {
    pub config: Config,
    pub router: BackendRouter,
    pub store: LocalStore,
}

/// Load the layered config, applying `--config` and `--source`
pub fn load_config(global: &GlobalOpts) -> Result<Config> {
    let mut config = Config::load(global.config.as_deref())?;
    if let Some(source) = global.source {
        config.source = Some(source);
    }
    Ok(config)
}

/// Open the database of the active source
pub fn open_store(config: &Config) -> Result<LocalStore> {
    let path = config.store_path(config.source());
    tracing::debug!(path = %path.display(), "opening store");
    LocalStore::open(&path)
}

pub fn open_context(global: &GlobalOpts) -> Result<Context> {
    let config = load_config(global)?;
    let router = config.build_router()?;
    let store = open_store(&config)?;
    Ok(Context {
        config,
        router,
        store,
    })
}
