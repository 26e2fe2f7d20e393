//! Core module - local store, synchronization, indexing and configuration

pub mod authoring;
pub mod config;
pub mod index;
pub mod store;
pub mod sync;

pub use config::{Config, ConfigError};
pub use index::{HoldMatch, RouteHoldIndex, RouteQuery, SetterCount, SortKey};
pub use store::{LocalStore, StoreStats};
pub use sync::{
    Cancelled, SocialRefreshReport, SyncEngine, SyncMode, SyncOptions, SyncProgress, SyncResult,
    SyncStatus,
};
