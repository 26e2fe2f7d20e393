//! mastoc: route and hold synchronization for bouldering walls
//!
//! Pulls routes and hold geometry from a remote service into a local SQLite
//! store, and indexes the snapshot for hold, grade and setter queries.

pub mod cli;
pub mod core;
pub mod entities;
pub mod remote;
