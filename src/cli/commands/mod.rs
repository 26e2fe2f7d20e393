//! CLI command implementations

pub mod utils;

pub mod holds;
pub mod login;
pub mod publish;
pub mod routes;
pub mod setters;
pub mod social;
pub mod status;
pub mod sync;
