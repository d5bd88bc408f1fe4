//! Port traits for the collaborators the engine consumes.

pub mod alert_sink;
pub mod catalog_port;
pub mod config_port;
pub mod snapshot_port;
