//! Concrete adapter implementations for ports.

pub mod alert_rows;
pub mod file_config_adapter;
pub mod memory_adapter;
#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;

use crate::domain::error::AlertgenError;
use crate::ports::alert_sink::AlertSink;
use crate::ports::catalog_port::CatalogPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::snapshot_port::SnapshotPort;

/// A backend serving the catalog, the snapshots and the alert sink at once.
pub trait Storage: Send + Sync {
    fn catalog(&self) -> &dyn CatalogPort;
    fn snapshots(&self) -> &dyn SnapshotPort;
    fn sink(&self) -> &dyn AlertSink;
}

impl<T> Storage for T
where
    T: CatalogPort + SnapshotPort + AlertSink + Send + Sync,
{
    fn catalog(&self) -> &dyn CatalogPort {
        self
    }

    fn snapshots(&self) -> &dyn SnapshotPort {
        self
    }

    fn sink(&self) -> &dyn AlertSink {
        self
    }
}

/// Open the backend named by `[database] backend` (default `sqlite`).
pub fn open_storage(config: &dyn ConfigPort) -> Result<Box<dyn Storage>, AlertgenError> {
    let backend = config
        .get_string("database", "backend")
        .unwrap_or_else(|| "sqlite".to_string())
        .trim()
        .to_lowercase();

    match backend.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Box::new(sqlite_adapter::SqliteAdapter::from_config(config)?)),
        #[cfg(feature = "postgres")]
        "postgres" => Ok(Box::new(postgres_adapter::PostgresAdapter::from_config(
            config,
        )?)),
        other => Err(AlertgenError::ConfigInvalid {
            section: "database".into(),
            key: "backend".into(),
            reason: format!("unsupported backend '{other}' in this build"),
        }),
    }
}
