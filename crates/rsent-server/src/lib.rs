//! rsent-server: configuration and wiring for the entitlements service.
//!
//! This crate turns a [`ServerConfig`] into a running service graph:
//! - `config.rs` - layered configuration (defaults, YAML file, environment)
//! - logging initialization backed by `tracing-subscriber`
//! - storage backend selection (in-memory or PostgreSQL)
//! - [`GroupService`] assembly with protected-member and service-account
//!   policy loaded from configuration

pub mod config;

pub use config::{
    ConfigLoadError, EntitlementsSettings, LoggingSettings, ServerConfig, StorageSettings,
};

use std::sync::Arc;

use rsent_domain::{
    GroupService, ProtectedMembersConfig, ServiceAccountsConfig, ServiceConfig,
};
use rsent_storage::{
    MemoryReferenceStore, PostgresConfig, PostgresReferenceStore, ReferenceStore,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Errors raised while assembling the service from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error("storage initialization failed: {0}")]
    Storage(#[from] rsent_storage::StorageError),

    #[error("failed to read protected members file '{path}': {source}")]
    ProtectedMembersFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid protected members file '{path}': {message}")]
    ProtectedMembersParse { path: String, message: String },
}

/// Initialize the global tracing subscriber from logging settings.
///
/// `RUST_LOG` takes precedence over the configured level. Safe to call
/// more than once; later calls are ignored.
pub fn init_tracing(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));

    if settings.json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true).with_target(true));
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true));
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Build the reference store named by the storage settings.
///
/// The postgres backend connects, applies migrations, and is ready to
/// serve; the memory backend is for development and tests.
pub async fn build_store(
    settings: &StorageSettings,
) -> Result<Arc<dyn ReferenceStore>, ServerError> {
    match settings.backend.as_str() {
        "postgres" => {
            let database_url = settings.database_url.clone().ok_or_else(|| {
                ConfigLoadError::Invalid {
                    message: "storage.database_url is required when backend is 'postgres'"
                        .to_string(),
                }
            })?;
            let pg_config = PostgresConfig {
                database_url,
                max_connections: settings.pool_size,
                connect_timeout_secs: settings.connection_timeout_secs,
                ..PostgresConfig::default()
            };
            let store = PostgresReferenceStore::from_config(&pg_config).await?;
            store.run_migrations().await?;
            tracing::info!(pool_size = settings.pool_size, "connected to postgres backend");
            Ok(Arc::new(store))
        }
        "memory" => {
            tracing::info!("using in-memory backend");
            Ok(Arc::new(MemoryReferenceStore::new()))
        }
        other => Err(ServerError::Config(ConfigLoadError::Invalid {
            message: format!("unknown storage backend: {other}"),
        })),
    }
}

/// Assemble the group service over the configured backend.
pub async fn build_group_service(
    config: &ServerConfig,
) -> Result<GroupService<dyn ReferenceStore>, ServerError> {
    let store = build_store(&config.storage).await?;
    build_group_service_with_store(config, store)
}

/// Assemble the group service over an already-built store.
pub fn build_group_service_with_store(
    config: &ServerConfig,
    store: Arc<dyn ReferenceStore>,
) -> Result<GroupService<dyn ReferenceStore>, ServerError> {
    let ent = &config.entitlements;

    let service_config = ServiceConfig::new(&ent.domain)
        .with_max_parents(ent.max_parents)
        .with_data_root_quota(ent.data_root_quota);

    let service_accounts = ServiceAccountsConfig::new(&ent.service_account);

    let protected = match &ent.protected_members_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| {
                ServerError::ProtectedMembersFile {
                    path: path.clone(),
                    source,
                }
            })?;
            ProtectedMembersConfig::from_json(&raw).map_err(|e| {
                ServerError::ProtectedMembersParse {
                    path: path.clone(),
                    message: e.to_string(),
                }
            })?
        }
        None => ProtectedMembersConfig::default(),
    };

    Ok(GroupService::new(store, service_config, service_accounts)
        .with_protected_members(protected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn memory_backend_builds_a_working_service() {
        let config = ServerConfig::default();
        let service = build_group_service(&config).await.unwrap();

        // An empty store yields an empty membership closure.
        let tree = service
            .get_parents("ghost@contoso.com", "opendes", false)
            .await
            .unwrap();
        assert!(tree.parent_references.is_empty());
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let mut config = ServerConfig::default();
        config.storage.backend = "redis".to_string();

        let err = build_store(&config.storage).await.map(|_| ()).unwrap_err();
        assert!(err.to_string().contains("unknown storage backend"));
    }

    #[tokio::test]
    async fn postgres_backend_without_url_is_rejected() {
        let settings = StorageSettings {
            backend: "postgres".to_string(),
            database_url: None,
            ..StorageSettings::default()
        };

        let err = build_store(&settings).await.map(|_| ()).unwrap_err();
        assert!(err.to_string().contains("database_url"));
    }

    #[tokio::test]
    async fn protected_members_are_loaded_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"groups": [{{"name": "users", "members": [{{"name": "keeper@contoso.com"}}]}}]}}"#
        )
        .unwrap();

        let mut config = ServerConfig::default();
        config.entitlements.protected_members_file =
            Some(file.path().display().to_string());

        // Building succeeds and the policy is attached; removal protection
        // itself is exercised in the domain crate's tests.
        build_group_service(&config).await.unwrap();
    }

    #[tokio::test]
    async fn a_missing_protected_members_file_is_an_error() {
        let mut config = ServerConfig::default();
        config.entitlements.protected_members_file =
            Some("/nonexistent/protected.json".to_string());

        let err = build_group_service(&config).await.map(|_| ()).unwrap_err();
        assert!(matches!(err, ServerError::ProtectedMembersFile { .. }));
    }

    #[tokio::test]
    async fn malformed_protected_members_json_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json at all").unwrap();

        let mut config = ServerConfig::default();
        config.entitlements.protected_members_file =
            Some(file.path().display().to_string());

        let err = build_group_service(&config).await.map(|_| ()).unwrap_err();
        assert!(matches!(err, ServerError::ProtectedMembersParse { .. }));
    }
}
