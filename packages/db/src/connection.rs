//! Database connection management.

use jobstore_core::StorageError;
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect as connect_any};
use surrealdb::opt::auth::Root;
use thiserror::Error;

/// Database connection handle. Cheap to clone; clones share the connection.
pub type Database = Surreal<Any>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection endpoint: "mem://", "rocksdb://path", "ws://host:port", ...
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use
    pub database: String,
    /// Optional root credentials for authentication
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "jobstore".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for a remote server, e.g. `ws://localhost:8000`
    /// (requires remote feature).
    pub fn remote(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Create a config for RocksDB persistence (requires rocksdb feature).
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("rocksdb://{}", path.into()),
            ..Default::default()
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set root credentials for authentication.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// Whether the store aborted the statement because a concurrent
    /// transaction touched the same records. Such statements had no effect.
    pub fn is_conflict(&self) -> bool {
        match self {
            DbError::Connection(surrealdb::Error::Db(surrealdb::error::Db::TxRetryable { .. })) => {
                true
            }
            // Remote engines only hand back the server's message
            DbError::Connection(surrealdb::Error::Api(e)) => {
                e.to_string().contains("can be retried")
            }
            _ => false,
        }
    }
}

impl From<DbError> for StorageError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => StorageError::NotFound(what),
            other => StorageError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Open a connection and select the configured namespace and database.
pub async fn connect(config: &DbConfig) -> Result<Database, DbError> {
    tracing::info!("Connecting to database: {}", config.endpoint);

    let db = connect_any(config.endpoint.as_str()).await?;

    // Authenticate if credentials provided
    if let Some((username, password)) = &config.credentials {
        db.signin(Root { username, password }).await?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await?;

    tracing::info!(
        "Connected to database: {}/{}",
        config.namespace,
        config.database
    );

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::DbError;

    #[test]
    fn retryable_transaction_is_a_conflict() {
        let err = DbError::Connection(surrealdb::Error::Db(surrealdb::error::Db::TxRetryable));
        assert!(err.is_conflict());
    }

    #[test]
    fn other_errors_are_not_conflicts() {
        // Message text alone does not make an embedded error a conflict
        let thrown = surrealdb::error::Db::Thrown("this transaction can be retried".into());
        assert!(!DbError::Connection(surrealdb::Error::Db(thrown)).is_conflict());
        assert!(!DbError::NotFound("job:1".into()).is_conflict());
    }
}
