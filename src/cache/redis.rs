//! Redis-backed cache store.
//!
//! Operations use short connection and response timeouts so an unresponsive
//! Redis degrades the pipeline to always-miss instead of blocking it.

use super::CacheStore;
use crate::{Error, Result};
use redis::{Client, Commands, Connection};
use std::sync::Mutex;
use std::time::Duration;

/// Response timeout for Redis commands.
const REDIS_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis cache store.
///
/// Maintains a reusable connection behind a `Mutex<Option<Connection>>`.
/// The connection is lazily created and handed back after each operation;
/// a broken connection is simply dropped and replaced on the next call.
pub struct RedisStore {
    client: Client,
    connection: Mutex<Option<Connection>>,
}

impl RedisStore {
    /// Creates a store for the given connection URL.
    ///
    /// The connection itself is established lazily, so construction succeeds
    /// even while Redis is down.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn new(connection_url: &str) -> Result<Self> {
        let client = Client::open(connection_url).map_err(|e| Error::OperationFailed {
            operation: "redis_connect".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    /// Creates a store against a local default Redis.
    ///
    /// # Errors
    ///
    /// Returns an error if the default URL cannot be parsed.
    pub fn with_defaults() -> Result<Self> {
        Self::new("redis://localhost:6379")
    }

    fn get_connection(&self) -> Result<Connection> {
        let mut guard = self.connection.lock().map_err(|e| Error::OperationFailed {
            operation: "redis_lock_connection".to_string(),
            cause: e.to_string(),
        })?;

        if let Some(conn) = guard.take() {
            return Ok(conn);
        }

        let conn = self
            .client
            .get_connection_with_timeout(REDIS_TIMEOUT)
            .map_err(|e| Error::OperationFailed {
                operation: "redis_get_connection".to_string(),
                cause: e.to_string(),
            })?;

        conn.set_read_timeout(Some(REDIS_TIMEOUT))
            .map_err(|e| Error::OperationFailed {
                operation: "redis_set_read_timeout".to_string(),
                cause: e.to_string(),
            })?;
        conn.set_write_timeout(Some(REDIS_TIMEOUT))
            .map_err(|e| Error::OperationFailed {
                operation: "redis_set_write_timeout".to_string(),
                cause: e.to_string(),
            })?;

        Ok(conn)
    }

    fn return_connection(&self, conn: Connection) {
        if let Ok(mut guard) = self.connection.lock() {
            *guard = Some(conn);
        }
        // If the lock fails, dropping the connection is fine.
    }

    fn scan_keys(&self, conn: &mut Connection, pattern: &str) -> Result<Vec<String>> {
        conn.keys(pattern).map_err(|e| Error::OperationFailed {
            operation: "redis_keys".to_string(),
            cause: e.to_string(),
        })
    }
}

impl CacheStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection()?;
        let result: redis::RedisResult<Option<String>> = conn.get(key);
        match result {
            Ok(value) => {
                self.return_connection(conn);
                Ok(value)
            },
            Err(e) => Err(Error::OperationFailed {
                operation: "redis_get".to_string(),
                cause: e.to_string(),
            }),
        }
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.get_connection()?;
        let result: redis::RedisResult<()> = conn.set_ex(key, value, ttl.as_secs());
        match result {
            Ok(()) => {
                self.return_connection(conn);
                Ok(())
            },
            Err(e) => Err(Error::OperationFailed {
                operation: "redis_set_ex".to_string(),
                cause: e.to_string(),
            }),
        }
    }

    fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.get_connection()?;
        let keys = self.scan_keys(&mut conn, pattern)?;
        if keys.is_empty() {
            self.return_connection(conn);
            return Ok(0);
        }

        let result: redis::RedisResult<usize> = conn.del(&keys);
        match result {
            Ok(deleted) => {
                self.return_connection(conn);
                Ok(deleted)
            },
            Err(e) => Err(Error::OperationFailed {
                operation: "redis_del".to_string(),
                cause: e.to_string(),
            }),
        }
    }

    fn key_count(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.get_connection()?;
        let keys = self.scan_keys(&mut conn, pattern)?;
        self.return_connection(conn);
        Ok(keys.len())
    }
}
