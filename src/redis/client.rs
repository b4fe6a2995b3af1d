use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use redis::{Client, aio::ConnectionManager};

use crate::TurnstileError;

/// A round-robin set of [`redis::aio::ConnectionManager`]s sharing one [`Client`].
///
/// Each manager reconnects on its own; spreading calls over several of them
/// avoids head-of-line blocking behind a slow command on a single multiplexed
/// connection.
pub struct TurnstileRedisClient {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

impl TurnstileRedisClient {
    /// Create a client with a single connection manager.
    pub async fn default_from_client(client: Client) -> Result<Self, TurnstileError> {
        Self::from_client(client, 1).await
    }

    /// Create a client with `connection_count` connection managers.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, TurnstileError> {
        if connection_count == 0 {
            return Err(TurnstileError::InvalidRedisClientConnectionCount(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            connection_managers.push(client.get_connection_manager().await?);
        }

        Ok(Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        })
    }

    /// Open a client from a `redis://` URL.
    pub async fn open(url: &str, connection_count: usize) -> Result<Self, TurnstileError> {
        let client = Client::open(url)?;
        Self::from_client(client, connection_count).await
    }

    /// Number of connection managers calls are spread over.
    pub fn connection_count(&self) -> usize {
        self.connection_managers.len()
    }

    pub(crate) fn get(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    } // end method get
} // end impl TurnstileRedisClient

impl Clone for TurnstileRedisClient {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

impl fmt::Debug for TurnstileRedisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnstileRedisClient")
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}
