//! Per-instance client handle with expiring sessions.
//!
//! A backend's authenticated client is produced by a [`ClientFactory`]. The
//! [`ClientHandle`] caches it and reconnects once half of the session
//! lifetime has elapsed. Refresh happens under a lock so concurrent callers
//! never observe a half-built session.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::traits::ObjectStorageClient;

/// An authenticated client and how long its credentials stay valid.
#[derive(Clone)]
pub struct ClientSession {
    /// Ready-to-use client.
    pub client: Arc<dyn ObjectStorageClient>,
    /// Lifetime of the underlying token (None = never expires).
    pub expires_in: Option<Duration>,
}

impl ClientSession {
    /// Session that never expires.
    pub fn permanent(client: Arc<dyn ObjectStorageClient>) -> Self {
        Self {
            client,
            expires_in: None,
        }
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Builds authenticated clients.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Authenticate and build a new client session.
    async fn connect(&self) -> Result<ClientSession, StorageError>;
}

/// Factory that always hands out the same client.
pub struct FixedClientFactory {
    client: Arc<dyn ObjectStorageClient>,
}

impl FixedClientFactory {
    /// Wrap an existing client.
    pub fn new(client: Arc<dyn ObjectStorageClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClientFactory for FixedClientFactory {
    async fn connect(&self) -> Result<ClientSession, StorageError> {
        Ok(ClientSession::permanent(self.client.clone()))
    }
}

struct CachedClient {
    client: Arc<dyn ObjectStorageClient>,
    /// When to reconnect (None = never).
    refresh_at: Option<Instant>,
}

impl CachedClient {
    fn is_fresh(&self, now: Instant) -> bool {
        self.refresh_at.map_or(true, |at| now < at)
    }
}

/// Owned handle to a lazily connected, refreshing client.
pub struct ClientHandle {
    factory: Arc<dyn ClientFactory>,
    cached: Mutex<Option<CachedClient>>,
}

impl ClientHandle {
    /// Create a handle that connects through `factory` on first use.
    ///
    /// # Arguments
    /// * `factory` - Source of authenticated sessions
    pub fn new(factory: impl ClientFactory + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            cached: Mutex::new(None),
        }
    }

    /// Create a handle around an already built client.
    ///
    /// # Arguments
    /// * `client` - Client to hand out on every call
    pub fn fixed(client: Arc<dyn ObjectStorageClient>) -> Self {
        Self::new(FixedClientFactory::new(client))
    }

    /// Get the current client, reconnecting if the cached session is stale.
    ///
    /// # Errors
    /// Returns the factory's error if reconnecting fails. The stale session
    /// is kept so a later call can retry.
    pub async fn client(&self) -> Result<Arc<dyn ObjectStorageClient>, StorageError> {
        let mut guard = self.cached.lock().await;
        let now: Instant = Instant::now();

        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.client.clone());
            }
            log::debug!("Storage client session is stale, reconnecting");
        }

        let session: ClientSession = self.factory.connect().await?;
        let refresh_at: Option<Instant> = session.expires_in.map(|ttl| now + ttl / 2);
        let client: Arc<dyn ObjectStorageClient> = session.client.clone();
        *guard = Some(CachedClient {
            client: session.client,
            refresh_at,
        });
        Ok(client)
    }

    /// Drop the cached session so the next call reconnects.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle").finish_non_exhaustive()
    }
}
