use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

// A healthy cache answers PING in single-digit millis; anything slower counts as down.
const PROBE_TIMEOUT_MILLISECS: u64 = 300;

#[derive(Error, Debug, Clone)]
pub enum CustomRedisError {
    #[error("connection was released")]
    Released,
    #[error("timed out")]
    Timeout,
    #[error(transparent)]
    Redis(#[from] Arc<redis::RedisError>),
}

impl From<redis::RedisError> for CustomRedisError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CustomRedisError::Timeout
        } else {
            CustomRedisError::Redis(Arc::new(err))
        }
    }
}

/// Shared handle on the cache. The connection is owned for the whole process
/// lifetime: acquired lazily on first use, released exactly once at shutdown.
#[async_trait]
pub trait Client {
    async fn ping(&self) -> Result<(), CustomRedisError>;

    /// Drop the live connection. Any later use fails with `Released`.
    async fn release(&self) -> Result<(), CustomRedisError>;

    fn is_connected(&self) -> bool;
}

/// Bounded liveness check against the cache. Returns true only on a
/// successful round-trip; errors and timeouts are logged, never surfaced.
pub async fn probe(client: &(dyn Client + Send + Sync)) -> bool {
    match timeout(Duration::from_millis(PROBE_TIMEOUT_MILLISECS), client.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            debug!(error = %err, "cache ping failed");
            false
        }
        Err(_) => {
            debug!("cache ping timed out");
            false
        }
    }
}

enum Connection {
    Idle,
    Connected(MultiplexedConnection),
    Released,
}

pub struct RedisClient {
    client: redis::Client,
    connection: Mutex<Connection>,
}

impl RedisClient {
    /// Does not connect: the connection is established on first use so that a
    /// down cache cannot keep the process from starting.
    pub fn new(addr: String) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(addr)?;

        Ok(RedisClient {
            client,
            connection: Mutex::new(Connection::Idle),
        })
    }

    fn lock_connection(&self) -> MutexGuard<'_, Connection> {
        match self.connection.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // Drop the cached connection so the next probe can re-establish it.
    fn invalidate(&self) {
        let mut slot = self.lock_connection();
        if let Connection::Connected(_) = *slot {
            *slot = Connection::Idle;
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CustomRedisError> {
        {
            let slot = self.lock_connection();
            match &*slot {
                Connection::Connected(conn) => return Ok(conn.clone()),
                Connection::Released => return Err(CustomRedisError::Released),
                Connection::Idle => {}
            }
        }

        let conn = self.client.get_multiplexed_async_connection().await?;

        let mut slot = self.lock_connection();
        if let Connection::Released = *slot {
            // release() won the race, do not resurrect the handle
            return Err(CustomRedisError::Released);
        }
        *slot = Connection::Connected(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn ping(&self) -> Result<(), CustomRedisError> {
        let mut conn = self.connection().await?;

        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => {
                self.invalidate();
                Err(err.into())
            }
        }
    }

    async fn release(&self) -> Result<(), CustomRedisError> {
        let mut slot = self.lock_connection();
        match std::mem::replace(&mut *slot, Connection::Released) {
            Connection::Connected(conn) => {
                drop(conn);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        matches!(*self.lock_connection(), Connection::Connected(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRedisCall {
    Ping,
    Release,
}

#[derive(Clone)]
pub struct MockRedisClient {
    ping_ret: Result<(), CustomRedisError>,
    release_ret: Result<(), CustomRedisError>,
    connected: Arc<std::sync::atomic::AtomicBool>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
}

impl Default for MockRedisClient {
    fn default() -> Self {
        Self {
            ping_ret: Ok(()),
            release_ret: Ok(()),
            connected: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockRedisClient {
    pub fn new() -> MockRedisClient {
        Self::default()
    }

    pub fn ping_ret(&mut self, ret: Result<(), CustomRedisError>) -> Self {
        self.ping_ret = ret;
        self.clone()
    }

    pub fn release_ret(&mut self, ret: Result<(), CustomRedisError>) -> Self {
        self.release_ret = ret;
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockRedisCall> {
        self.lock_calls().clone()
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<MockRedisCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn ping(&self) -> Result<(), CustomRedisError> {
        self.lock_calls().push(MockRedisCall::Ping);
        let ret = self.ping_ret.clone();
        if ret.is_ok() {
            self.connected
                .store(true, std::sync::atomic::Ordering::SeqCst);
        }
        ret
    }

    async fn release(&self) -> Result<(), CustomRedisError> {
        self.lock_calls().push(MockRedisCall::Release);
        let ret = self.release_ret.clone();
        if ret.is_ok() {
            self.connected
                .store(false, std::sync::atomic::Ordering::SeqCst);
        }
        ret
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
    }
}
