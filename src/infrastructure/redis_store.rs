//! Redis-backed store implementation.
//!
//! Provides a distributed backend for the store port, allowing budgets and
//! breaker state to be shared across application instances.
//!
//! ## Architecture
//!
//! - Budgets: one hash per limiter key (`count`, `epoch_start`), incremented
//!   by a Lua script so the read-rollover-increment sequence is atomic on the
//!   server. The key's TTL tracks the epoch duration.
//! - Breaker state: one hash per resource (`version`, `state`), where
//!   `state` is a bincode blob of [`CircuitBreakerState`] and `version`
//!   backs the compare-and-swap; the save script commits only when the
//!   stored version matches the writer's expectation.
//!
//! ## Error Handling
//!
//! Every Redis failure surfaces as [`StoreError::Unavailable`] and undecodable
//! records as [`StoreError::Corrupt`]; nothing is swallowed here, because the
//! engine's fail-open/fail-closed policy is the layer that decides what a
//! store outage means.
//!
//! ## Example
//!
//! ```rust,ignore
//! use abuse_guard::{RedisStore, RedisStoreConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RedisStoreConfig {
//!         key_prefix: "abuse-guard:".to_string(),
//!         breaker_ttl: Some(Duration::from_secs(7 * 86_400)),
//!     };
//!
//!     let store = RedisStore::connect_with_config("redis://127.0.0.1/", config)
//!         .await
//!         .expect("Failed to connect to Redis");
//! }
//! ```

use crate::application::ports::{
    CasOutcome, Clock, RateLimitStore, StoreError, VersionedBreakerState,
};
use crate::domain::breaker::CircuitBreakerState;
use crate::domain::budget::BudgetRecord;
use crate::infrastructure::clock::SystemClock;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Atomic increment-and-read with epoch rollover, server-side.
const INCREMENT_BUDGET_SCRIPT: &str = r"
local count = tonumber(redis.call('HGET', KEYS[1], 'count') or '0')
local start = tonumber(redis.call('HGET', KEYS[1], 'epoch_start') or '-1')
local now = tonumber(ARGV[1])
local dur = tonumber(ARGV[2])
if start < 0 or now >= start + dur then
  count = 0
  start = now
end
count = count + 1
redis.call('HSET', KEYS[1], 'count', count, 'epoch_start', start)
redis.call('EXPIRE', KEYS[1], dur)
return {count, start}
";

/// Compare-and-swap on the stored version, server-side.
const SAVE_BREAKER_SCRIPT: &str = r"
local ver = tonumber(redis.call('HGET', KEYS[1], 'version') or '0')
if ver ~= tonumber(ARGV[1]) then
  return 0
end
redis.call('HSET', KEYS[1], 'version', ver + 1, 'state', ARGV[2])
local ttl = tonumber(ARGV[3])
if ttl > 0 then
  redis.call('EXPIRE', KEYS[1], ttl)
end
return 1
";

/// Configuration for Redis storage.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Key prefix for all records (default: "abuse-guard:")
    pub key_prefix: String,
    /// Optional TTL for idle breaker records; `None` keeps them indefinitely
    pub breaker_ttl: Option<Duration>,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "abuse-guard:".to_string(),
            breaker_ttl: None,
        }
    }
}

/// Redis-backed store for distributed abuse defense.
///
/// Multiple application instances sharing one Redis see the same budgets and
/// breaker states; the Lua scripts keep the contract's atomicity guarantees
/// on the server side.
pub struct RedisStore {
    connection: Arc<RwLock<ConnectionManager>>,
    config: RedisStoreConfig,
    clock: Arc<dyn Clock>,
    increment_script: Script,
    save_script: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Clone for RedisStore {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            increment_script: Script::new(INCREMENT_BUDGET_SCRIPT),
            save_script: Script::new(SAVE_BREAKER_SCRIPT),
        }
    }
}

impl RedisStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL
    /// * `config` - Store configuration
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection: Arc::new(RwLock::new(connection)),
            config,
            clock: Arc::new(SystemClock::new()),
            increment_script: Script::new(INCREMENT_BUDGET_SCRIPT),
            save_script: Script::new(SAVE_BREAKER_SCRIPT),
        })
    }

    fn budget_key(&self, key: &str) -> String {
        format!("{}budget:{}", self.config.key_prefix, key)
    }

    fn breaker_key(&self, resource: &str) -> String {
        format!("{}cb:{}", self.config.key_prefix, resource)
    }

    /// Bridge the sync store trait onto async Redis operations.
    ///
    /// In an async context the call runs on the current runtime via
    /// `block_in_place`; outside one, a throwaway runtime drives it.
    fn block_on<T>(&self, operation: impl Future<Output = T>) -> T {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| handle.block_on(operation))
        } else {
            let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
            rt.block_on(operation)
        }
    }
}

fn unavailable(error: RedisError) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

impl RateLimitStore for RedisStore {
    fn increment_budget(
        &self,
        key: &str,
        epoch_duration: Duration,
    ) -> Result<BudgetRecord, StoreError> {
        let redis_key = self.budget_key(key);
        let now = self.clock.now();

        self.block_on(async {
            let mut conn = self.connection.write().await;
            let (count, epoch_start): (u64, u64) = self
                .increment_script
                .key(&redis_key)
                .arg(now)
                .arg(epoch_duration.as_secs())
                .invoke_async(&mut *conn)
                .await
                .map_err(unavailable)?;

            Ok(BudgetRecord { count, epoch_start })
        })
    }

    fn get_budget(&self, key: &str) -> Result<Option<BudgetRecord>, StoreError> {
        let redis_key = self.budget_key(key);

        self.block_on(async {
            let mut conn = self.connection.write().await;
            let (count, epoch_start): (Option<u64>, Option<u64>) = redis::cmd("HMGET")
                .arg(&redis_key)
                .arg("count")
                .arg("epoch_start")
                .query_async(&mut *conn)
                .await
                .map_err(unavailable)?;

            Ok(match (count, epoch_start) {
                (Some(count), Some(epoch_start)) => Some(BudgetRecord { count, epoch_start }),
                _ => None,
            })
        })
    }

    fn get_breaker(&self, resource: &str) -> Result<Option<VersionedBreakerState>, StoreError> {
        let redis_key = self.breaker_key(resource);

        self.block_on(async {
            let mut conn = self.connection.write().await;
            let (version, blob): (Option<u64>, Option<Vec<u8>>) = redis::cmd("HMGET")
                .arg(&redis_key)
                .arg("version")
                .arg("state")
                .query_async(&mut *conn)
                .await
                .map_err(unavailable)?;

            match (version, blob) {
                (Some(version), Some(blob)) => {
                    let state: CircuitBreakerState = bincode::deserialize(&blob)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                    Ok(Some(VersionedBreakerState { state, version }))
                }
                _ => Ok(None),
            }
        })
    }

    fn save_breaker(
        &self,
        resource: &str,
        expected_version: Option<u64>,
        state: &CircuitBreakerState,
    ) -> Result<CasOutcome, StoreError> {
        let redis_key = self.breaker_key(resource);
        let blob =
            bincode::serialize(state).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let ttl_secs = self
            .config
            .breaker_ttl
            .map(|ttl| ttl.as_secs())
            .unwrap_or(0);

        self.block_on(async {
            let mut conn = self.connection.write().await;
            let committed: u64 = self
                .save_script
                .key(&redis_key)
                .arg(expected_version.unwrap_or(0))
                .arg(blob)
                .arg(ttl_secs)
                .invoke_async(&mut *conn)
                .await
                .map_err(unavailable)?;

            Ok(if committed == 1 {
                CasOutcome::Committed
            } else {
                CasOutcome::Conflict
            })
        })
    }
}
