// =============================================================================
// Redis Store — one shared client behind the counter and cache protocols
// =============================================================================
//
// Counters use INCR with EXPIRE pipelined in the same round trip.  Cache
// payloads are JSON and stored as plain strings with SET EX.
// =============================================================================

use std::time::Duration;

use anyhow::Error;
use async_trait::async_trait;
use fred::prelude::*;
use tracing::{error, info};

use super::{CacheStore, CounterStore, StoreError};

/// Redis-backed counter and cache store sharing one client.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        let config = Config::from_url(redis_url)?;

        let client = Builder::from_config(config)
            .with_connection_config(|config| {
                config.connection_timeout = Duration::from_secs(5);
                config.tcp = TcpConfig {
                    nodelay: Some(true),
                    ..Default::default()
                };
            })
            .build()?;

        client.on_error(|(error, server)| async move {
            error!("{:?}: Redis connection error: {:?}", server, error);
            Ok(())
        });

        client.connect();
        client.wait_for_connect().await?;
        info!("connected to Redis");

        Ok(Self { client })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.client.incr::<i64, _>(key).await.map_err(backend)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let secs = ttl.as_secs().max(1) as i64;
        let _: i64 = self.client.expire(key, secs, None).await.map_err(backend)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.client.get::<Option<i64>, _>(key).await.map_err(backend)
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let secs = ttl.as_secs().max(1) as i64;
        let pipeline = self.client.pipeline();
        let _: () = pipeline.incr(key).await.map_err(backend)?;
        let _: () = pipeline.expire(key, secs, None).await.map_err(backend)?;
        let (count, _): (i64, i64) = pipeline.all().await.map_err(backend)?;
        Ok(count)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let value: Option<String> = self.client.get(key).await.map_err(backend)?;
        Ok(value.map(String::into_bytes))
    }

    /// Payloads are JSON, so they are stored as Redis strings.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let value = String::from_utf8(value).map_err(backend)?;
        let secs = ttl.as_secs().max(1) as i64;
        self.client
            .set::<(), _, _>(key, value, Some(Expiration::EX(secs)), None, false)
            .await
            .map_err(backend)
    }
}
