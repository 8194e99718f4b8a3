use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Redis connection used as the shared session cache backend
#[derive(Clone)]
pub struct RedisService {
    conn: ConnectionManager,
}

impl RedisService {
    /// Create a new Redis service with connection pooling
    pub async fn new(redis_url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Set a raw string value with expiration (seconds)
    pub async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, ttl_seconds).await
    }

    /// Get a raw string value
    pub async fn get(&self, key: &str) -> redis::RedisResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    /// Delete a key
    pub async fn del(&self, key: &str) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();
        conn.del(key).await
    }

    /// Ping Redis to check connection
    pub async fn ping(&self) -> redis::RedisResult<bool> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}
