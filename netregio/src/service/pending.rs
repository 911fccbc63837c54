use std::time::Duration;

use redis::{aio::MultiplexedConnection, AsyncCommands};

use crate::schema::PendingRegistration;

/// Key template for staged registrations, parameterized by email.
pub const PENDING_KEY_PREFIX: &str = "two_commits";

/// Cache holding staged registrations between `create` and `confirm`.
/// Entries expire on their own after the configured lifetime; `put`
/// overwrites any previous entry for the same email.
pub trait PendingStore {
    fn put(
        &self,
        email: &str,
        staged: &PendingRegistration,
    ) -> impl std::future::Future<Output = crate::error::Result<()>>;
    fn get(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = crate::error::Result<Option<PendingRegistration>>>;
    fn remove(&self, email: &str) -> impl std::future::Future<Output = crate::error::Result<()>>;
}

#[derive(Clone)]
pub struct RedisPendingStore {
    conn: MultiplexedConnection,
    lifetime: Duration,
}

impl RedisPendingStore {
    pub fn new(conn: MultiplexedConnection, lifetime: Duration) -> Self {
        Self { conn, lifetime }
    }

    fn key(email: &str) -> String {
        format!("{PENDING_KEY_PREFIX}:{email}")
    }
}

impl PendingStore for RedisPendingStore {
    async fn put(&self, email: &str, staged: &PendingRegistration) -> crate::error::Result<()> {
        let mut conn = self.conn.clone();
        let value = serde_json::to_string(staged)?;
        let _: () = conn
            .set_ex(Self::key(email), value, self.lifetime.as_secs())
            .await?;
        Ok(())
    }

    async fn get(&self, email: &str) -> crate::error::Result<Option<PendingRegistration>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(Self::key(email)).await?;
        match value {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, email: &str) -> crate::error::Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(Self::key(email)).await?;
        Ok(())
    }
}
