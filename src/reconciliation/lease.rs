use anyhow::Result;
use std::time::Duration;

pub const LEASE_KEY: &str = "reconciliation:lease";

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Single-runner lease held in Redis with `SET NX PX`.
#[derive(Clone)]
pub struct RunLease {
    pub client: redis::Client,
    pub ttl: Duration,
}

#[derive(Debug)]
pub struct LeaseGuard {
    pub token: String,
}

impl RunLease {
    pub fn new(client: redis::Client, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    /// `Ok(None)` when another runner holds the lease.
    pub async fn acquire(&self, owner: &str) -> Result<Option<LeaseGuard>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let token = format!("{}:{}", owner, uuid::Uuid::new_v4());
        let acquired: Option<String> = redis::cmd("SET")
            .arg(LEASE_KEY)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(acquired.map(|_| LeaseGuard { token }))
    }

    pub async fn release(&self, guard: LeaseGuard) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(LEASE_KEY)
            .arg(&guard.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
