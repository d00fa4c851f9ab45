use crate::error::{Error, Result};
use crate::store::NonceStore;
use derive_more::Display;
use redis::Client;

const KEY_PREFIX: &str = "finalizer:nonce";

/// Redis-backed nonce store, so a restart between commit and reveal keeps the nonce.
#[derive(Debug, Display)]
#[display(fmt = "{}, {}", proto, endpoint)]
pub struct RedisNonceStore {
    endpoint: String,
    proto: Proto,
    client: Client,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Proto {
    Url,
    Unix,
}

impl std::fmt::Display for Proto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let proto = match self {
            Self::Unix => "unix socket",
            Self::Url => "redis",
        };
        write!(f, "{}", proto)
    }
}

impl RedisNonceStore {
    /// connect to a redis server given a `redis://` or `unix://` url
    pub fn open(endpoint: &str) -> Result<Self> {
        let proto = if endpoint.starts_with("unix") {
            Proto::Unix
        } else if endpoint.starts_with("redis") {
            Proto::Url
        } else {
            return Err(Error::Config(format!("unsupported nonce store url {}", endpoint)));
        };
        let client = Client::open(endpoint)?;
        // fail at startup rather than on the first commit
        let mut conn = client.get_connection()?;
        redis::cmd("PING").query::<String>(&mut conn)?;

        Ok(Self {
            proto,
            client,
            endpoint: endpoint.to_string(),
        })
    }

    fn key(raffle_id: u64) -> String {
        format!("{}:{}", KEY_PREFIX, raffle_id)
    }
}

impl NonceStore for RedisNonceStore {
    fn get(&self, raffle_id: u64) -> Result<Option<u64>> {
        let mut conn = self.client.get_connection()?;
        let res: Option<u64> = redis::cmd("GET").arg(Self::key(raffle_id)).query(&mut conn)?;
        Ok(res)
    }

    fn insert(&mut self, raffle_id: u64, nonce: u64) -> Result<()> {
        let mut conn = self.client.get_connection()?;
        Ok(redis::cmd("SET").arg(Self::key(raffle_id)).arg(nonce).query(&mut conn)?)
    }

    fn remove(&mut self, raffle_id: u64) -> Result<()> {
        let mut conn = self.client.get_connection()?;
        Ok(redis::cmd("DEL").arg(Self::key(raffle_id)).query(&mut conn)?)
    }
}

#[test]
fn test_rejects_unknown_scheme() {
    assert!(matches!(RedisNonceStore::open("http://127.0.0.1:6379"), Err(Error::Config(_))));
    assert_eq!(RedisNonceStore::key(12), "finalizer:nonce:12");
}
