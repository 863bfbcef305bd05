//! A thin client over a submission's per-job work queue, grounded in the
//! original's `redis.StrictRedis` usage: workers `rpush` work items onto a list
//! named `job` and workers on the cluster side pop from it.

use error::*;
use redis::AsyncCommands;
use result::Result;

/// The sentinel value pushed to signal "no more items" to any worker still
/// blocked on a pop.
pub const STOP_SENTINEL: &str = "__chronos_stop__";

const LIST_KEY: &str = "job";
const STOP_KEY: &str = "stop";
const ERRORS_KEY: &str = "job:errors";

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error("failed to connect to the work queue at '{address}'")]
#[code(Status::InternalServerError)]
pub struct ConnectionError {
    address: String,
    #[source]
    source: redis::RedisError,
}

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error("work queue operation '{op}' failed")]
#[code(Status::InternalServerError)]
pub struct CommandError {
    op: &'static str,
    #[source]
    source: redis::RedisError,
}

pub struct WorkQueue {
    client: redis::Client,
}

impl WorkQueue {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let address = format!("redis://{}:{}", host, port);
        let client = redis::Client::open(address.as_str()).map_err(|source| ConnectionError {
            address,
            source,
        })?;
        Ok(WorkQueue { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|source| {
                CommandError {
                    op: "connect",
                    source,
                }
                .into()
            })
    }

    /// `rpush`es every item in `items` onto the job list, in order.
    pub async fn push_items(&self, items: &[String]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        conn.rpush::<_, _, ()>(LIST_KEY, items)
            .await
            .map_err(|source| CommandError {
                op: "rpush",
                source,
            })?;
        Ok(())
    }

    /// Pushes the stop sentinel so any worker still draining the list observes
    /// the end of work.
    pub async fn push_stop_sentinel(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.rpush::<_, _, ()>(LIST_KEY, STOP_SENTINEL)
            .await
            .map_err(|source| CommandError {
                op: "rpush",
                source,
            })?;
        Ok(())
    }

    /// Pops every remaining item off the job list (used by `errors()` to see
    /// what work, if any, was never claimed).
    pub async fn drain_job_list(&self) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let mut items = Vec::new();
        loop {
            let item: Option<String> = conn
                .lpop(LIST_KEY, None)
                .await
                .map_err(|source| CommandError {
                    op: "lpop",
                    source,
                })?;
            match item {
                Some(item) if item == STOP_SENTINEL => break,
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(items)
    }

    /// Deletes the job list outright.
    pub async fn clear_job_list(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(LIST_KEY)
            .await
            .map_err(|source| CommandError {
                op: "del",
                source,
            })?;
        Ok(())
    }

    /// `rpush`es the stop sentinel onto the dedicated `stop` list, signaling
    /// workers draining the job list to give up cleanly rather than block.
    pub async fn push_stop_signal(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.rpush::<_, _, ()>(STOP_KEY, STOP_SENTINEL)
            .await
            .map_err(|source| CommandError {
                op: "rpush",
                source,
            })?;
        Ok(())
    }

    /// Reads (without popping) the submission's accumulated error list.
    /// Returns an empty list rather than an error when the queue is
    /// unreachable, matching the "empty on queue unreachable" contract.
    pub async fn errors(&self) -> Vec<String> {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(_) => return Vec::new(),
        };
        conn.lrange(ERRORS_KEY, 0, -1).await.unwrap_or_default()
    }
}
