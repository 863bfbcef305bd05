//! Persistent storage for submission state and the plugin catalog.
//!
//! Mirrors the two backends the original broker supported: an embedded relational
//! store for single-node deployments, and a distributed KV store for clustered
//! deployments. Both are reachable through one trait so the rest of the broker
//! never has to know which backend is live.

pub mod etcd;
pub mod sqlite;

use async_trait::async_trait;
use error::*;
use result::Result;
use std::collections::HashMap;

/// A durable key/value store keyed by an opaque string id (a submission's `app_id`,
/// or a plugin's `{name}-{component}` key) with an opaque byte-string value (the
/// caller is responsible for serializing/deserializing its own records).
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Upserts `value` under `key`.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Fetches the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removes `key`. Not an error if `key` was already absent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Removes every key beginning with `prefix`.
    async fn delete_all(&self, prefix: &str) -> Result<()>;

    /// Fetches every key beginning with `prefix`.
    async fn get_all(&self, prefix: &str) -> Result<HashMap<String, Vec<u8>>>;
}

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error("the configured persistence backend '{backend}' is not one of 'sqlite' or 'etcd'")]
#[code(Status::InternalServerError)]
pub struct UnknownBackend {
    pub backend: String,
}
