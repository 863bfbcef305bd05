//! Distributed KV backend, grounded in the original `Etcd3JobPersistence`/
//! `Etcd3PluginPersistence` pair. The original scoped each operation to a 5-second
//! *lock* (`etcd_connection.lock(name, ttl=5)`), released as soon as the call
//! returned — a mutual-exclusion window, not a lifetime on the stored value. A
//! lease attached to the write itself would make etcd delete the record a few
//! seconds after it was persisted, which the original never does, so writes here
//! are plain and unleased; the `tokio::sync::Mutex<Client>` already serializes
//! this process's own calls the way the original's lock serialized its own.

use crate::SubmissionStore;
use async_trait::async_trait;
use error::*;
use etcd_client::{Client, GetOptions};
use result::Result;
use std::collections::HashMap;

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error("failed to connect to etcd at {endpoints:?}")]
#[code(Status::InternalServerError)]
pub struct ConnectionError {
    endpoints: Vec<String>,
    #[source]
    source: etcd_client::Error,
}

#[derive(Error, ChronosError, Kind, HttpCode, Debug)]
#[error("etcd operation against key '{key}' failed")]
#[code(Status::InternalServerError)]
pub struct OperationError {
    key: String,
    #[source]
    source: etcd_client::Error,
}

pub struct EtcdSubmissionStore {
    client: tokio::sync::Mutex<Client>,
}

impl EtcdSubmissionStore {
    pub async fn connect(endpoints: &[String]) -> Result<Self> {
        let client = Client::connect(endpoints, None)
            .await
            .map_err(|source| ConnectionError {
                endpoints: endpoints.to_vec(),
                source,
            })?;
        Ok(EtcdSubmissionStore {
            client: tokio::sync::Mutex::new(client),
        })
    }
}

#[async_trait]
impl SubmissionStore for EtcdSubmissionStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut client = self.client.lock().await;
        client
            .put(key, value, None)
            .await
            .map_err(|source| OperationError {
                key: key.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut client = self.client.lock().await;
        let resp = client
            .get(key, None)
            .await
            .map_err(|source| OperationError {
                key: key.to_string(),
                source,
            })?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut client = self.client.lock().await;
        client
            .delete(key, None)
            .await
            .map_err(|source| OperationError {
                key: key.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn delete_all(&self, prefix: &str) -> Result<()> {
        let mut client = self.client.lock().await;
        client
            .delete(
                prefix,
                Some(etcd_client::DeleteOptions::new().with_prefix()),
            )
            .await
            .map_err(|source| OperationError {
                key: prefix.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn get_all(&self, prefix: &str) -> Result<HashMap<String, Vec<u8>>> {
        let mut client = self.client.lock().await;
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|source| OperationError {
                key: prefix.to_string(),
                source,
            })?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| {
                (
                    String::from_utf8_lossy(kv.key()).into_owned(),
                    kv.value().to_vec(),
                )
            })
            .collect())
    }
}
