//! The Plugin Catalog: a `(name, component)` keyed registry of installable
//! plugin modules, seeded with a basic set at startup. Admission rejects any
//! submission whose declared plugins don't all resolve here.

use error::*;
use lazy_static::lazy_static;
use result::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Kind)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Manager,
    Controller,
    Monitor,
    Visualizer,
}

#[derive(Debug, Clone, Serialize, Deserialize, Kind)]
pub struct PluginRecord {
    pub name: String,
    pub component: Component,
    pub install_source: String,
    pub module: String,
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("no plugin named '{name}' is registered for the '{component}' component")]
#[code(Status::BadRequest)]
pub struct UnknownPlugin {
    pub name: String,
    pub component: String,
}

lazy_static! {
    static ref CATALOG: RwLock<HashMap<(String, Component), PluginRecord>> = RwLock::new(HashMap::new());
}

fn basic_seed() -> Vec<PluginRecord> {
    vec![
        PluginRecord {
            name: "kubejobs".to_string(),
            component: Component::Manager,
            install_source: "builtin".to_string(),
            module: "chronos.plugins.kubejobs".to_string(),
        },
        PluginRecord {
            name: "default".to_string(),
            component: Component::Monitor,
            install_source: "builtin".to_string(),
            module: "chronos.plugins.monitor.default".to_string(),
        },
        PluginRecord {
            name: "default".to_string(),
            component: Component::Controller,
            install_source: "builtin".to_string(),
            module: "chronos.plugins.controller.default".to_string(),
        },
        PluginRecord {
            name: "default".to_string(),
            component: Component::Visualizer,
            install_source: "builtin".to_string(),
            module: "chronos.plugins.visualizer.default".to_string(),
        },
    ]
}

/// Seeds the catalog with the basic set plus whatever the configured plugin
/// list names (each entry installed under the manager component, matching
/// the original's single-kind `redis_workload` plugin list).
pub async fn seed(configured: &[String]) {
    let mut catalog = CATALOG.write().await;
    for record in basic_seed() {
        catalog.insert((record.name.clone(), record.component), record);
    }
    for name in configured {
        catalog
            .entry((name.clone(), Component::Manager))
            .or_insert_with(|| PluginRecord {
                name: name.clone(),
                component: Component::Manager,
                install_source: "builtin".to_string(),
                module: format!("chronos.plugins.{}", name),
            });
    }
}

pub async fn install(record: PluginRecord) {
    CATALOG.write().await.insert((record.name.clone(), record.component), record);
}

pub async fn list() -> Vec<PluginRecord> {
    CATALOG.read().await.values().cloned().collect()
}

/// Resolves `name`'s module identifier for `component`, failing admission
/// with `bad_request` (via `UnknownPlugin`) if it was never installed.
pub async fn resolve(name: &str, component: Component) -> Result<String> {
    CATALOG
        .read()
        .await
        .get(&(name.to_string(), component))
        .map(|record| record.module.clone())
        .ok_or_else(|| {
            UnknownPlugin {
                name: name.to_string(),
                component: format!("{:?}", component),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seed_installs_the_basic_set() {
        seed(&[]).await;
        assert_eq!(resolve("kubejobs", Component::Manager).await.unwrap(), "chronos.plugins.kubejobs");
        assert_eq!(
            resolve("default", Component::Monitor).await.unwrap(),
            "chronos.plugins.monitor.default"
        );
    }

    #[tokio::test]
    async fn unknown_plugin_is_rejected() {
        seed(&[]).await;
        assert!(resolve("does-not-exist", Component::Manager).await.is_err());
    }

    #[tokio::test]
    async fn configured_plugins_are_seeded_under_manager() {
        seed(&["custom-plugin".to_string()]).await;
        assert_eq!(
            resolve("custom-plugin", Component::Manager).await.unwrap(),
            "chronos.plugins.custom-plugin"
        );
    }
}
