//! Broker-wide configuration, loaded once at startup from the INI-style file
//! named by `BROKER_CONFIG` (falling back to `broker.ini` in the working
//! directory), layered with environment overrides the way `config::Config`
//! supports natively. Held in a `lazy_static` the same way the teacher holds
//! its pod cache, since every component needs read access to it and it never
//! changes after startup.

use ::config::{Config, Environment, File};
use error::*;
use lazy_static::lazy_static;
use result::Result;
use serde::Deserialize;
use std::sync::RwLock;

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("failed to load the broker configuration file '{path}'")]
#[code(Status::InternalServerError)]
pub struct ConfigLoadError {
    path: String,
    #[source]
    source: ::config::ConfigError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_monitor_base")]
    pub monitor_base: String,
    #[serde(default = "default_controller_base")]
    pub controller_base: String,
    #[serde(default = "default_visualizer_base")]
    pub visualizer_base: String,
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_persistence_backend")]
    pub persistence_backend: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default)]
    pub etcd_endpoints: Vec<String>,
    #[serde(default = "default_plugins")]
    pub plugins: Vec<String>,
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_ssh_key_path")]
    pub ssh_key_path: String,
    #[serde(default = "default_current_context_path")]
    pub current_context_path: String,
}

fn default_monitor_base() -> String {
    "http://monitor.chronos-system".to_string()
}
fn default_controller_base() -> String {
    "http://controller.chronos-system".to_string()
}
fn default_visualizer_base() -> String {
    "http://visualizer.chronos-system".to_string()
}
fn default_auth_base() -> String {
    "http://auth.chronos-system".to_string()
}
fn default_persistence_backend() -> String {
    "sqlite".to_string()
}
fn default_sqlite_path() -> String {
    "chronos.db".to_string()
}
fn default_plugins() -> Vec<String> {
    vec!["kubejobs".to_string()]
}
fn default_check_interval() -> u64 {
    5
}
fn default_ssh_key_path() -> String {
    "/etc/chronos/id_rsa.pub".to_string()
}
fn default_current_context_path() -> String {
    "/var/lib/chronos/current-context".to_string()
}

lazy_static! {
    static ref CONFIG: RwLock<Option<BrokerConfig>> = RwLock::new(None);
}

/// Loads the configuration file once, layering environment overrides
/// (`CHRONOS_MONITOR_BASE`, etc.) on top of it. Must be called exactly once,
/// before any other component reads `get()`.
pub fn load() -> Result<()> {
    let path = std::env::var("BROKER_CONFIG").unwrap_or_else(|_| "broker.ini".to_string());
    let settings = Config::builder()
        .add_source(File::with_name(&path).required(false))
        .add_source(Environment::with_prefix("CHRONOS"))
        .build()
        .map_err(|source| ConfigLoadError {
            path: path.clone(),
            source,
        })?;
    let config: BrokerConfig = settings.try_deserialize().map_err(|source| ConfigLoadError { path, source })?;
    *CONFIG.write().expect("config lock poisoned") = Some(config);
    Ok(())
}

/// Returns the loaded configuration. Panics if `load()` has not yet run, the
/// same way `orchestrator::client::new` panics on a missing kubeconfig: a
/// missing startup dependency is terminal, not recoverable.
pub fn get() -> BrokerConfig {
    CONFIG
        .read()
        .expect("config lock poisoned")
        .clone()
        .expect("config::load() must run before config::get()")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_without_a_file() {
        let settings = Config::builder()
            .add_source(File::with_name("does-not-exist.ini").required(false))
            .build()
            .unwrap();
        let config: BrokerConfig = settings.try_deserialize().unwrap();
        assert_eq!(config.persistence_backend, "sqlite");
        assert_eq!(config.plugins, vec!["kubejobs".to_string()]);
    }
}
